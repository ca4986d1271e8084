//! Nodes and their outgoing transition tables.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::traits::FnWork;
use crate::{AsToken, ExecutionContext, NodeError, NodeName, NodeWork, Sentinel, Status, Work};

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// A guard edge key: `(status, context) -> bool`.
///
/// Handles compare by identity, so registering the same handle twice
/// retargets the existing edge instead of adding a second one.
pub struct Predicate<T>(Rc<dyn Fn(&Status<T>, &ExecutionContext<T>) -> bool>);

impl<T> Predicate<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Status<T>, &ExecutionContext<T>) -> bool + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn matches(&self, status: &Status<T>, ctx: &ExecutionContext<T>) -> bool {
        (self.0)(status, ctx)
    }

    pub fn same(&self, other: &Predicate<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({:p})", Rc::as_ptr(&self.0))
    }
}

// ---------------------------------------------------------------------------
// VectorKey
// ---------------------------------------------------------------------------

/// Key of one outgoing edge.
#[derive(Debug, Clone)]
pub enum VectorKey<T> {
    /// Exact match on a result value.
    Literal(T),
    /// Taken when the status is an error.
    Error,
    /// Fallback when nothing else matched.
    Else,
    /// Taken when the guard returns true.
    When(Predicate<T>),
}

impl<T> VectorKey<T> {
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(&Status<T>, &ExecutionContext<T>) -> bool + 'static,
    {
        VectorKey::When(Predicate::new(f))
    }
}

impl<T: AsToken> VectorKey<T> {
    /// Literal key, except that string-like `$else` / `$error` become the
    /// sentinel keys.
    pub fn normalize(raw: T) -> Self {
        match raw.as_token().and_then(Sentinel::from_token) {
            Some(Sentinel::Else) => VectorKey::Else,
            Some(Sentinel::Error) => VectorKey::Error,
            _ => VectorKey::Literal(raw),
        }
    }
}

impl<T: AsToken> From<T> for VectorKey<T> {
    fn from(raw: T) -> Self {
        VectorKey::normalize(raw)
    }
}

// ---------------------------------------------------------------------------
// VectorMap
// ---------------------------------------------------------------------------

/// A node's outgoing edges.
///
/// At most one edge per literal key, one error edge and one else edge; later
/// registrations overwrite. Predicate edges keep insertion order.
#[derive(Debug)]
pub struct VectorMap<T> {
    literals: Vec<(T, NodeName)>,
    predicates: Vec<(Predicate<T>, NodeName)>,
    on_error: Option<NodeName>,
    on_else: Option<NodeName>,
}

impl<T> Default for VectorMap<T> {
    fn default() -> Self {
        Self {
            literals: Vec::new(),
            predicates: Vec::new(),
            on_error: None,
            on_else: None,
        }
    }
}

impl<T: PartialEq> VectorMap<T> {
    pub fn insert(&mut self, key: VectorKey<T>, target: NodeName) {
        match key {
            VectorKey::Literal(value) => {
                match self.literals.iter_mut().find(|(existing, _)| *existing == value) {
                    Some(slot) => slot.1 = target,
                    None => self.literals.push((value, target)),
                }
            }
            VectorKey::When(predicate) => {
                match self.predicates.iter_mut().find(|(existing, _)| existing.same(&predicate)) {
                    Some(slot) => slot.1 = target,
                    None => self.predicates.push((predicate, target)),
                }
            }
            VectorKey::Error => self.on_error = Some(target),
            VectorKey::Else => self.on_else = Some(target),
        }
    }

    pub fn literal(&self, value: &T) -> Option<&NodeName> {
        self.literals
            .iter()
            .find(|(existing, _)| existing == value)
            .map(|(_, target)| target)
    }

    pub fn error_target(&self) -> Option<&NodeName> {
        self.on_error.as_ref()
    }

    pub fn else_target(&self) -> Option<&NodeName> {
        self.on_else.as_ref()
    }

    pub fn predicates(&self) -> &[(Predicate<T>, NodeName)] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.literals.len()
            + self.predicates.len()
            + usize::from(self.on_error.is_some())
            + usize::from(self.on_else.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A named unit of work plus its transition table.
pub struct Node<T> {
    name: NodeName,
    work: Rc<dyn NodeWork<T>>,
    vectors: RefCell<VectorMap<T>>,
}

impl<T> Node<T> {
    pub fn name(&self) -> &NodeName {
        &self.name
    }

    pub fn work(&self) -> &Rc<dyn NodeWork<T>> {
        &self.work
    }

    pub fn vectors(&self) -> std::cell::Ref<'_, VectorMap<T>> {
        self.vectors.borrow()
    }
}

impl<T: PartialEq + 'static> Node<T> {
    /// Create a node from a closure.
    ///
    /// # Errors
    /// [`NodeError::InvalidName`] if the name is blank.
    pub fn new<F>(name: impl Into<NodeName>, work: F) -> Result<Self, NodeError>
    where
        F: Fn(&ExecutionContext<T>) -> anyhow::Result<Work<T>> + 'static,
    {
        Self::with_work(name, Rc::new(FnWork(work)))
    }

    /// Create a node from any [`NodeWork`] implementation.
    pub fn with_work(name: impl Into<NodeName>, work: Rc<dyn NodeWork<T>>) -> Result<Self, NodeError> {
        let name = name.into();
        if !name.is_usable() {
            return Err(NodeError::InvalidName(name));
        }
        Ok(Self {
            name,
            work,
            vectors: RefCell::new(VectorMap::default()),
        })
    }

    /// The built-in OUTPUT node: forwards its input as its status.
    pub fn terminal() -> Self {
        Self {
            name: NodeName::Output,
            work: Rc::new(FnWork(|_ctx: &ExecutionContext<T>| -> anyhow::Result<Work<T>> {
                Ok(Work::Passthrough)
            })),
            vectors: RefCell::new(VectorMap::default()),
        }
    }

    /// Insert or overwrite one edge.
    pub fn add_vector(&self, key: impl Into<VectorKey<T>>, target: impl Into<NodeName>) -> &Self {
        self.vectors.borrow_mut().insert(key.into(), target.into());
        self
    }

    /// Insert several edges in order.
    pub fn set_vectors<I, K, N>(&self, vectors: I) -> &Self
    where
        I: IntoIterator<Item = (K, N)>,
        K: Into<VectorKey<T>>,
        N: Into<NodeName>,
    {
        let mut map = self.vectors.borrow_mut();
        for (key, target) in vectors {
            map.insert(key.into(), target.into());
        }
        drop(map);
        self
    }

    /// Builder form of [`Node::set_vectors`].
    pub fn with_vectors<I, K, N>(self, vectors: I) -> Self
    where
        I: IntoIterator<Item = (K, N)>,
        K: Into<VectorKey<T>>,
        N: Into<NodeName>,
    {
        self.set_vectors(vectors);
        self
    }

    pub fn on_error(&self, target: impl Into<NodeName>) -> &Self {
        self.add_vector(VectorKey::Error, target)
    }

    pub fn on_else(&self, target: impl Into<NodeName>) -> &Self {
        self.add_vector(VectorKey::Else, target)
    }

    /// Pick the outgoing edge for a freshly settled status.
    ///
    /// Priority: error edge (error statuses only), exact literal, first
    /// matching predicate in insertion order (non-error statuses only), else
    /// edge. Returns the target *name*; looking it up is the graph's job.
    pub fn resolve(&self, status: &Status<T>, ctx: &ExecutionContext<T>) -> Option<NodeName> {
        let (found, guards) = {
            let map = self.vectors.borrow();
            let found = match status {
                Status::Error(_) => map.error_target().cloned(),
                Status::Value(value) => map.literal(value).cloned(),
                Status::Unknown => None,
            };
            let guards = if found.is_none() && !status.is_error() {
                map.predicates().to_vec()
            } else {
                Vec::new()
            };
            (found, guards)
        };

        found
            .or_else(|| {
                guards
                    .into_iter()
                    .find(|(guard, _)| guard.matches(status, ctx))
                    .map(|(_, target)| target)
            })
            .or_else(|| self.vectors.borrow().else_target().cloned())
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("vectors", &self.vectors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn noop(name: &str) -> Node<i64> {
        Node::new(name, |_ctx: &ExecutionContext<i64>| Ok(Work::Ready(0))).expect("valid name")
    }

    fn ctx_for(node: Node<i64>) -> ExecutionContext<i64> {
        ExecutionContext::first(Uuid::new_v4(), Rc::new(node), Status::Unknown)
    }

    #[test]
    fn blank_name_is_rejected() {
        let result = Node::<i64>::new("  ", |_ctx| Ok(Work::Ready(1)));
        assert!(matches!(result, Err(NodeError::InvalidName(_))));
    }

    #[test]
    fn later_literal_registration_overwrites() {
        let node = noop("a");
        assert!(node.vectors().is_empty());
        node.add_vector(200, "first").add_vector(200, "second");

        let ctx = ctx_for(noop("bystander"));
        assert_eq!(node.resolve(&Status::Value(200), &ctx), Some(NodeName::from("second")));
        assert_eq!(node.vectors().len(), 1);
    }

    #[test]
    fn priority_is_literal_then_predicate_then_else() {
        let node = noop("a");
        node.add_vector(VectorKey::when(|status: &Status<i64>, _| status.value().is_some_and(|v| *v >= 400)), "client_error")
            .add_vector(VectorKey::when(|_, _| true), "anything")
            .add_vector(401, "auth")
            .on_else("fallback");

        let ctx = ctx_for(noop("bystander"));
        assert_eq!(node.resolve(&Status::Value(401), &ctx), Some(NodeName::from("auth")));
        assert_eq!(node.resolve(&Status::Value(404), &ctx), Some(NodeName::from("client_error")));
        assert_eq!(node.resolve(&Status::Value(1), &ctx), Some(NodeName::from("anything")));
    }

    #[test]
    fn error_status_skips_literals_and_predicates() {
        let node = noop("a");
        node.add_vector(VectorKey::when(|_, _| true), "guarded").on_else("fallback");

        let ctx = ctx_for(noop("bystander"));
        let failed = Status::Error(crate::GraphError::msg("boom"));
        assert_eq!(node.resolve(&failed, &ctx), Some(NodeName::from("fallback")));

        node.on_error("recover");
        assert_eq!(node.resolve(&failed, &ctx), Some(NodeName::from("recover")));
    }

    #[test]
    fn same_predicate_handle_retargets_in_place() {
        let node = noop("a");
        let guard = Predicate::new(|_: &Status<i64>, _: &ExecutionContext<i64>| true);
        node.add_vector(VectorKey::When(guard.clone()), "old")
            .add_vector(VectorKey::When(guard), "new");

        assert_eq!(node.vectors().predicates().len(), 1);
        let ctx = ctx_for(noop("bystander"));
        assert_eq!(node.resolve(&Status::Value(7), &ctx), Some(NodeName::from("new")));
    }

    #[test]
    fn string_tokens_become_sentinel_keys() {
        let node = Node::<String>::new("a", |_ctx| Ok(Work::Ready(String::new()))).expect("valid name");
        node.add_vector(String::from("$ELSE"), "$input")
            .add_vector(String::from("$error"), "retry");

        let map = node.vectors();
        assert_eq!(map.else_target(), Some(&NodeName::Input));
        assert_eq!(map.error_target(), Some(&NodeName::from("retry")));
        assert!(map.literal(&String::from("$else")).is_none());
    }

    #[test]
    fn unresolved_status_yields_none() {
        let node = noop("a");
        node.add_vector(0, "lost");
        let ctx = ctx_for(noop("bystander"));
        assert_eq!(node.resolve(&Status::Value(5), &ctx), None);
    }
}
