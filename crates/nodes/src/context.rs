//! Per-step execution records.
//!
//! Node work receives a context, so it lives next to `Node` rather than in
//! the engine.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{GraphError, Node, NodeName, Sentinel};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Classified outcome of a node's work.
#[derive(Debug, Clone)]
pub enum Status<T> {
    Value(T),
    Error(GraphError),
    Unknown,
}

impl<T> Status<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Status::Unknown)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Status::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&GraphError> {
        match self {
            Status::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Values compare structurally; errors compare by identity.
impl<T: PartialEq> PartialEq for Status<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Status::Value(a), Status::Value(b)) => a == b,
            (Status::Error(a), Status::Error(b)) => a.same(b),
            (Status::Unknown, Status::Unknown) => true,
            _ => false,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Status<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Value(value) => value.fmt(f),
            Status::Error(err) => write!(f, "error: {err}"),
            Status::Unknown => Sentinel::Unknown.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// One traversal step: which node runs, what it received, and (once its work
/// settles) what it produced.
///
/// Everything except `status` is fixed at construction. `status` is written
/// exactly once.
pub struct ExecutionContext<T> {
    traversal: Uuid,
    step: u64,
    started_at: DateTime<Utc>,
    previous: Option<Rc<ExecutionContext<T>>>,
    previous_node: Option<Rc<Node<T>>>,
    current_node: Option<Rc<Node<T>>>,
    input: Status<T>,
    status: OnceCell<Status<T>>,
}

impl<T> ExecutionContext<T> {
    /// First step of a traversal.
    pub fn first(traversal: Uuid, node: Rc<Node<T>>, input: Status<T>) -> Self {
        Self {
            traversal,
            step: 0,
            started_at: Utc::now(),
            previous: None,
            previous_node: None,
            current_node: Some(node),
            input,
            status: OnceCell::new(),
        }
    }

    /// Step following `previous`.
    ///
    /// `node` is `None` when no edge resolved; that context is a dead end.
    /// With `link == false` the new step does not retain `previous`.
    pub fn next(
        previous: &Rc<ExecutionContext<T>>,
        node: Option<Rc<Node<T>>>,
        input: Status<T>,
        link: bool,
    ) -> Self {
        Self {
            traversal: previous.traversal,
            step: previous.step + 1,
            started_at: Utc::now(),
            previous: link.then(|| Rc::clone(previous)),
            previous_node: previous.current_node.clone(),
            current_node: node,
            input,
            status: OnceCell::new(),
        }
    }

    pub fn traversal(&self) -> Uuid {
        self.traversal
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wall-clock time since this step was created.
    pub fn elapsed(&self) -> Duration {
        Utc::now() - self.started_at
    }

    pub fn previous(&self) -> Option<&Rc<ExecutionContext<T>>> {
        self.previous.as_ref()
    }

    pub fn previous_node(&self) -> Option<&Rc<Node<T>>> {
        self.previous_node.as_ref()
    }

    pub fn current_node(&self) -> Option<&Rc<Node<T>>> {
        self.current_node.as_ref()
    }

    /// Name of the node this step runs, if any.
    pub fn node_name(&self) -> Option<&NodeName> {
        self.current_node.as_deref().map(Node::name)
    }

    /// Value delivered to the node: the traversal input on the first step,
    /// the previous step's status afterwards.
    pub fn input(&self) -> &Status<T> {
        &self.input
    }

    /// `None` until the node's work settles.
    pub fn status(&self) -> Option<&Status<T>> {
        self.status.get()
    }

    /// Record the outcome. Returns `false` (and keeps the first value) if a
    /// status was already written.
    pub fn settle(&self, status: Status<T>) -> bool {
        self.status.set(status).is_ok()
    }

    /// Earlier steps, newest first.
    pub fn history(&self) -> History<'_, T> {
        History {
            next: self.previous.as_deref(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ExecutionContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("traversal", &self.traversal)
            .field("step", &self.step)
            .field("node", &self.node_name())
            .field("previous_node", &self.previous_node.as_deref().map(Node::name))
            .field("input", &self.input)
            .field("status", &self.status.get())
            .finish()
    }
}

// A cyclic graph can build very long chains; unlink them iteratively.
impl<T> Drop for ExecutionContext<T> {
    fn drop(&mut self) {
        let mut next = self.previous.take();
        while let Some(ctx) = next {
            match Rc::try_unwrap(ctx) {
                Ok(mut owned) => next = owned.previous.take(),
                Err(_) => break,
            }
        }
    }
}

/// Iterator over a context's `previous` chain.
pub struct History<'a, T> {
    next: Option<&'a ExecutionContext<T>>,
}

impl<'a, T> Iterator for History<'a, T> {
    type Item = &'a ExecutionContext<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.previous.as_deref();
        Some(current)
    }
}
