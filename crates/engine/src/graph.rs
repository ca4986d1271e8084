//! The graph: node table, traversal state and event listeners.
//!
//! Construction lives here; the traversal loop is in [`crate::executor`].

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vgraph_nodes::{ExecutionContext, Node, NodeName, NodeWork, VectorKey, Work};

use crate::events::{Event, EventDispatcher, EventKind, ListenerId};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name used in log spans.
    pub label: String,
    /// Link each new step to its predecessor. Turning this off bounds memory
    /// for long-running cyclic traversals at the cost of `history()`.
    pub keep_history: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            label: "graph".to_owned(),
            keep_history: true,
        }
    }
}

impl GraphConfig {
    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Shared state behind a [`Graph`] handle.
pub(crate) struct GraphInner<T> {
    pub(crate) config: GraphConfig,
    pub(crate) nodes: RefCell<HashMap<NodeName, Rc<Node<T>>>>,
    /// Built-in terminal node, created on first use.
    pub(crate) terminal: OnceCell<Rc<Node<T>>>,
    pub(crate) running: Cell<bool>,
    pub(crate) current: RefCell<Option<Rc<ExecutionContext<T>>>>,
    /// Continuation requests; `Some` while a continuation loop is active.
    pub(crate) pending: RefCell<Option<VecDeque<Rc<ExecutionContext<T>>>>>,
    pub(crate) events: EventDispatcher<T>,
}

/// A directed graph of named nodes whose edges are picked at runtime from
/// each node's result.
///
/// `Graph` is a cheap handle; clones share the same nodes and traversal. It
/// is single-threaded: traversals that defer work must run inside a
/// [`tokio::task::LocalSet`].
pub struct Graph<T> {
    pub(crate) inner: Rc<GraphInner<T>>,
}

impl<T> Clone for Graph<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("label", &self.inner.config.label)
            .field("nodes", &self.inner.nodes.borrow().len())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Graph<T> {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            inner: Rc::new(GraphInner {
                config,
                nodes: RefCell::new(HashMap::new()),
                terminal: OnceCell::new(),
                running: Cell::new(false),
                current: RefCell::new(None),
                pending: RefCell::new(None),
                events: EventDispatcher::default(),
            }),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> Weak<GraphInner<T>> {
        Rc::downgrade(&self.inner)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Register nodes, replacing any node with the same name.
    pub fn add(&self, nodes: impl IntoIterator<Item = Node<T>>) -> &Self {
        for node in nodes {
            self.register(node);
        }
        self
    }

    /// Build and register a node from a closure; returns the registered node
    /// so edges can be attached.
    ///
    /// # Errors
    /// [`EngineError::Node`] if the name is unusable.
    pub fn add_node<F>(&self, name: impl Into<NodeName>, work: F) -> Result<Rc<Node<T>>, EngineError>
    where
        F: Fn(&ExecutionContext<T>) -> anyhow::Result<Work<T>> + 'static,
    {
        let node = Node::new(name, work)?;
        Ok(self.register(node))
    }

    /// Build and register several nodes, each with its initial edges.
    ///
    /// # Errors
    /// [`EngineError::Node`] on the first unusable name; nodes before it stay
    /// registered.
    pub fn add_nodes<I, N, V>(&self, nodes: I) -> Result<&Self, EngineError>
    where
        I: IntoIterator<Item = (N, Rc<dyn NodeWork<T>>, V)>,
        N: Into<NodeName>,
        V: IntoIterator<Item = (VectorKey<T>, NodeName)>,
    {
        for (name, work, vectors) in nodes {
            let node = Node::with_work(name, work)?;
            node.set_vectors(vectors);
            self.register(node);
        }
        Ok(self)
    }

    /// Attach edges to an already registered node.
    ///
    /// # Errors
    /// [`EngineError::UnknownNode`] if no node has that name.
    pub fn add_vectors<I, K, N>(&self, name: impl Into<NodeName>, vectors: I) -> Result<&Self, EngineError>
    where
        I: IntoIterator<Item = (K, N)>,
        K: Into<VectorKey<T>>,
        N: Into<NodeName>,
    {
        let name = name.into();
        let node = self.node(&name).ok_or(EngineError::UnknownNode(name))?;
        node.set_vectors(vectors);
        Ok(self)
    }

    fn register(&self, node: Node<T>) -> Rc<Node<T>> {
        let node = Rc::new(node);
        debug!(graph = %self.inner.config.label, node = %node.name(), "registering node");
        self.inner
            .nodes
            .borrow_mut()
            .insert(node.name().clone(), Rc::clone(&node));
        node
    }

    pub fn node(&self, name: &NodeName) -> Option<Rc<Node<T>>> {
        self.inner.nodes.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &NodeName) -> bool {
        self.inner.nodes.borrow().contains_key(name)
    }

    /// The registered start node.
    pub fn input(&self) -> Option<Rc<Node<T>>> {
        self.node(&NodeName::Input)
    }

    /// The registered end node, or this graph's built-in terminal node.
    pub fn output(&self) -> Rc<Node<T>> {
        self.node(&NodeName::Output).unwrap_or_else(|| self.terminal())
    }

    /// Terminal node whose status is whatever it was handed, so the end
    /// payload is the last status produced before reaching it.
    fn terminal(&self) -> Rc<Node<T>> {
        Rc::clone(self.inner.terminal.get_or_init(|| Rc::new(Node::terminal())))
    }

    /// Look a transition target up; `$output` falls back to the terminal.
    pub(crate) fn lookup(&self, name: &NodeName) -> Option<Rc<Node<T>>> {
        match self.node(name) {
            Some(node) => Some(node),
            None if *name == NodeName::Output => Some(self.terminal()),
            None => None,
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event<'_, T>) -> anyhow::Result<()> + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Register by event name.
    ///
    /// # Errors
    /// [`EngineError::UnknownEvent`] for a name outside the lifecycle set.
    pub fn on_named<F>(&self, event: &str, listener: F) -> Result<ListenerId, EngineError>
    where
        F: Fn(&Event<'_, T>) -> anyhow::Result<()> + 'static,
    {
        let kind = event.parse::<EventKind>()?;
        Ok(self.on(kind, listener))
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// The most recent step of the current (or last) traversal.
    pub fn current(&self) -> Option<Rc<ExecutionContext<T>>> {
        self.inner.current.borrow().clone()
    }
}
