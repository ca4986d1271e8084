//! Engine-level error types.

use thiserror::Error;
use vgraph_nodes::{NodeError, NodeName};

/// Usage errors produced by the graph (construction + traversal control).
///
/// Failures inside a node's work are never reported here; they become a
/// step status and are routed through the node's edges.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Construction errors ------

    /// A node could not be built.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Edges were attached to a name that has no registered node.
    #[error("no node named '{0}' is registered")]
    UnknownNode(NodeName),

    /// An event name outside the known lifecycle set.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    // ------ Traversal errors ------

    /// `start` while a traversal is in flight.
    #[error("the graph is under execution")]
    AlreadyRunning,

    /// A continuation arrived while no traversal is in flight.
    #[error("graph is not running")]
    NotRunning,

    /// `start` on a graph without an INPUT node.
    #[error("the graph has no $input node")]
    MissingInputNode,

    /// The continuation queue handed over a step that is not the graph's
    /// current one.
    #[error("invalid state detected: step {step} is not the current step")]
    InconsistentState { step: u64 },

    /// The end notification for an awaited traversal can no longer arrive.
    #[error("traversal was abandoned before it ended")]
    Abandoned,
}
