//! `engine` crate: the graph, its traversal engine and lifecycle events.

pub mod error;
pub mod events;
pub mod executor;
pub mod graph;

pub use error::EngineError;
pub use events::{Event, EventArgs, EventDispatcher, EventKind, ListenerId};
pub use graph::{Graph, GraphConfig};
