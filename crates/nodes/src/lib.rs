//! `nodes` crate: the data model of a vector graph.
//!
//! Sentinels, node names, nodes with their transition tables, the per-step
//! [`ExecutionContext`], and the [`NodeWork`] trait every node's work
//! implements. The engine crate drives traversal over these types.

pub mod context;
pub mod error;
pub mod mock;
pub mod node;
pub mod sentinel;
pub mod traits;

pub use context::{ExecutionContext, History, Status};
pub use error::{GraphError, NodeError};
pub use node::{Node, Predicate, VectorKey, VectorMap};
pub use sentinel::{AsToken, NodeName, Sentinel};
pub use traits::{NodeWork, Work};
