//! Node-level error types.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::NodeName;

/// Usage errors raised while building nodes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The name does not identify anything (blank text).
    #[error("the name '{0}' is invalid")]
    InvalidName(NodeName),
}

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// A failure produced by a node's work, captured as a step status.
///
/// Wrapping is done once: [`GraphError::wrap`] on an error that already is a
/// `GraphError` hands back the same value, so routing through an error edge
/// and failing again does not nest wrappers.
#[derive(Clone)]
pub struct GraphError {
    cause: Arc<anyhow::Error>,
}

impl GraphError {
    /// Classify an arbitrary work failure.
    pub fn wrap(err: anyhow::Error) -> Self {
        match err.downcast::<GraphError>() {
            Ok(already) => already,
            Err(other) => Self {
                cause: Arc::new(other),
            },
        }
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::wrap(anyhow::Error::msg(message))
    }

    /// The wrapped failure.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Identity comparison: true when both handles wrap the same failure.
    pub fn same(&self, other: &GraphError) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

impl fmt::Debug for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GraphError").field(&self.cause).finish()
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.cause)
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_twice_keeps_the_first_wrapper() {
        let first = GraphError::msg("socket closed");
        let again = GraphError::wrap(anyhow::Error::new(first.clone()));
        assert!(first.same(&again));
    }

    #[test]
    fn distinct_failures_are_not_the_same() {
        let a = GraphError::msg("boom");
        let b = GraphError::msg("boom");
        assert!(!a.same(&b));
        assert_eq!(a.to_string(), "boom");
    }

    #[test]
    fn context_chain_is_rendered() {
        let err = anyhow::anyhow!("refused").context("connecting to upstream");
        let wrapped = GraphError::wrap(err);
        assert_eq!(wrapped.to_string(), "connecting to upstream: refused");
        assert_eq!(wrapped.cause().chain().count(), 2);
    }
}
