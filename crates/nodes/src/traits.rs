//! The `NodeWork` trait: the contract every node's work must fulfil.

use std::future::Future;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::ExecutionContext;

/// What a node's work hands back to the engine.
pub enum Work<T> {
    /// Settled synchronously with a value.
    Ready(T),
    /// Settles later; the engine suspends the traversal until it does.
    Pending(LocalBoxFuture<'static, anyhow::Result<T>>),
    /// Settled synchronously by forwarding the step's input as its status.
    Passthrough,
}

impl<T> Work<T> {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
    {
        Work::Pending(future.boxed_local())
    }
}

/// A unit of work attached to a node.
///
/// Returning `Err` is a synchronous failure; the engine wraps it into a
/// [`GraphError`](crate::GraphError) status and routes it like any other.
pub trait NodeWork<T> {
    fn run(&self, ctx: &ExecutionContext<T>) -> anyhow::Result<Work<T>>;
}

/// Adapter that lets plain closures act as node work.
pub(crate) struct FnWork<F>(pub(crate) F);

impl<T, F> NodeWork<T> for FnWork<F>
where
    F: Fn(&ExecutionContext<T>) -> anyhow::Result<Work<T>>,
{
    fn run(&self, ctx: &ExecutionContext<T>) -> anyhow::Result<Work<T>> {
        (self.0)(ctx)
    }
}
