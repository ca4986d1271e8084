//! `MockNode`: a scripted test double for `NodeWork`.
//!
//! Useful in tests and demos where a real node implementation is either
//! unavailable or irrelevant.

use std::cell::{Cell, RefCell};

use anyhow::anyhow;

use crate::{ExecutionContext, NodeWork, Status, Work};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockBehaviour<T> {
    /// Settle synchronously with a value.
    Return(T),
    /// Settle asynchronously with a value.
    Defer(T),
    /// Fail synchronously.
    Fail(String),
    /// Fail asynchronously.
    Reject(String),
}

/// A mock node that records every input it receives and replays a
/// programmer-specified script, wrapping around when it runs out.
pub struct MockNode<T> {
    /// Label used in error messages.
    pub name: String,
    script: Vec<MockBehaviour<T>>,
    cursor: Cell<usize>,
    calls: RefCell<Vec<Status<T>>>,
}

impl<T: Clone + 'static> MockNode<T> {
    /// Replay `script` in order, forever.
    pub fn scripted(name: impl Into<String>, script: Vec<MockBehaviour<T>>) -> Self {
        Self {
            name: name.into(),
            script,
            cursor: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Always succeed synchronously with the given value.
    pub fn returning(name: impl Into<String>, value: T) -> Self {
        Self::scripted(name, vec![MockBehaviour::Return(value)])
    }

    /// Cycle synchronously through `values`.
    pub fn cycling(name: impl Into<String>, values: impl IntoIterator<Item = T>) -> Self {
        Self::scripted(name, values.into_iter().map(MockBehaviour::Return).collect())
    }

    /// Always fail synchronously.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::scripted(name, vec![MockBehaviour::Fail(msg.into())])
    }

    /// Number of times this node has run.
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Inputs seen so far, in call order.
    pub fn calls(&self) -> Vec<Status<T>> {
        self.calls.borrow().clone()
    }

    fn next_behaviour(&self) -> Option<MockBehaviour<T>> {
        if self.script.is_empty() {
            return None;
        }
        let index = self.cursor.get();
        self.cursor.set((index + 1) % self.script.len());
        self.script.get(index).cloned()
    }
}

impl<T: Clone + 'static> NodeWork<T> for MockNode<T> {
    fn run(&self, ctx: &ExecutionContext<T>) -> anyhow::Result<Work<T>> {
        self.calls.borrow_mut().push(ctx.input().clone());

        match self.next_behaviour() {
            None => Err(anyhow!("mock node '{}' has an empty script", self.name)),
            Some(MockBehaviour::Return(value)) => Ok(Work::Ready(value)),
            Some(MockBehaviour::Defer(value)) => Ok(Work::pending(async move { Ok::<_, anyhow::Error>(value) })),
            Some(MockBehaviour::Fail(msg)) => Err(anyhow!(msg)),
            Some(MockBehaviour::Reject(msg)) => Ok(Work::pending(async move { Err::<T, _>(anyhow!(msg)) })),
        }
    }
}
