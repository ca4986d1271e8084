//! Traversal engine.
//!
//! A traversal is a run of steps:
//! 1. Run the current node's work with the step's [`ExecutionContext`].
//! 2. Classify the outcome into a [`Status`] (value, wrapped error).
//! 3. Pick the next node from the current node's edges.
//! 4. Build the next context and repeat, until OUTPUT is reached or no edge
//!    resolves.
//!
//! Synchronous steps never recurse into each other. Every settled step is
//! handed to [`Graph::continue_with`], which either starts the single
//! continuation loop or queues the step for the loop already running. Deferred
//! steps are spawned on the current `LocalSet` and re-enter the same path when
//! their work settles.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use vgraph_nodes::{ExecutionContext, GraphError, Node, NodeName, Status, Work};

use crate::events::{EventArgs, EventKind};
use crate::{EngineError, Graph};

impl<T: Clone + PartialEq + fmt::Debug + 'static> Graph<T> {
    /// Begin a traversal at the INPUT node.
    ///
    /// Synchronous steps run before this returns; the traversal either ends
    /// or suspends on the first deferred step.
    ///
    /// # Errors
    /// - [`EngineError::AlreadyRunning`] if a traversal is in flight; the
    ///   running traversal is left untouched.
    /// - [`EngineError::MissingInputNode`] if no INPUT node is registered.
    /// - [`EngineError::InconsistentState`] if the continuation queue was
    ///   corrupted; the traversal is abandoned.
    ///
    /// # Panics
    /// If a node returns [`Work::Pending`] while no `tokio::task::LocalSet`
    /// is entered. [`Graph::run`] provides one.
    #[instrument(skip(self, input), fields(graph = %self.inner.config.label))]
    pub fn start(&self, input: T) -> Result<&Self, EngineError> {
        if self.inner.running.get() {
            warn!("start rejected: a traversal is already running");
            return Err(EngineError::AlreadyRunning);
        }
        let node = self.input().ok_or(EngineError::MissingInputNode)?;

        let ctx = Rc::new(ExecutionContext::first(
            Uuid::new_v4(),
            Rc::clone(&node),
            Status::Value(input),
        ));
        self.inner.running.set(true);
        *self.inner.current.borrow_mut() = Some(Rc::clone(&ctx));
        info!(traversal = %ctx.traversal(), "traversal started");

        self.execute(ctx, node)?;
        Ok(self)
    }

    /// Start a traversal and wait for its `end` notification.
    ///
    /// Returns the end payload: `Some(status)` when OUTPUT was reached,
    /// `None` when the traversal stopped on an unresolved edge.
    ///
    /// Deferred steps run on a `LocalSet` owned by this call, so callers need
    /// no `LocalSet` of their own. Work still pending when it returns is
    /// dropped.
    pub async fn run(&self, input: T) -> Result<Option<Status<T>>, EngineError> {
        LocalSet::new().run_until(self.run_to_end(input)).await
    }

    async fn run_to_end(&self, input: T) -> Result<Option<Status<T>>, EngineError> {
        let (tx, rx) = oneshot::channel();
        let tx = std::cell::RefCell::new(Some(tx));
        let listener = self.on(EventKind::End, move |event| {
            if let EventArgs::End(result) = event.args {
                if let Some(tx) = tx.borrow_mut().take() {
                    let _ = tx.send(result.clone());
                }
            }
            Ok(())
        });

        if let Err(err) = self.start(input) {
            self.off(EventKind::End, listener);
            return Err(err);
        }

        let outcome = rx.await.map_err(|_| EngineError::Abandoned);
        self.off(EventKind::End, listener);
        outcome
    }

    /// Finish the current traversal and fire `end` with `data`.
    ///
    /// Does nothing if no traversal is running, so each traversal ends
    /// exactly once.
    pub fn end(&self, data: Option<Status<T>>) {
        if !self.inner.running.replace(false) {
            debug!(graph = %self.inner.config.label, "end ignored: graph is not running");
            return;
        }

        let Some(ctx) = self.current() else {
            return;
        };
        info!(
            graph = %self.inner.config.label,
            traversal = %ctx.traversal(),
            steps = ctx.step() + 1,
            result = ?data,
            "traversal ended"
        );
        self.inner.events.fire(EventKind::End, &ctx, &EventArgs::End(data));
    }

    // -----------------------------------------------------------------------
    // Internal: one step
    // -----------------------------------------------------------------------

    fn execute(&self, ctx: Rc<ExecutionContext<T>>, node: Rc<Node<T>>) -> Result<(), EngineError> {
        debug!(traversal = %ctx.traversal(), step = ctx.step(), node = %node.name(), "executing");

        match node.work().run(&ctx) {
            Ok(Work::Ready(value)) => {
                self.record(&ctx, Status::Value(value));
                self.resume(ctx)
            }
            Ok(Work::Passthrough) => {
                self.record(&ctx, ctx.input().clone());
                self.resume(ctx)
            }
            Ok(Work::Pending(work)) => {
                self.defer(ctx, work);
                Ok(())
            }
            Err(err) => {
                let failure = GraphError::wrap(err);
                debug!(traversal = %ctx.traversal(), step = ctx.step(), "work failed: {failure}");
                self.record(&ctx, Status::Error(failure.clone()));
                self.inner.events.fire(EventKind::Error, &ctx, &EventArgs::Error(failure));
                self.resume(ctx)
            }
        }
    }

    fn defer(&self, ctx: Rc<ExecutionContext<T>>, work: LocalBoxFuture<'static, anyhow::Result<T>>) {
        debug!(traversal = %ctx.traversal(), step = ctx.step(), "step deferred");
        self.inner.events.fire(EventKind::Deferred, &ctx, &EventArgs::None);

        let graph = self.downgrade();
        tokio::task::spawn_local(async move {
            let status = match work.await {
                Ok(value) => Status::Value(value),
                Err(err) => Status::Error(GraphError::wrap(err)),
            };

            let Some(inner) = graph.upgrade() else {
                debug!(traversal = %ctx.traversal(), "graph dropped before deferred step settled");
                return;
            };
            let graph = Graph { inner };
            graph.record(&ctx, status);
            if let Err(err) = graph.resume(ctx) {
                error!(graph = %graph.inner.config.label, "continuation after deferred step failed: {err}");
            }
        });
    }

    fn record(&self, ctx: &ExecutionContext<T>, status: Status<T>) {
        if !ctx.settle(status) {
            warn!(traversal = %ctx.traversal(), step = ctx.step(), "status already recorded; keeping the first");
        }
    }

    /// Hand a settled step to the continuation loop, unless its traversal
    /// already ended, by the step's own work or by an outside caller.
    fn resume(&self, ctx: Rc<ExecutionContext<T>>) -> Result<(), EngineError> {
        if !self.inner.running.get() {
            debug!(traversal = %ctx.traversal(), step = ctx.step(), "traversal already ended; step not continued");
            return Ok(());
        }

        // A late completion from an ended traversal must not touch a newer one.
        let live = self
            .inner
            .current
            .borrow()
            .as_ref()
            .is_some_and(|current| current.traversal() == ctx.traversal());
        if !live {
            debug!(traversal = %ctx.traversal(), step = ctx.step(), "step belongs to an ended traversal; dropped");
            return Ok(());
        }
        self.continue_with(ctx)
    }

    // -----------------------------------------------------------------------
    // Internal: continuation loop
    // -----------------------------------------------------------------------

    /// Process a settled step.
    ///
    /// Only one loop runs per graph. A request that arrives while the loop is
    /// active (a synchronous step settling inside it) is queued at the front
    /// and taken from the back, so steps are processed one at a time in the
    /// order they settled.
    pub(crate) fn continue_with(&self, ctx: Rc<ExecutionContext<T>>) -> Result<(), EngineError> {
        if !self.inner.running.get() {
            return Err(EngineError::NotRunning);
        }

        {
            let mut pending = self.inner.pending.borrow_mut();
            if let Some(queue) = pending.as_mut() {
                queue.push_front(ctx);
                return Ok(());
            }
            *pending = Some(VecDeque::from([ctx]));
        }

        let outcome = self.drain();
        *self.inner.pending.borrow_mut() = None;
        if outcome.is_err() {
            self.inner.running.set(false);
        }
        outcome
    }

    fn drain(&self) -> Result<(), EngineError> {
        loop {
            let next = self.inner.pending.borrow_mut().as_mut().and_then(VecDeque::pop_back);
            let Some(done) = next else {
                return Ok(());
            };

            let is_current = self
                .inner
                .current
                .borrow()
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(current, &done));
            if !is_current {
                error!(traversal = %done.traversal(), step = done.step(), "queued step is not the current step");
                return Err(EngineError::InconsistentState { step: done.step() });
            }

            self.advance(done)?;
        }
    }

    /// Move past a settled step: end on OUTPUT, otherwise resolve and run the
    /// next node, or end without a result when nothing resolves.
    fn advance(&self, done: Rc<ExecutionContext<T>>) -> Result<(), EngineError> {
        debug!(
            traversal = %done.traversal(),
            step = done.step(),
            elapsed_ms = done.elapsed().num_milliseconds(),
            "step settled"
        );
        self.inner.events.fire(EventKind::Executed, &done, &EventArgs::None);
        if !self.inner.running.get() {
            return Ok(());
        }

        let status = done.status().cloned().unwrap_or(Status::Unknown);
        if done.node_name() == Some(&NodeName::Output) {
            self.end(Some(status));
            return Ok(());
        }

        let target = self.next_node(&done);
        let next = Rc::new(ExecutionContext::next(
            &done,
            target.clone(),
            status,
            self.inner.config.keep_history,
        ));
        *self.inner.current.borrow_mut() = Some(Rc::clone(&next));

        match target {
            Some(node) => self.execute(next, node),
            None => {
                next.settle(Status::Unknown);
                info!(
                    traversal = %next.traversal(),
                    step = next.step(),
                    from = ?done.node_name(),
                    "no edge matched; ending without a result"
                );
                self.inner.events.fire(EventKind::Unknown, &next, &EventArgs::None);
                self.end(None);
                Ok(())
            }
        }
    }

    /// Resolve the node that follows a settled step.
    pub(crate) fn next_node(&self, ctx: &ExecutionContext<T>) -> Option<Rc<Node<T>>> {
        let node = ctx.current_node()?;
        let status = ctx.status()?;
        let target = node.resolve(status, ctx)?;

        let resolved = self.lookup(&target);
        if resolved.is_none() {
            debug!(from = %node.name(), target = %target, "edge points at an unregistered node");
        }
        resolved
    }
}
