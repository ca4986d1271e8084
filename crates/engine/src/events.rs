//! Lifecycle notifications.
//!
//! Listeners are observers only: whatever a listener does wrong (returns an
//! error, panics) is logged and discarded, and the traversal carries on.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::str::FromStr;

use tracing::{debug, warn};
use vgraph_nodes::{ExecutionContext, GraphError, Status};

use crate::EngineError;

/// The events a graph fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A step's work settled and its continuation is being processed.
    Executed,
    /// A step's work returned pending work; the traversal is suspended.
    Deferred,
    /// A step's work failed synchronously.
    Error,
    /// No edge matched; the traversal ends without a result.
    Unknown,
    /// The traversal finished.
    End,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Executed,
        EventKind::Deferred,
        EventKind::Error,
        EventKind::Unknown,
        EventKind::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Executed => "executed",
            EventKind::Deferred => "deferred",
            EventKind::Error => "error",
            EventKind::Unknown => "unknown",
            EventKind::End => "end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::UnknownEvent(s.to_owned()))
    }
}

/// Extra payload carried by some events.
#[derive(Debug, Clone)]
pub enum EventArgs<T> {
    None,
    /// The failure behind an `error` event.
    Error(GraphError),
    /// The traversal result; `None` when it ended on an unresolved edge.
    End(Option<Status<T>>),
}

/// What a listener receives.
pub struct Event<'a, T> {
    pub kind: EventKind,
    pub context: &'a ExecutionContext<T>,
    pub args: &'a EventArgs<T>,
}

/// Handle returned by [`EventDispatcher::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Rc<dyn Fn(&Event<'_, T>) -> anyhow::Result<()>>;

/// Event name → ordered listeners.
pub struct EventDispatcher<T> {
    listeners: RefCell<HashMap<EventKind, Vec<(ListenerId, Listener<T>)>>>,
    next_id: Cell<u64>,
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<T> EventDispatcher<T> {
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event<'_, T>) -> anyhow::Result<()> + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// Remove the first listener registered under `id`. Returns whether one
    /// was found.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|(existing, _)| *existing == id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.borrow().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every listener for `kind`, isolating each one's failure.
    pub fn fire(&self, kind: EventKind, context: &ExecutionContext<T>, args: &EventArgs<T>) {
        // Snapshot so listeners may (un)register while we iterate.
        let snapshot: Vec<Listener<T>> = match self.listeners.borrow().get(&kind) {
            Some(list) => list.iter().map(|(_, listener)| Rc::clone(listener)).collect(),
            None => return,
        };

        let event = Event { kind, context, args };
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(event = %kind, step = context.step(), "listener failed: {err:#}"),
                Err(_) => warn!(event = %kind, step = context.step(), "listener panicked"),
            }
        }
    }
}
