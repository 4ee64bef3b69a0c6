//! Row lifecycle events for the observation layer
//!
//! Events are emitted synchronously at fixed points:
//! - `Created` after the empty row is appended
//! - `Populated` after each property write, with the old and new value
//! - `WillDelete` strictly before the swap-with-last executes
//! - `Deleted` after it, naming the row that moved into the freed slot
//! - `Cleared` after every row of a type was removed

use std::sync::{Arc, Mutex};

use crate::value::Value;

/// One row lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    Created {
        type_name: String,
        row: usize,
    },
    Populated {
        type_name: String,
        row: usize,
        property: String,
        old: Value,
        new: Value,
    },
    WillDelete {
        type_name: String,
        row: usize,
    },
    /// `moved_from` is the former index of the row now living at `row`,
    /// absent when the deleted row was the last one.
    Deleted {
        type_name: String,
        row: usize,
        moved_from: Option<usize>,
    },
    Cleared {
        type_name: String,
    },
}

impl RowEvent {
    pub fn type_name(&self) -> &str {
        match self {
            RowEvent::Created { type_name, .. }
            | RowEvent::Populated { type_name, .. }
            | RowEvent::WillDelete { type_name, .. }
            | RowEvent::Deleted { type_name, .. }
            | RowEvent::Cleared { type_name } => type_name,
        }
    }
}

/// Subscriber to row lifecycle events.
pub trait LifecycleObserver: Send {
    fn on_event(&self, event: &RowEvent);
}

/// Observer that records every event, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RowEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events in emission order.
    pub fn events(&self) -> Vec<RowEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl LifecycleObserver for EventLog {
    fn on_event(&self, event: &RowEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
