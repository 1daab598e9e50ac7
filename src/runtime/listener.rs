use std::sync::Mutex;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Activity entered and began its work or its join.
    Start,
    /// Task suspended, waiting for an external signal.
    Wait,
    /// Activity completed and took its outbound flows.
    End,
    /// Activity finished resolving its outbound flows, taken or discarded.
    Leave,
    /// Sequence flow taken.
    Taken,
    /// Sequence flow discarded.
    Discarded,
    /// Activity failed; the branch cannot continue.
    Error,
}

/// Notification delivered synchronously at the transition point.
/// `element_id` is an activity id, or a flow id for `Taken`/`Discarded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub element_id: String,
}

impl Event {
    pub fn new(kind: EventKind, element_id: &str) -> Self {
        Self { kind, element_id: element_id.to_string() }
    }
}

pub trait Listener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Listener that records everything it sees, in delivery order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind, element_id: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.kind == kind && e.element_id == element_id)
            .count()
    }

    /// Element ids of every event of `kind`, in delivery order.
    pub fn ids(&self, kind: EventKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.element_id)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Listener for EventLog {
    fn on_event(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
