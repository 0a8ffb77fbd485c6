//! Event dispatcher
//!
//! Observer lists for note-on, note-off and controller events. Registration
//! returns a [`Subscription`] that can later be passed to
//! [`EventDispatcher::unsubscribe`].
//!
//! Observers run synchronously, in registration order. A panicking observer is
//! caught and logged; the remaining observers and the rest of the drain still run.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

use crate::channel::MidiChannel;

/// Note-on observer: (channel, note, velocity in [0, 1])
pub type NoteOnObserver = dyn Fn(MidiChannel, u8, f32) + Send + Sync;
/// Note-off observer: (channel, note)
pub type NoteOffObserver = dyn Fn(MidiChannel, u8) + Send + Sync;
/// Controller observer: (channel, controller number, level in [0, 1])
pub type ControllerObserver = dyn Fn(MidiChannel, u8, f32) + Send + Sync;

/// Event produced while draining the inbound queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEvent {
    NoteOn {
        channel: MidiChannel,
        note: u8,
        velocity: f32,
    },
    NoteOff {
        channel: MidiChannel,
        note: u8,
    },
    Controller {
        channel: MidiChannel,
        number: u8,
        level: f32,
    },
}

impl MidiEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MidiEvent::NoteOn { .. } => EventKind::NoteOn,
            MidiEvent::NoteOff { .. } => EventKind::NoteOff,
            MidiEvent::Controller { .. } => EventKind::Controller,
        }
    }
}

/// The three observable event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    Controller,
}

/// Handle returned by registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "dropping the subscription handle makes the observer impossible to remove"]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Ordered list of observers of one kind
struct ObserverList<F: ?Sized> {
    entries: RwLock<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> ObserverList<F> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, id: u64, observer: Arc<F>) {
        self.entries.write().push((id, observer));
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Clone the current observers so callbacks run without holding the lock
    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.read().iter().map(|(_, f)| f.clone()).collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Observer registry and dispatcher
pub struct EventDispatcher {
    next_id: AtomicU64,
    note_on: ObserverList<NoteOnObserver>,
    note_off: ObserverList<NoteOffObserver>,
    controller: ObserverList<ControllerObserver>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            note_on: ObserverList::new(),
            note_off: ObserverList::new(),
            controller: ObserverList::new(),
        }
    }

    fn next_subscription(&self, kind: EventKind) -> Subscription {
        Subscription {
            kind,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Register a note-on observer
    pub fn on_note_on<F>(&self, observer: F) -> Subscription
    where
        F: Fn(MidiChannel, u8, f32) + Send + Sync + 'static,
    {
        let sub = self.next_subscription(EventKind::NoteOn);
        self.note_on.push(sub.id, Arc::new(observer));
        sub
    }

    /// Register a note-off observer
    pub fn on_note_off<F>(&self, observer: F) -> Subscription
    where
        F: Fn(MidiChannel, u8) + Send + Sync + 'static,
    {
        let sub = self.next_subscription(EventKind::NoteOff);
        self.note_off.push(sub.id, Arc::new(observer));
        sub
    }

    /// Register a controller observer
    pub fn on_controller<F>(&self, observer: F) -> Subscription
    where
        F: Fn(MidiChannel, u8, f32) + Send + Sync + 'static,
    {
        let sub = self.next_subscription(EventKind::Controller);
        self.controller.push(sub.id, Arc::new(observer));
        sub
    }

    /// Remove an observer. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        match subscription.kind {
            EventKind::NoteOn => self.note_on.remove(subscription.id),
            EventKind::NoteOff => self.note_off.remove(subscription.id),
            EventKind::Controller => self.controller.remove(subscription.id),
        }
    }

    pub fn observer_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::NoteOn => self.note_on.len(),
            EventKind::NoteOff => self.note_off.len(),
            EventKind::Controller => self.controller.len(),
        }
    }

    /// Deliver one event to every observer of its kind
    pub fn dispatch(&self, event: &MidiEvent) {
        trace!("Dispatching {:?}", event);
        match *event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                for observer in self.note_on.snapshot() {
                    isolate(event, || observer(channel, note, velocity));
                }
            }
            MidiEvent::NoteOff { channel, note } => {
                for observer in self.note_off.snapshot() {
                    isolate(event, || observer(channel, note));
                }
            }
            MidiEvent::Controller {
                channel,
                number,
                level,
            } => {
                for observer in self.controller.snapshot() {
                    isolate(event, || observer(channel, number, level));
                }
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one observer, logging instead of propagating a panic
fn isolate(event: &MidiEvent, call: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(call)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Observer panicked while handling {:?}: {}", event, reason);
    }
}
