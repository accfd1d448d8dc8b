//! Single-threaded publish/subscribe for profile change notifications.

use crate::models::GpuProfile;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Events published by the controller and the file monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEvent {
    /// Freshly observed configured profile.
    ProfileChanged(GpuProfile),
}

impl SwitchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SwitchEvent::ProfileChanged(_) => "profile-changed",
        }
    }
}

impl fmt::Display for SwitchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchEvent::ProfileChanged(profile) => write!(f, "{}({})", self.name(), profile),
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&SwitchEvent)>;

/// Publish/subscribe channel.
///
/// Handlers run synchronously in subscription order on the emitting thread.
/// A panicking handler is caught and logged and does not stop the others.
/// Subscriptions added or removed from inside a handler apply from the next
/// emission.
#[derive(Default)]
pub struct EventBus {
    handlers: RefCell<Vec<(SubscriptionId, Handler)>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Register a handler for every emitted event.
    pub fn on<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SwitchEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.handlers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Remove a handler. Returns false when the id was not subscribed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Deliver an event to every current subscriber.
    pub fn emit(&self, event: SwitchEvent) {
        // Snapshot so handlers may call on()/off() without a double borrow.
        let snapshot: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .borrow()
            .iter()
            .map(|(id, h)| (*id, Rc::clone(h)))
            .collect();

        log::debug!("[EventBus] emit {} to {} handler(s)", event, snapshot.len());

        for (id, handler) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                log::error!("[EventBus] handler {:?} panicked on {}", id, event.name());
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
