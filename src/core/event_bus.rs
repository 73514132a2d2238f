//! Deferred event queue for canonical lifecycle events.
//!
//! `emit()` queues an event from any thread; `poll()` hands the whole queue
//! to the owner, oldest first (the pipeline drains it after each pump).
//! The queue is unbounded: every emitted event is delivered by a later
//! `poll()`.

use std::any::Any;
use std::sync::{Arc, Mutex};

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Shared FIFO of type-erased events.
///
/// Cloning shares the queue.
#[derive(Clone, Default)]
pub struct EventBus {
    queue: Arc<Mutex<Vec<BoxedEvent>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("queue_len", &self.queue_len()).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the event for `poll()`.
    pub fn emit<E: Event>(&self, event: E) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(event));
    }

    /// Take all events queued since the last poll, oldest first.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Downcast a queued event to its concrete type.
///
/// Must deref to `dyn Event` before `as_any()`: the blanket impl also covers
/// `Box<dyn Event>` itself, which would hand back the box instead.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CanonicalEvent, RawNotification};
    use serde_json::json;

    fn saved() -> CanonicalEvent {
        CanonicalEvent::Saved(RawNotification::new("Comp_Save", json!({"success": true})))
    }

    #[test]
    fn test_poll_drains_in_order() {
        let bus = EventBus::new();
        bus.emit(saved());
        bus.emit(CanonicalEvent::Created(RawNotification::new("Comp_New", json!({}))));

        let topics: Vec<&str> = bus
            .poll()
            .iter()
            .filter_map(downcast_event::<CanonicalEvent>)
            .map(CanonicalEvent::topic)
            .collect();
        assert_eq!(topics, vec!["save", "new"]);
        assert_eq!(bus.queue_len(), 0);
    }

    #[test]
    fn test_other_types_do_not_downcast() {
        let bus = EventBus::new();
        bus.emit(42_u32);
        let events = bus.poll();
        assert!(downcast_event::<CanonicalEvent>(&events[0]).is_none());
        assert_eq!(downcast_event::<u32>(&events[0]), Some(&42));
    }

    #[test]
    fn test_clones_share_queue() {
        let bus = EventBus::new();
        let other = bus.clone();
        other.emit(saved());
        assert_eq!(bus.queue_len(), 1);
    }

    #[test]
    fn test_large_backlog_is_kept_whole() {
        let bus = EventBus::new();
        for i in 0..5000_usize {
            bus.emit(i);
        }
        let events = bus.poll();
        assert_eq!(events.len(), 5000);
        assert_eq!(downcast_event::<usize>(&events[0]), Some(&0));
        assert_eq!(downcast_event::<usize>(&events[4999]), Some(&4999));
    }
}
