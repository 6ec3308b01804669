//! Per-unit worker events and the subscription registry.
//!
//! Every worker event is a tagged variant scoped to one unit id. Subscribers
//! get a dedicated channel per unit id; events for unsubscribed units are
//! silently discarded (same as writing to a closed pipe). For one unit the
//! pool guarantees pipe order for `Data`, and `Close` is always last.

use std::collections::HashMap;
use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Event emitted by a unit's worker process.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    /// One newline-delimited record from the worker's stdout.
    /// The payload keeps its terminating newline.
    Data(String),
    /// A stderr line, a spawn failure, or other per-unit diagnostic.
    Error(String),
    /// Worker exited. Carries the exit code, `None` when killed by signal
    /// or when the process never spawned. Terminal for the unit.
    Close(Option<i32>),
}

/// Subscription registry keyed by unit id.
///
/// At most one subscriber per unit id; subscribing again replaces the
/// previous subscriber (its receiver disconnects).
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Sender<UnitEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a listener for one unit id.
    pub fn subscribe(&self, unit_id: &str) -> Receiver<UnitEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.insert(unit_id.to_string(), tx);
        }
        rx
    }

    /// Drop the listener for one unit id. Events already queued on the
    /// subscriber's channel stay readable until its receiver drains them.
    pub fn unsubscribe(&self, unit_id: &str) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.remove(unit_id);
        }
    }

    /// Deliver an event to the unit's subscriber, if any.
    pub fn publish(&self, unit_id: &str, event: UnitEvent) {
        if let Ok(subscribers) = self.subscribers.lock() {
            if let Some(tx) = subscribers.get(unit_id) {
                // Receiver dropped means nobody is listening anymore
                let _ = tx.send(event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_preserves_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe("1");
        bus.publish("1", UnitEvent::Data("a\n".to_string()));
        bus.publish("1", UnitEvent::Data("b\n".to_string()));
        bus.publish("1", UnitEvent::Close(Some(0)));
        assert_eq!(rx.recv().unwrap(), UnitEvent::Data("a\n".to_string()));
        assert_eq!(rx.recv().unwrap(), UnitEvent::Data("b\n".to_string()));
        assert_eq!(rx.recv().unwrap(), UnitEvent::Close(Some(0)));
    }

    #[test]
    fn test_publish_without_subscriber_is_discarded() {
        let bus = EventBus::new();
        bus.publish("nobody", UnitEvent::Data("x\n".to_string()));
        // Subscribing afterwards must not replay old events
        let rx = bus.subscribe("nobody");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_disconnects_receiver() {
        let bus = EventBus::new();
        let rx = bus.subscribe("1");
        bus.publish("1", UnitEvent::Data("a\n".to_string()));
        bus.unsubscribe("1");
        // Queued event still drains, then the channel reports disconnect
        assert_eq!(rx.recv().unwrap(), UnitEvent::Data("a\n".to_string()));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_events_are_scoped_by_unit_id() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe("1");
        let rx2 = bus.subscribe("2");
        bus.publish("2", UnitEvent::Close(Some(1)));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.recv().unwrap(), UnitEvent::Close(Some(1)));
    }
}
