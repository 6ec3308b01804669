//! Bridge between a UI-facing message channel and a pool service.
//!
//! One bridge per service. A dispatch thread drains inbound command
//! envelopes; every dispatch error is converted into an outbound `error`
//! message tagged with the offending envelope, so nothing thrown by the
//! service can take the channel down.
//!
//! Per unit id the bridge is a small state machine:
//! unattached → attached (forwarder thread live) → detached. It attaches on
//! `create` (idempotently), and detaches on `remove` or on the unit's
//! `close` event so listeners never leak.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use serde_json::Value;

use crate::service::{ServiceError, UnitEvent, UnitService};

use super::messages::{ChannelMessage, CommandEnvelope, ErrorPayload};

pub struct ServiceBridge<S: UnitService + 'static> {
    tag: &'static str,
    service: Arc<S>,
    outbound: Sender<ChannelMessage>,
    attached: Arc<Mutex<HashSet<String>>>,
}

impl<S: UnitService + 'static> ServiceBridge<S> {
    pub fn new(tag: &'static str, service: Arc<S>, outbound: Sender<ChannelMessage>) -> Self {
        Self {
            tag,
            service,
            outbound,
            attached: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Spawn the dispatch loop. It runs until the inbound channel closes.
    pub fn start(self, inbound: Receiver<CommandEnvelope>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for envelope in inbound.iter() {
                self.handle(envelope);
            }
            log::info!("[{}] inbound channel closed, dispatch loop exiting", self.tag);
        })
    }

    /// Handle one inbound envelope. Never panics on bad input: failures go
    /// back over the channel as an `error` message scoped to the envelope's
    /// unit id.
    pub fn handle(&self, envelope: CommandEnvelope) {
        if let Err(err) = self.dispatch(&envelope) {
            log::warn!(
                "[{}] command {} for unit {} failed: {err}",
                self.tag,
                envelope.command,
                envelope.unit_id
            );
            let _ = self.outbound.send(ChannelMessage::Error {
                unit_id: envelope.unit_id.clone(),
                payload: ErrorPayload {
                    error: err.to_string(),
                    ipcevent: Some(envelope),
                },
            });
        }
    }

    fn dispatch(&self, envelope: &CommandEnvelope) -> Result<(), ServiceError> {
        match envelope.command.as_str() {
            "create" => {
                let params = envelope.params.clone().unwrap_or(Value::Null);
                let newly_attached = self.attach(&envelope.unit_id);
                if let Err(err) = self.service.create_unit(&envelope.unit_id, &params) {
                    // Nothing to listen to if the unit was never admitted.
                    // A pre-existing attachment (duplicate create) stays.
                    if newly_attached {
                        self.detach(&envelope.unit_id);
                    }
                    return Err(err);
                }
                Ok(())
            }
            "remove" => {
                self.detach(&envelope.unit_id);
                // May race a worker self-close; the resulting not-found
                // error is forwarded like any other, never thrown across
                // the channel.
                self.service.remove_unit(&envelope.unit_id)
            }
            "list" => {
                let _ = self.outbound.send(ChannelMessage::List {
                    unit_ids: self.service.unit_ids(),
                });
                Ok(())
            }
            "data" => {
                let record = envelope.params.as_ref().ok_or_else(|| {
                    ServiceError::InvalidParams("data command requires params".to_string())
                })?;
                self.service.send_data(&envelope.unit_id, record)
            }
            other => Err(ServiceError::UnknownCommand(other.to_string())),
        }
    }

    /// Subscribe to a unit and forward its events until `close`. No-op when
    /// the unit is already attached; returns whether this call attached it.
    fn attach(&self, unit_id: &str) -> bool {
        {
            let mut attached = match self.attached.lock() {
                Ok(attached) => attached,
                Err(_) => return false,
            };
            if !attached.insert(unit_id.to_string()) {
                return false;
            }
        }

        let events = self.service.subscribe(unit_id);
        let outbound = self.outbound.clone();
        let attached = self.attached.clone();
        let unit_id = unit_id.to_string();
        thread::spawn(move || {
            for event in events.iter() {
                let is_close = matches!(event, UnitEvent::Close(_));
                if outbound.send(ChannelMessage::from_event(&unit_id, event)).is_err() {
                    break; // channel consumer gone
                }
                if is_close {
                    break;
                }
            }
            if let Ok(mut attached) = attached.lock() {
                attached.remove(&unit_id);
            }
        });
        true
    }

    fn detach(&self, unit_id: &str) {
        let was_attached = self
            .attached
            .lock()
            .map(|mut attached| attached.remove(unit_id))
            .unwrap_or(false);
        if was_attached {
            // Dropping the subscription ends the forwarder thread
            self.service.unsubscribe(unit_id);
        }
    }
}
