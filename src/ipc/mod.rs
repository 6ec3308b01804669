//! UI-facing IPC: command envelopes in, unit-scoped event messages out.

pub mod bridge;
pub mod messages;

pub use bridge::ServiceBridge;
pub use messages::{ChannelMessage, CommandEnvelope, ErrorPayload};

/// Channel carrying model-service traffic.
pub const MODEL_SERVICE_CHANNEL: &str = "MODEL_SERVICE_IPC_CHANNEL";

/// Channel carrying param-finder traffic.
pub const PARAM_FINDER_SERVICE_CHANNEL: &str = "PARAM_FINDER_SERVICE_IPC_CHANNEL";
