//! Service layer of the anomaly-detection desktop app.
//!
//! The UI talks to two pool services over message channels: a
//! `ModelService` running one model worker process per metric stream, and a
//! `ParamFinderService` running one-shot analysis workers. Workers speak
//! newline-delimited JSON over stdio; the `ipc` bridges translate between
//! command envelopes and unit-scoped event messages.

pub mod config;
pub mod ipc;
pub mod runner;
pub mod service;

pub use config::{HostConfig, RunnerSpec};
pub use service::{ModelService, ParamFinderService, ServiceError, UnitEvent, UnitService};
