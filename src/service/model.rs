//! Model service: a concurrency-bounded pool of model-runner workers.
//!
//! Each model is one worker process spawned as
//! `<runner> --model <id> --stats <json>`. The worker reads
//! `[timestamp, value]` records from stdin one JSON line at a time and
//! writes one JSON result line per record.

use crossbeam_channel::Receiver;
use serde_json::Value;

use crate::config::RunnerSpec;

use super::error::ServiceError;
use super::events::UnitEvent;
use super::pool::{encode_record, ProcessPool};
use super::UnitService;

pub struct ModelService {
    pool: ProcessPool,
    runner: RunnerSpec,
    max_concurrency: usize,
}

impl ModelService {
    /// `max_concurrency` is fixed for the service's lifetime; see
    /// `config::system_max_concurrency` for the machine-derived default.
    pub fn new(runner: RunnerSpec, max_concurrency: usize) -> Self {
        log::info!("[MODEL_SVC] starting with max concurrency {max_concurrency}");
        Self {
            pool: ProcessPool::new("MODEL_SVC"),
            runner,
            max_concurrency,
        }
    }

    /// Number of slots available to run new models. Never negative.
    pub fn available_slots(&self) -> usize {
        self.max_concurrency.saturating_sub(self.pool.len())
    }

    /// Spawn a model worker.
    ///
    /// Fails synchronously with `TooManyModels` when the pool is at its
    /// ceiling (callers pre-flight on this) and `DuplicateModelId` when the
    /// id is already live. The ceiling only gates new ids; existing models
    /// can always be fed or removed.
    pub fn create_model(&self, model_id: &str, stats: &Value) -> Result<(), ServiceError> {
        if self.available_slots() == 0 {
            return Err(ServiceError::TooManyModels);
        }
        if self.pool.contains(model_id) {
            return Err(ServiceError::DuplicateModelId(model_id.to_string()));
        }

        let mut command = self.runner.command();
        command
            .arg("--model")
            .arg(model_id)
            .arg("--stats")
            .arg(stats.to_string());
        self.pool.spawn_unit(model_id, command);
        Ok(())
    }

    /// Kill a model's worker and drop it from the pool.
    pub fn remove_model(&self, model_id: &str) -> Result<(), ServiceError> {
        if !self.pool.kill_unit(model_id) {
            return Err(ServiceError::ModelNotFound(model_id.to_string()));
        }
        self.pool.unsubscribe(model_id);
        Ok(())
    }

    /// Write one input record to the model's stdin as a JSON line.
    pub fn send_data(&self, model_id: &str, record: &Value) -> Result<(), ServiceError> {
        let line = encode_record(record)?;
        if !self.pool.write_line(model_id, &line) {
            return Err(ServiceError::ModelNotFound(model_id.to_string()));
        }
        Ok(())
    }

    /// Ids of the live models, in creation order.
    pub fn get_models(&self) -> Vec<String> {
        self.pool.unit_ids()
    }

    pub fn subscribe(&self, model_id: &str) -> Receiver<UnitEvent> {
        self.pool.subscribe(model_id)
    }

    pub fn unsubscribe(&self, model_id: &str) {
        self.pool.unsubscribe(model_id)
    }
}

impl UnitService for ModelService {
    fn create_unit(&self, unit_id: &str, params: &Value) -> Result<(), ServiceError> {
        self.create_model(unit_id, params)
    }

    fn remove_unit(&self, unit_id: &str) -> Result<(), ServiceError> {
        self.remove_model(unit_id)
    }

    fn send_data(&self, unit_id: &str, record: &Value) -> Result<(), ServiceError> {
        ModelService::send_data(self, unit_id, record)
    }

    fn unit_ids(&self) -> Vec<String> {
        self.get_models()
    }

    fn subscribe(&self, unit_id: &str) -> Receiver<UnitEvent> {
        ModelService::subscribe(self, unit_id)
    }

    fn unsubscribe(&self, unit_id: &str) {
        ModelService::unsubscribe(self, unit_id)
    }
}
