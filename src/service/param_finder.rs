//! Param-finder service: at most one live run per metric id.
//!
//! A param-finder worker is one-shot: spawned as `<runner> --input <json>`,
//! it analyzes the metric described by the input spec, writes a single
//! result line (aggregation plus model params) to stdout and exits.

use crossbeam_channel::Receiver;
use serde_json::Value;

use crate::config::RunnerSpec;

use super::error::ServiceError;
use super::events::UnitEvent;
use super::pool::{encode_record, ProcessPool};
use super::UnitService;

pub struct ParamFinderService {
    pool: ProcessPool,
    runner: RunnerSpec,
}

impl ParamFinderService {
    pub fn new(runner: RunnerSpec) -> Self {
        Self {
            pool: ProcessPool::new("PF_SVC"),
            runner,
        }
    }

    /// Slots available for this metric: 1 when idle, 0 while a run is live.
    /// The single-instance limit is per metric id; runs for different
    /// metrics proceed concurrently.
    pub fn available_slots(&self, metric_id: &str) -> usize {
        if self.pool.contains(metric_id) {
            0
        } else {
            1
        }
    }

    /// Start a param-finder run for a metric.
    ///
    /// Fails synchronously when a run for this metric is already live.
    pub fn create_param_finder(&self, metric_id: &str, input_opt: &Value) -> Result<(), ServiceError> {
        if self.pool.contains(metric_id) {
            return Err(ServiceError::ParamFinderRunning(metric_id.to_string()));
        }

        let mut command = self.runner.command();
        command.arg("--input").arg(input_opt.to_string());
        self.pool.spawn_unit(metric_id, command);
        Ok(())
    }

    /// Kill a metric's param-finder run and drop it from the pool.
    pub fn remove_param_finder(&self, metric_id: &str) -> Result<(), ServiceError> {
        if !self.pool.kill_unit(metric_id) {
            return Err(ServiceError::ParamFinderNotFound(metric_id.to_string()));
        }
        self.pool.unsubscribe(metric_id);
        Ok(())
    }

    /// Metric ids with a live run.
    pub fn get_param_finders(&self) -> Vec<String> {
        self.pool.unit_ids()
    }

    pub fn subscribe(&self, metric_id: &str) -> Receiver<UnitEvent> {
        self.pool.subscribe(metric_id)
    }

    pub fn unsubscribe(&self, metric_id: &str) {
        self.pool.unsubscribe(metric_id)
    }
}

impl UnitService for ParamFinderService {
    fn create_unit(&self, unit_id: &str, params: &Value) -> Result<(), ServiceError> {
        self.create_param_finder(unit_id, params)
    }

    fn remove_unit(&self, unit_id: &str) -> Result<(), ServiceError> {
        self.remove_param_finder(unit_id)
    }

    fn send_data(&self, unit_id: &str, record: &Value) -> Result<(), ServiceError> {
        // Param finders take their whole input via --input, but the stdin
        // pipe is still the pool's to write.
        let line = encode_record(record)?;
        if !self.pool.write_line(unit_id, &line) {
            return Err(ServiceError::ParamFinderNotFound(unit_id.to_string()));
        }
        Ok(())
    }

    fn unit_ids(&self) -> Vec<String> {
        self.get_param_finders()
    }

    fn subscribe(&self, unit_id: &str) -> Receiver<UnitEvent> {
        ParamFinderService::subscribe(self, unit_id)
    }

    fn unsubscribe(&self, unit_id: &str) {
        ParamFinderService::unsubscribe(self, unit_id)
    }
}
