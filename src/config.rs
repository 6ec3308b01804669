//! Host configuration.
//!
//! Loaded from a JSON file when one is given, otherwise defaults: both
//! runner specs point back at this binary in worker mode, and the model
//! concurrency ceiling is derived from the machine.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// How to invoke a worker program. The service appends the per-unit
/// arguments (`--model/--stats`, `--input`) after `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl RunnerSpec {
    /// This binary in the given worker mode (`--model-runner` or
    /// `--param-finder-runner`).
    pub fn bundled(mode_flag: &str) -> Self {
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("anomaly_sidecar"));
        Self {
            program,
            args: vec![mode_flag.to_string()],
        }
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub model_runner: RunnerSpec,
    pub param_finder_runner: RunnerSpec,
    /// Pin the model concurrency ceiling instead of deriving it from the
    /// machine.
    pub max_concurrency: Option<usize>,
    pub log_dir: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            model_runner: RunnerSpec::bundled("--model-runner"),
            param_finder_runner: RunnerSpec::bundled("--param-finder-runner"),
            max_concurrency: None,
            log_dir: "logs".to_string(),
        }
    }
}

impl HostConfig {
    pub fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(system_max_concurrency)
    }
}

/// Read the config file, or fall back to defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<HostConfig> {
    match path {
        None => Ok(HostConfig::default()),
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            let config: HostConfig = serde_json::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            Ok(config)
        }
    }
}

/// Concurrency ceiling for this machine: one model per cpu (keeping one
/// core free), further capped by one model per GiB of memory, never below 2.
pub fn system_max_concurrency() -> usize {
    let system = sysinfo::System::new_all();
    let cpus = system.cpus().len();
    let total_gib = (system.total_memory() / (1024 * 1024 * 1024)) as usize;
    concurrency_for(cpus, total_gib)
}

fn concurrency_for(cpus: usize, total_gib: usize) -> usize {
    cpus.saturating_sub(1).min(total_gib).max(2)
}
