//! Bundled param-finder runner.
//!
//! Spawned as `anomaly_sidecar --param-finder-runner --input <json>`.
//! One-shot: validates the input spec, derives aggregation and model
//! params for the metric, writes them as a single JSON line to stdout and
//! exits 0. A bad spec aborts with a stderr diagnostic and exit 1.

use std::io::{self, BufRead};

use serde::Deserialize;
use serde_json::json;

use super::flag_value;

/// Input spec for one metric. Mirrors what the create command carries in
/// `params`: where the metric's CSV lives and which columns matter.
/// Extra fields (row offsets, header flags) belong to real backends and
/// are ignored here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputSpec {
    csv: String,
    #[serde(default)]
    timestamp_index: usize,
    #[serde(default = "default_value_index")]
    value_index: usize,
    #[serde(default)]
    datetime_format: Option<String>,
}

fn default_value_index() -> usize {
    1
}

pub fn run(args: &[String]) -> i32 {
    let raw = match flag_value(args, "--input") {
        Some(raw) => raw,
        None => {
            eprintln!("[PARAM_FINDER] usage: --param-finder-runner --input <json>");
            return 2;
        }
    };

    let spec: InputSpec = match serde_json::from_str(raw) {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("[PARAM_FINDER] --input value failed validation: {err}");
            return 1;
        }
    };
    if spec.csv.is_empty() {
        eprintln!("[PARAM_FINDER] --input value has an empty csv path");
        return 1;
    }

    let output = json!({
        "aggInfo": {
            "windowSize": 1200,
            "func": "mean"
        },
        "modelInfo": {
            "timestampFieldName": format!("c{}", spec.timestamp_index),
            "valueFieldName": format!("c{}", spec.value_index),
            "datetimeFormat": spec.datetime_format,
            "modelConfig": {
                "model": "anomaly_detector",
                "version": 1,
                "probation": 10
            }
        }
    });
    println!("{output}");

    // Stay resident until the host closes our stdin: teardown belongs to
    // the host, and exiting early would race its remove path.
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        if line.is_err() {
            break;
        }
    }
    0
}
