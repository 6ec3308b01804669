//! Bundled model runner.
//!
//! Spawned as `anomaly_sidecar --model-runner --model <id> --stats <json>`.
//! Reads one `[timestamp, value]` record per line from stdin, scores the
//! value against a running mean/deviation baseline, and writes one
//! `[timestamp, value, score]` line per record to stdout. Invalid arguments
//! or input abort with a stderr diagnostic and a non-zero exit.

use std::io::{self, BufRead, Write};

use serde::Deserialize;
use serde_json::Value;

use super::flag_value;

/// Runner options carried in the `--stats` blob. Unknown fields are
/// model parameters for real backends and are ignored here.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RunnerStats {
    /// Rows scored at the neutral 0.5 while the baseline warms up.
    probation: usize,
    /// Buffer this many results and flush them as a single write.
    /// 0 disables batching.
    batch: usize,
}

impl Default for RunnerStats {
    fn default() -> Self {
        Self {
            probation: 10,
            batch: 0,
        }
    }
}

/// Running mean/deviation over the values seen so far (Welford).
#[derive(Debug, Default)]
struct Baseline {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Baseline {
    /// Score in [0, 1]: 0 on the mean, saturating at three standard
    /// deviations.
    fn score(&self, value: f64) -> f64 {
        if self.count < 2 {
            return 0.5;
        }
        let variance = self.m2 / (self.count - 1) as f64;
        let deviation = variance.sqrt();
        if deviation == 0.0 {
            if value == self.mean {
                0.0
            } else {
                1.0
            }
        } else {
            ((value - self.mean).abs() / (3.0 * deviation)).min(1.0)
        }
    }

    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }
}

pub fn run(args: &[String]) -> i32 {
    let model_id = match flag_value(args, "--model") {
        Some(id) => id,
        None => {
            eprintln!("[MODEL_RUNNER] usage: --model-runner --model <id> --stats <json>");
            return 2;
        }
    };
    let stats: RunnerStats = match serde_json::from_str(flag_value(args, "--stats").unwrap_or("{}")) {
        Ok(stats) => stats,
        Err(err) => {
            eprintln!("[MODEL_RUNNER] invalid --stats value: {err}");
            return 2;
        }
    };

    // No startup banner: stderr is the error channel, and anything written
    // here reaches the UI as an error event.
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut baseline = Baseline::default();
    let mut rows: usize = 0;
    let mut pending = String::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break, // stdin closed (parent died)
        };
        if line.trim().is_empty() {
            continue;
        }

        let (timestamp, value) = match parse_record(&line) {
            Some(record) => record,
            None => {
                eprintln!("[MODEL_RUNNER] model {model_id}: invalid input record: {line}");
                return 1;
            }
        };

        let score = if rows < stats.probation {
            0.5
        } else {
            baseline.score(value)
        };
        baseline.update(value);
        rows += 1;

        let result = Value::Array(vec![timestamp, Value::from(value), Value::from(score)]);
        pending.push_str(&result.to_string());
        pending.push('\n');
        if stats.batch == 0 || rows % stats.batch == 0 {
            if write_pending(&mut stdout, &mut pending).is_err() {
                return 1;
            }
        }
    }

    // Flush whatever a partial batch still holds before a clean exit
    if write_pending(&mut stdout, &mut pending).is_err() {
        return 1;
    }
    0
}

/// One `[timestamp, value]` record. The timestamp is kept opaque (number or
/// string) and echoed back as-is; the value must be numeric.
fn parse_record(line: &str) -> Option<(Value, f64)> {
    let record: Value = serde_json::from_str(line).ok()?;
    let fields = record.as_array()?;
    if fields.len() != 2 {
        return None;
    }
    if !(fields[0].is_number() || fields[0].is_string()) {
        return None;
    }
    let value = fields[1].as_f64()?;
    Some((fields[0].clone(), value))
}

/// Write buffered result lines as one write, then flush.
fn write_pending(stdout: &mut impl Write, pending: &mut String) -> io::Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    stdout.write_all(pending.as_bytes())?;
    stdout.flush()?;
    pending.clear();
    Ok(())
}
