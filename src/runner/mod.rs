//! Worker modes of this binary.
//!
//! The host spawns these by default until a real backend runner is
//! configured: `--model-runner` scores streamed records, and
//! `--param-finder-runner` produces aggregation/model params for a metric.
//! Both follow the worker stdio contract: JSON lines on stdin/stdout,
//! diagnostics on stderr, exit 0 on graceful shutdown.

pub mod model_runner;
pub mod param_finder_runner;

/// Value of `<flag> <value>` in an argument list.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1].as_str())
}
