//! Host entry point.
//!
//! In host mode the binary owns both pool services and multiplexes their
//! IPC channels over its own stdin/stdout as newline-delimited JSON, one
//! channel-tagged message per line. With `--model-runner` or
//! `--param-finder-runner` it runs as a worker instead (spawned by the
//! host itself when no external backend is configured).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chrono::Local;
use crossbeam_channel::{select, unbounded, Sender};
use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::{Deserialize, Serialize};

use anomaly_sidecar::config::{load_config, HostConfig};
use anomaly_sidecar::ipc::{
    ChannelMessage, CommandEnvelope, ServiceBridge, MODEL_SERVICE_CHANNEL,
    PARAM_FINDER_SERVICE_CHANNEL,
};
use anomaly_sidecar::runner;
use anomaly_sidecar::service::{ModelService, ParamFinderService};

// ─── Stdio framing ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundLine {
    channel: String,
    #[serde(flatten)]
    envelope: CommandEnvelope,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundLine<'a> {
    channel: &'a str,
    #[serde(flatten)]
    message: &'a ChannelMessage,
}

// ─── Setup & Main ─────────────────────────────────────────────────────

fn setup_logging(log_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    let log_path = format!("{log_dir}/{timestamp}.log");

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}",
        )))
        .build(log_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(Root::builder().appender("file").build(LevelFilter::Info))?;

    log4rs::init_config(config)?;

    Ok(())
}

fn main() {
    // Check for worker flags BEFORE host setup: worker modes own the
    // process's stdio and must not touch the host's log configuration.
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--model-runner") {
        std::process::exit(runner::model_runner::run(&args));
    }
    if args.iter().any(|arg| arg == "--param-finder-runner") {
        std::process::exit(runner::param_finder_runner::run(&args));
    }

    let config_path = args
        .windows(2)
        .find(|pair| pair[0] == "--config")
        .map(|pair| PathBuf::from(&pair[1]));
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[HOST] {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = setup_logging(&config.log_dir) {
        eprintln!("Failed to set up logging: {err}");
    }

    run_host(config);
}

// ─── Host loop ────────────────────────────────────────────────────────

fn run_host(config: HostConfig) {
    log::info!("[HOST] starting (pid {})", std::process::id());

    let model_service = Arc::new(ModelService::new(
        config.model_runner.clone(),
        config.effective_max_concurrency(),
    ));
    let param_finder_service = Arc::new(ParamFinderService::new(config.param_finder_runner.clone()));

    let (model_in_tx, model_in_rx) = unbounded::<CommandEnvelope>();
    let (model_out_tx, model_out_rx) = unbounded::<ChannelMessage>();
    let (pf_in_tx, pf_in_rx) = unbounded::<CommandEnvelope>();
    let (pf_out_tx, pf_out_rx) = unbounded::<ChannelMessage>();

    ServiceBridge::new("MODEL_IPC", model_service.clone(), model_out_tx).start(model_in_rx);
    ServiceBridge::new("PF_IPC", param_finder_service.clone(), pf_out_tx).start(pf_in_rx);

    // Stdin reader thread: the select loop below must never block on a pipe
    let (line_tx, line_rx) = unbounded::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    loop {
        select! {
            recv(line_rx) -> line => match line {
                Ok(line) => route_inbound(&line, &model_in_tx, &pf_in_tx),
                Err(_) => break, // UI closed our stdin: shut down
            },
            recv(model_out_rx) -> message => {
                if let Ok(message) = message {
                    write_outbound(&mut stdout, MODEL_SERVICE_CHANNEL, &message);
                }
            },
            recv(pf_out_rx) -> message => {
                if let Ok(message) = message {
                    write_outbound(&mut stdout, PARAM_FINDER_SERVICE_CHANNEL, &message);
                }
            },
        }
    }

    log::info!("[HOST] stdin closed, shutting down");

    // Workers must not outlive the host
    for model_id in model_service.get_models() {
        let _ = model_service.remove_model(&model_id);
    }
    for metric_id in param_finder_service.get_param_finders() {
        let _ = param_finder_service.remove_param_finder(&metric_id);
    }
}

fn route_inbound(line: &str, model_tx: &Sender<CommandEnvelope>, pf_tx: &Sender<CommandEnvelope>) {
    let inbound: InboundLine = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(err) => {
            log::error!("[HOST] unparseable inbound line: {err}");
            return;
        }
    };
    let delivered = match inbound.channel.as_str() {
        MODEL_SERVICE_CHANNEL => model_tx.send(inbound.envelope).is_ok(),
        PARAM_FINDER_SERVICE_CHANNEL => pf_tx.send(inbound.envelope).is_ok(),
        other => {
            log::warn!("[HOST] message for unknown channel {other}");
            true
        }
    };
    if !delivered {
        log::warn!("[HOST] bridge inbound channel closed");
    }
}

fn write_outbound(stdout: &mut impl Write, channel: &str, message: &ChannelMessage) {
    match serde_json::to_string(&OutboundLine { channel, message }) {
        Ok(json) => {
            if writeln!(stdout, "{json}").and_then(|()| stdout.flush()).is_err() {
                log::warn!("[HOST] failed to write outbound message to stdout");
            }
        }
        Err(err) => log::error!("[HOST] failed to encode outbound message: {err}"),
    }
}
