//! Model service tests against the bundled model runner.
//!
//! These spawn real worker processes (this crate's own binary in
//! `--model-runner` mode) to exercise the spawn/stream/kill paths.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};

use anomaly_sidecar::config::RunnerSpec;
use anomaly_sidecar::service::{ModelService, ServiceError, UnitEvent};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn bundled_model_runner() -> RunnerSpec {
    RunnerSpec {
        program: PathBuf::from(env!("CARGO_BIN_EXE_anomaly_sidecar")),
        args: vec!["--model-runner".to_string()],
    }
}

/// Collect events for one unit until its `close` arrives.
fn events_until_close(rx: &crossbeam_channel::Receiver<UnitEvent>) -> Vec<UnitEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv_timeout(RECV_TIMEOUT).expect("no event before timeout");
        let done = matches!(event, UnitEvent::Close(_));
        events.push(event);
        if done {
            return events;
        }
    }
}

#[test]
fn test_create_and_list_model() {
    let service = ModelService::new(bundled_model_runner(), 4);
    service.create_model("1", &json!({})).unwrap();
    assert_eq!(service.get_models(), vec!["1".to_string()]);
    assert_eq!(service.available_slots(), 3);

    service.remove_model("1").unwrap();
    assert!(service.get_models().is_empty());
    assert_eq!(service.available_slots(), 4);
}

#[test]
fn test_data_round_trip() {
    let service = ModelService::new(bundled_model_runner(), 4);
    let rx = service.subscribe("1");
    service.create_model("1", &json!({})).unwrap();

    service.send_data("1", &json!([1438649711, 835.93679])).unwrap();

    let event = rx.recv_timeout(RECV_TIMEOUT).expect("no data event");
    let payload = match event {
        UnitEvent::Data(payload) => payload,
        other => panic!("expected data event, got {other:?}"),
    };
    assert!(payload.ends_with('\n'));

    let result: Value = serde_json::from_str(payload.trim()).unwrap();
    let fields = result.as_array().unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0], json!(1438649711));
    assert_eq!(fields[1], json!(835.93679));
    // First rows score at the neutral probation value
    assert_eq!(fields[2], json!(0.5));

    service.remove_model("1").unwrap();
}

#[test]
fn test_capacity_limit() {
    let service = ModelService::new(bundled_model_runner(), 2);
    service.create_model("1", &json!({})).unwrap();
    service.create_model("2", &json!({})).unwrap();
    assert_eq!(service.available_slots(), 0);

    let err = service.create_model("extra", &json!({})).unwrap_err();
    assert!(matches!(err, ServiceError::TooManyModels));
    assert!(err.to_string().contains("Too many models"));

    // Existing models stay operable at the ceiling
    service.send_data("1", &json!([1, 10.0])).unwrap();

    // Freeing one slot admits a new model
    service.remove_model("1").unwrap();
    service.create_model("extra", &json!({})).unwrap();

    service.remove_model("2").unwrap();
    service.remove_model("extra").unwrap();
}

#[test]
fn test_duplicate_model_id_rejected() {
    let service = ModelService::new(bundled_model_runner(), 4);
    service.create_model("1", &json!({})).unwrap();

    let err = service.create_model("1", &json!({})).unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateModelId(_)));

    service.remove_model("1").unwrap();
}

// A batch-flushing worker writes several records in one pipe write; the
// service must still deliver one data event per record, in order, with the
// close strictly last.
#[test]
fn test_event_order_with_batched_writes() {
    let service = ModelService::new(bundled_model_runner(), 4);
    let rx = service.subscribe("1");
    service.create_model("1", &json!({"batch": 3})).unwrap();

    for timestamp in 1..=3 {
        service.send_data("1", &json!([timestamp, 10.0])).unwrap();
    }
    // Malformed record: the runner reports it on stderr and exits non-zero
    service.send_data("1", &json!("bogus")).unwrap();

    let events = events_until_close(&rx);

    let timestamps: Vec<i64> = events
        .iter()
        .filter_map(|event| match event {
            UnitEvent::Data(payload) => {
                let record: Value = serde_json::from_str(payload.trim()).unwrap();
                record.as_array().unwrap()[0].as_i64()
            }
            _ => None,
        })
        .collect();
    assert_eq!(timestamps, vec![1, 2, 3]);

    assert!(
        events
            .iter()
            .any(|event| matches!(event, UnitEvent::Error(message) if message.contains("invalid input record"))),
        "expected a stderr diagnostic for the malformed record"
    );
    assert_eq!(events.last(), Some(&UnitEvent::Close(Some(1))));
}

// Worker self-close must clean the pool up even when nobody calls remove.
#[test]
fn test_pool_cleanup_after_worker_exit() {
    let service = ModelService::new(bundled_model_runner(), 4);
    let rx = service.subscribe("crashy");
    service.create_model("crashy", &json!({})).unwrap();

    service.send_data("crashy", &json!({"not": "a record"})).unwrap();
    let events = events_until_close(&rx);
    assert!(matches!(events.last(), Some(UnitEvent::Close(Some(_)))));

    assert!(service.get_models().is_empty());
    assert_eq!(service.available_slots(), 4);

    // Removing after self-close is the detach race: the service reports
    // not-found rather than crashing
    let err = service.remove_model("crashy").unwrap_err();
    assert!(matches!(err, ServiceError::ModelNotFound(_)));
}
