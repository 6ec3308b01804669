//! Param-finder service tests against the bundled param-finder runner.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};

use anomaly_sidecar::config::RunnerSpec;
use anomaly_sidecar::service::{ParamFinderService, ServiceError, UnitEvent};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn bundled_param_finder_runner() -> RunnerSpec {
    RunnerSpec {
        program: PathBuf::from(env!("CARGO_BIN_EXE_anomaly_sidecar")),
        args: vec!["--param-finder-runner".to_string()],
    }
}

fn input_opt() -> Value {
    json!({"csv": "/data/rec-center.csv", "rowOffset": 4})
}

#[test]
fn test_run_produces_params() {
    let service = ParamFinderService::new(bundled_param_finder_runner());
    let rx = service.subscribe("1");
    service.create_param_finder("1", &input_opt()).unwrap();
    assert_eq!(service.get_param_finders(), vec!["1".to_string()]);

    let event = rx.recv_timeout(RECV_TIMEOUT).expect("no result event");
    let payload = match event {
        UnitEvent::Data(payload) => payload,
        other => panic!("expected data event, got {other:?}"),
    };
    let result: Value = serde_json::from_str(payload.trim()).unwrap();
    assert!(result["aggInfo"]["windowSize"].is_number());
    assert_eq!(result["aggInfo"]["func"], json!("mean"));
    assert_eq!(result["modelInfo"]["valueFieldName"], json!("c1"));

    service.remove_param_finder("1").unwrap();
    assert!(service.get_param_finders().is_empty());
    assert_eq!(service.available_slots("1"), 1);
}

#[test]
fn test_single_run_per_metric() {
    let service = ParamFinderService::new(bundled_param_finder_runner());
    service.create_param_finder("1", &input_opt()).unwrap();
    assert_eq!(service.available_slots("1"), 0);

    let err = service.create_param_finder("1", &input_opt()).unwrap_err();
    assert!(matches!(err, ServiceError::ParamFinderRunning(_)));
    assert!(err.to_string().contains("More than 1 param finder"));

    // The limit is per metric: another metric can run concurrently
    service.create_param_finder("2", &input_opt()).unwrap();
    assert_eq!(service.get_param_finders(), vec!["1".to_string(), "2".to_string()]);

    service.remove_param_finder("1").unwrap();
    service.remove_param_finder("2").unwrap();
}

// Bad input spec: the runner reports on stderr and exits non-zero, and the
// run's close event is still delivered before the pool entry disappears.
#[test]
fn test_bad_input_reports_error_then_close() {
    let service = ParamFinderService::new(bundled_param_finder_runner());
    let rx = service.subscribe("badDataMetric");
    service
        .create_param_finder("badDataMetric", &json!({"blah": "blah"}))
        .unwrap();

    let mut saw_error = false;
    loop {
        match rx.recv_timeout(RECV_TIMEOUT).expect("no event before timeout") {
            UnitEvent::Error(_) => saw_error = true,
            UnitEvent::Close(code) => {
                assert_eq!(code, Some(1));
                break;
            }
            UnitEvent::Data(payload) => panic!("unexpected data event: {payload}"),
        }
    }
    assert!(saw_error, "expected a stderr diagnostic for the bad input spec");
    assert!(service.get_param_finders().is_empty());
}
