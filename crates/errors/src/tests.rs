use super::*;

#[test]
fn task_not_found_carries_id() {
    let err = ConvoyError::task_not_found("t1");
    assert!(err.to_string().contains("t1"));
}

#[test]
fn client_errors_are_classified() {
    assert!(ConvoyError::validation("bad").is_client_error());
    assert!(ConvoyError::unsupported_kind("Foo").is_client_error());
    assert!(!ConvoyError::cluster("boom").is_client_error());
    assert!(!ConvoyError::invalid_state("running").is_client_error());
}

#[test]
fn only_conflicts_are_retryable() {
    assert!(ConvoyError::ClusterConflict("409".into()).is_retryable());
    assert!(!ConvoyError::cluster("500").is_retryable());
    assert!(!ConvoyError::conversion("kompose").is_retryable());
}

#[test]
fn serde_json_errors_become_serialization() {
    let err: ConvoyError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(matches!(err, ConvoyError::Serialization(_)));
}

#[test]
fn arity_mismatch_reports_both_sides() {
    let err = ConvoyError::ArityMismatch {
        expected: 2,
        actual: 3,
    };
    let msg = err.to_string();
    assert!(msg.contains('2') && msg.contains('3'));
}
