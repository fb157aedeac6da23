//! Integration tests for telemetry initialization and span helpers.

use listclean_rs::model::Item;
use opentelemetry::KeyValue;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // This may return Err if another test already set one; that is acceptable.
    let config = listclean_rs::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "listclean-test".to_string(),
        log_level: "debug".to_string(),
        queue_namespace: "email_cleaner".to_string(),
    };
    let _guard = listclean_rs::telemetry::init_telemetry(config);
}

#[test]
fn item_span_creates_and_records_transition() {
    let item = Item::from("someone@example.com");
    let span = listclean_rs::telemetry::item::start_item_span(3, &item);
    listclean_rs::telemetry::item::record_state_transition(&span, "popping", "verifying");
    span.record("item.verdict", "accepted");
}

#[test]
fn metric_instruments_accept_recordings_without_a_provider() {
    use listclean_rs::telemetry::metrics;

    metrics::queue_operations().add(
        1,
        &[KeyValue::new("set", "todo"), KeyValue::new("operation", "pop")],
    );
    metrics::items_classified().add(1, &[KeyValue::new("verdict", "rejected")]);
    metrics::verify_errors().add(1, &[KeyValue::new("kind", "timeout")]);
    metrics::items_abandoned().add(1, &[KeyValue::new("result", "requeued")]);
    metrics::proxy_selections().add(1, &[KeyValue::new("policy", "random")]);
    metrics::verify_duration_ms().record(12.5, &[KeyValue::new("verdict", "accepted")]);
    metrics::queue_depth().record(42, &[KeyValue::new("set", "todo")]);
}
