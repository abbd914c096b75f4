use std::{sync::Arc, time::Duration};

use prometheus_registry::{LabelSet, Registry, RegistryError};
use tracing_subscriber::filter::LevelFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn emits_every_kind_in_registration_order() {
    let registry = Registry::new();

    let requests = registry.make_counter("http_requests_total", &[("code", "200")], "Requests.");
    requests.increment(7);
    registry.make_counter("http_requests_total", &[("code", "500")], "").increment(1);

    registry.make_gauge("temperature", &[], "").set(-1.5);

    let sizes =
        registry.make_value_histogram("payload_size", &[], "Payload sizes.", &[3.0, 1.0, 2.0]);
    sizes.record(2.5);
    sizes.record(1.5);

    let expected = concat!(
        "# HELP http_requests_total Requests.\n",
        "# TYPE http_requests_total counter\n",
        "http_requests_total{code=\"200\"} 7\n",
        "http_requests_total{code=\"500\"} 1\n",
        "# TYPE temperature gauge\n",
        "temperature -1.5\n",
        "# HELP payload_size Payload sizes.\n",
        "# TYPE payload_size histogram\n",
        "payload_size_bucket{le=\"1\"} 0\n",
        "payload_size_bucket{le=\"2\"} 1\n",
        "payload_size_bucket{le=\"3\"} 2\n",
        "payload_size_bucket{le=\"+Inf\"} 2\n",
        "payload_size_sum 4\n",
        "payload_size_count 2\n",
    );
    assert_eq!(registry.emit_to_string(), expected);
    assert_eq!(registry.emit_to_buffer(), expected.as_bytes());

    let mut buffer = b"prefix\n".to_vec();
    registry.emit(&mut buffer);
    assert!(buffer.starts_with(b"prefix\n# HELP"));
}

#[test]
fn duration_histogram_is_rendered_in_seconds() {
    let registry = Registry::new();
    let latency = registry.make_duration_histogram(
        "rpc_latency_seconds",
        &[("method", "get")],
        "",
        &[Duration::from_millis(250), Duration::from_secs(1)],
    );
    latency.record(Duration::from_millis(125));
    latency.record(Duration::from_millis(1500));

    let expected = concat!(
        "# TYPE rpc_latency_seconds histogram\n",
        "rpc_latency_seconds_bucket{method=\"get\",le=\"0.25\"} 1\n",
        "rpc_latency_seconds_bucket{method=\"get\",le=\"1\"} 1\n",
        "rpc_latency_seconds_bucket{method=\"get\",le=\"+Inf\"} 2\n",
        "rpc_latency_seconds_sum{method=\"get\"} 1.625\n",
        "rpc_latency_seconds_count{method=\"get\"} 2\n",
    );
    assert_eq!(registry.emit_to_string(), expected);
}

#[test]
fn label_sets_are_order_sensitive() {
    let registry = Registry::new();
    let ab = registry.make_counter("pairs", &[("a", "1"), ("b", "2")], "");
    let ba = registry.make_counter("pairs", &[("b", "2"), ("a", "1")], "");
    assert!(!Arc::ptr_eq(&ab, &ba));
    assert_ne!(ab.labels(), ba.labels());
    assert_eq!(ab.labels(), &LabelSet::from_pairs(&[("a", "1"), ("b", "2")]));

    assert_eq!(
        registry.emit_to_string(),
        "# TYPE pairs counter\npairs{a=\"1\",b=\"2\"} 0\npairs{b=\"2\",a=\"1\"} 0\n"
    );
}

#[test]
fn unregistering_one_instance_keeps_the_family() {
    let registry = Registry::new();
    let get = registry.make_counter("requests", &[("method", "GET")], "Requests.");
    let post = registry.make_counter("requests", &[("method", "POST")], "");
    get.increment(1);
    post.increment(2);

    assert!(registry.unregister_counter(&get));
    assert_eq!(
        registry.emit_to_string(),
        "# HELP requests Requests.\n# TYPE requests counter\nrequests{method=\"POST\"} 2\n"
    );

    assert!(registry.unregister_counter(&post));
    assert!(registry.is_empty());
    assert_eq!(registry.emit_to_string(), "");
}

#[test]
fn unregistering_every_kind() {
    let registry = Registry::new();
    let gauge = registry.make_gauge("g", &[], "");
    let durations = registry.make_duration_histogram("d", &[], "", &[]);
    let values = registry.make_value_histogram("v", &[], "", &[]);
    assert_eq!(registry.len(), 3);

    assert!(registry.unregister_gauge(&gauge));
    assert!(!registry.unregister_gauge(&gauge));
    assert!(registry.unregister_duration_histogram(&durations));
    assert!(registry.unregister_value_histogram(&values));
    assert!(registry.is_empty());
}

#[test]
fn handles_stay_usable_after_unregistering() {
    let registry = Registry::new();
    let counter = registry.make_counter("orphan_total", &[], "");
    assert!(registry.unregister_counter(&counter));

    counter.increment(3);
    assert_eq!(counter.value(), 3.0);
    assert_eq!(registry.emit_to_string(), "");

    // A new registration starts from zero and is a different instance.
    let fresh = registry.make_counter("orphan_total", &[], "");
    assert_ne!(fresh.id(), counter.id());
    assert_eq!(fresh.value(), 0.0);
}

#[test]
fn first_non_empty_help_is_kept() {
    init_logging();

    let registry = Registry::new();
    registry.make_counter("jobs_total", &[("queue", "a")], "");
    registry.make_counter("jobs_total", &[("queue", "b")], "Jobs processed.");
    registry.make_counter("jobs_total", &[("queue", "a")], "Something else.");

    let output = registry.emit_to_string();
    assert!(output.starts_with("# HELP jobs_total Jobs processed.\n# TYPE jobs_total counter\n"));
    assert!(!output.contains("Something else."));

    // Unregistering the whole family forgets its help text.
    let a = registry.make_counter("jobs_total", &[("queue", "a")], "");
    let b = registry.make_counter("jobs_total", &[("queue", "b")], "");
    assert!(registry.unregister_counter(&a));
    assert!(registry.unregister_counter(&b));
    registry.make_counter("jobs_total", &[], "");
    assert_eq!(registry.emit_to_string(), "# TYPE jobs_total counter\njobs_total 0\n");
}

#[test]
fn help_is_sanitized_and_escaped() {
    let registry = Registry::new();
    registry.make_gauge("paths", &[], "Windows\\paths\nand\u{202E}more");
    assert_eq!(
        registry.emit_to_string(),
        "# HELP paths Windows\\\\pathsandmore\n# TYPE paths gauge\npaths 0\n"
    );
}

#[test]
fn names_label_keys_and_values_are_sanitized() {
    let registry = Registry::new();
    let counter = registry.make_counter("coffee☕️", &[("cup.size", "\"tall\"\n")], "");
    assert_eq!(counter.name(), "coffee_");

    assert_eq!(
        registry.emit_to_string(),
        "# TYPE coffee_ counter\ncoffee_{cup_size=\"\\\"tall\\\"\\n\"} 0\n"
    );
}

#[test]
fn contract_violations_are_errors() {
    let registry = Registry::new();
    let buckets = [Duration::from_millis(5)];
    registry.make_duration_histogram("latency", &[("op", "read")], "", &buckets);

    assert!(matches!(
        registry.try_make_counter("latency", &[("op", "read")], ""),
        Err(RegistryError::KindMismatch { .. })
    ));
    assert!(matches!(
        registry.try_make_duration_histogram("latency", &[("op", "write")], "", &[]),
        Err(RegistryError::BucketMismatch { .. })
    ));
    assert!(matches!(
        registry.try_make_duration_histogram("latency", &[("kind", "write")], "", &buckets),
        Err(RegistryError::LabelNamesMismatch { .. })
    ));

    // Nothing was added by the failed attempts.
    assert_eq!(registry.len(), 1);
}

#[test]
#[should_panic(expected = "cannot mix labeled and unlabeled instances")]
fn make_panics_on_labeled_unlabeled_mix() {
    let registry = Registry::new();
    registry.make_gauge("mixed", &[("a", "1")], "");
    registry.make_gauge("mixed", &[], "");
}

#[test]
#[should_panic(expected = "is registered with buckets")]
fn make_panics_on_bucket_mismatch() {
    let registry = Registry::new();
    registry.make_value_histogram("sizes", &[], "", &[1.0]);
    registry.make_value_histogram("sizes", &[], "", &[2.0]);
}
