//! A concurrent, in-process metric registry that renders the Prometheus text exposition format.
//!
//! ## Basics
//!
//! A [`Registry`] hands out shared handles to counters, gauges, and histograms.  Handles are
//! updated directly from any thread, and the registry renders every live metric on demand:
//!
//! ```
//! use std::time::Duration;
//! use prometheus_registry::Registry;
//!
//! let registry = Registry::new();
//!
//! let requests = registry.make_counter("http_requests_total", &[("method", "GET")], "Requests.");
//! requests.increment(1);
//!
//! let in_flight = registry.make_gauge("http_in_flight", &[], "");
//! in_flight.increment(1.0);
//!
//! let latency = registry.make_duration_histogram(
//!     "http_request_duration_seconds",
//!     &[],
//!     "",
//!     &[Duration::from_millis(10), Duration::from_millis(100)],
//! );
//! latency.record(Duration::from_millis(42));
//!
//! let output = registry.emit_to_string();
//! assert!(output.contains("http_requests_total{method=\"GET\"} 1\n"));
//! assert!(output.contains("http_request_duration_seconds_bucket{le=\"0.1\"} 1\n"));
//! ```
//!
//! Asking for the same name and labels again returns the same instance.  Inconsistent requests,
//! such as reusing a name with another metric kind, are programmer errors: `make_*` panics, and
//! `try_make_*` returns a [`RegistryError`].
//!
//! ## Names and labels
//!
//! Metric names and label keys are sanitized rather than rejected: every character outside
//! `[a-zA-Z0-9_:]` (or `[a-zA-Z0-9_]` for label keys) is replaced with an underscore, as is a
//! leading digit.  Label values and help text are escaped when rendered.
//!
//! Label sets are compared in the order they were supplied, so `a=1,b=2` and `b=2,a=1` are two
//! different instances of the same family.
//!
//! ## The `metrics` facade
//!
//! With the `recorder` feature (enabled by default), [`RecorderBuilder`] builds a
//! [`PrometheusRecorder`] that routes the `metrics` macros into a registry:
//!
//! ```
//! # use prometheus_registry::RecorderBuilder;
//! let recorder = RecorderBuilder::new().add_global_label("service", "api").build();
//! let handle = recorder.handle();
//!
//! metrics::with_local_recorder(&recorder, || {
//!     metrics::counter!("jobs_total").increment(1);
//! });
//!
//! assert_eq!(handle.render(), "# TYPE jobs_total counter\njobs_total{service=\"api\"} 1\n");
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomics;
pub use self::atomics::AtomicF64;

mod counter;
pub use self::counter::Counter;

mod error;
pub use self::error::RegistryError;

mod family;
pub use self::family::MetricId;

mod formatting;
pub use self::formatting::{
    sanitize_description, sanitize_label_key, sanitize_label_value, sanitize_metric_name,
};

mod gauge;
pub use self::gauge::Gauge;

mod histogram;
pub use self::histogram::{
    DurationHistogram, Histogram, HistogramSnapshot, HistogramValue, ValueHistogram,
};

mod kind;
pub use self::kind::MetricKind;

mod label;
pub use self::label::LabelSet;

mod registry;
pub use self::registry::Registry;

#[cfg(feature = "recorder")]
#[cfg_attr(docsrs, doc(cfg(feature = "recorder")))]
mod recorder;

#[cfg(feature = "recorder")]
#[cfg_attr(docsrs, doc(cfg(feature = "recorder")))]
pub use self::recorder::{
    BuildError, Matcher, PrometheusHandle, PrometheusRecorder, RecorderBuilder,
};
