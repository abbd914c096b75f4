//! Adapter exposing a [`Registry`] through the `metrics` facade.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use indexmap::IndexMap;
use metrics::{Key, KeyName, Metadata, Recorder, SetRecorderError, SharedString, Unit};
use parking_lot::RwLock;
use thiserror::Error as ThisError;

use crate::{formatting::sanitize_metric_name, registry::Registry};

/// Prometheus client default buckets, in seconds.
const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Matches a metric name in a specific way.
///
/// Used for specifying overrides for buckets, allowing a default set of histogram buckets to be
/// specified while adjusting the buckets that get used for specific metrics.  When several
/// matchers apply, a full match wins over a prefix match, which wins over a suffix match.  Among
/// prefixes, or among suffixes, the longest one wins.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Matcher {
    /// Matches the entire metric name.
    Full(String),
    /// Matches the beginning of the metric name.
    Prefix(String),
    /// Matches the end of the metric name.
    Suffix(String),
}

impl Matcher {
    /// Checks if the given name matches this matcher.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Full(full) => name == full,
            Matcher::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Matcher::Suffix(suffix) => name.ends_with(suffix.as_str()),
        }
    }

    /// Sort key for choosing between matchers that both match: lower is more specific.
    fn precedence(&self) -> (u8, Reverse<usize>) {
        match self {
            Matcher::Full(full) => (0, Reverse(full.len())),
            Matcher::Prefix(prefix) => (1, Reverse(prefix.len())),
            Matcher::Suffix(suffix) => (2, Reverse(suffix.len())),
        }
    }

    /// Creates a sanitized version of this matcher.
    fn sanitized(self) -> Matcher {
        match self {
            Matcher::Full(full) => Matcher::Full(sanitize_metric_name(&full)),
            Matcher::Prefix(prefix) => Matcher::Prefix(sanitize_metric_name(&prefix)),
            Matcher::Suffix(suffix) => Matcher::Suffix(sanitize_metric_name(&suffix)),
        }
    }
}

/// Errors that could occur while configuring or installing a [`PrometheusRecorder`].
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// A bucket bound was NaN.
    #[error("bucket bounds cannot be NaN")]
    NanBucketBound,

    /// Installing the recorder did not succeed.
    #[error("failed to install recorder as global recorder: {0}")]
    FailedToSetGlobalRecorder(#[from] SetRecorderError<PrometheusRecorder>),
}

/// Builder for creating and installing a [`PrometheusRecorder`].
#[derive(Debug)]
pub struct RecorderBuilder {
    buckets: Vec<f64>,
    bucket_overrides: BTreeMap<Matcher, Vec<f64>>,
    global_labels: IndexMap<String, String>,
    registry: Option<Arc<Registry>>,
}

impl RecorderBuilder {
    /// Creates a new [`RecorderBuilder`].
    pub fn new() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS.to_vec(),
            bucket_overrides: BTreeMap::new(),
            global_labels: IndexMap::new(),
            registry: None,
        }
    }

    /// Sets the buckets used for every histogram without a more specific override.
    ///
    /// Defaults to the Prometheus client default buckets.
    ///
    /// ## Errors
    ///
    /// If any of the bounds is NaN, an error variant will be returned.
    pub fn set_buckets(mut self, values: &[f64]) -> Result<Self, BuildError> {
        self.buckets = checked_buckets(values)?;
        Ok(self)
    }

    /// Sets the buckets for histograms whose name matches `matcher`.
    ///
    /// Matcher strings are sanitized the same way metric names are.
    ///
    /// ## Errors
    ///
    /// If any of the bounds is NaN, an error variant will be returned.
    pub fn set_buckets_for_metric(
        mut self,
        matcher: Matcher,
        values: &[f64],
    ) -> Result<Self, BuildError> {
        self.bucket_overrides.insert(matcher.sanitized(), checked_buckets(values)?);
        Ok(self)
    }

    /// Adds a label applied to every metric created through the facade.
    ///
    /// Labels supplied at the call site take precedence over global labels with the same key.
    pub fn add_global_label<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.global_labels.insert(key.into(), value.into());
        self
    }

    /// Uses an existing registry instead of creating a new one.
    ///
    /// Metrics created directly on the registry are rendered alongside facade metrics.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the recorder without installing it.
    pub fn build(self) -> PrometheusRecorder {
        PrometheusRecorder {
            registry: self.registry.unwrap_or_default(),
            descriptions: RwLock::new(HashMap::new()),
            buckets: self.buckets,
            bucket_overrides: self.bucket_overrides,
            global_labels: self.global_labels,
        }
    }

    /// Builds the recorder and installs it as the global recorder.
    ///
    /// ## Errors
    ///
    /// If a global recorder is already installed, an error variant will be returned.
    pub fn install(self) -> Result<PrometheusHandle, BuildError> {
        let recorder = self.build();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)?;
        Ok(handle)
    }
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_buckets(values: &[f64]) -> Result<Vec<f64>, BuildError> {
    if values.iter().any(|value| value.is_nan()) {
        return Err(BuildError::NanBucketBound);
    }
    Ok(values.to_vec())
}

/// A `metrics` recorder backed by a [`Registry`].
///
/// Counters, gauges, and histograms registered through the facade become registry metrics;
/// histograms are value histograms with the buckets chosen by the [`RecorderBuilder`].
#[derive(Debug)]
pub struct PrometheusRecorder {
    registry: Arc<Registry>,
    descriptions: RwLock<HashMap<String, String>>,
    buckets: Vec<f64>,
    bucket_overrides: BTreeMap<Matcher, Vec<f64>>,
    global_labels: IndexMap<String, String>,
}

impl PrometheusRecorder {
    /// Gets a [`PrometheusHandle`] to this recorder.
    pub fn handle(&self) -> PrometheusHandle {
        PrometheusHandle { registry: Arc::clone(&self.registry) }
    }

    fn add_description_if_missing(&self, key: &KeyName, description: SharedString) {
        let name = sanitize_metric_name(key.as_str());
        let description = description.into_owned();

        {
            let mut descriptions = self.descriptions.write();
            if descriptions.contains_key(&name) {
                return;
            }
            descriptions.insert(name.clone(), description.clone());
        }

        self.registry.describe(&name, &description);
    }

    fn help_for(&self, key: &Key) -> String {
        let name = sanitize_metric_name(key.name());
        self.descriptions.read().get(&name).cloned().unwrap_or_default()
    }

    fn labels_for(&self, key: &Key) -> Vec<(String, String)> {
        let mut labels = key
            .labels()
            .map(|label| (label.key().to_owned(), label.value().to_owned()))
            .collect::<Vec<_>>();

        for (key, value) in &self.global_labels {
            if !labels.iter().any(|(existing, _)| existing == key) {
                labels.push((key.clone(), value.clone()));
            }
        }

        labels
    }

    fn buckets_for(&self, name: &str) -> &[f64] {
        let name = sanitize_metric_name(name);

        self.bucket_overrides
            .iter()
            .filter(|(matcher, _)| matcher.matches(&name))
            .min_by_key(|(matcher, _)| matcher.precedence())
            .map(|(_, buckets)| buckets.as_slice())
            .unwrap_or(&self.buckets)
    }
}

/// Borrows owned label pairs in the shape the registry expects.
fn as_pairs(labels: &[(String, String)]) -> Vec<(&str, &str)> {
    labels.iter().map(|(key, value)| (key.as_str(), value.as_str())).collect()
}

impl Recorder for PrometheusRecorder {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.add_description_if_missing(&key, description);
    }

    fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.add_description_if_missing(&key, description);
    }

    fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.add_description_if_missing(&key, description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> metrics::Counter {
        let labels = self.labels_for(key);
        let help = self.help_for(key);
        let counter = self.registry.make_counter(key.name(), &as_pairs(&labels), &help);
        metrics::Counter::from_arc(counter)
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> metrics::Gauge {
        let labels = self.labels_for(key);
        let help = self.help_for(key);
        let gauge = self.registry.make_gauge(key.name(), &as_pairs(&labels), &help);
        metrics::Gauge::from_arc(gauge)
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> metrics::Histogram {
        let labels = self.labels_for(key);
        let histogram = self.registry.make_value_histogram(
            key.name(),
            &as_pairs(&labels),
            &self.help_for(key),
            self.buckets_for(key.name()),
        );
        metrics::Histogram::from_arc(histogram)
    }
}

/// Handle to [`PrometheusRecorder`].
///
/// Useful for exposing a scrape endpoint on an existing HTTP/HTTPS server.
#[derive(Clone, Debug)]
pub struct PrometheusHandle {
    registry: Arc<Registry>,
}

impl PrometheusHandle {
    /// Returns the metrics in Prometheus accepted String format.
    pub fn render(&self) -> String {
        self.registry.emit_to_string()
    }

    /// The registry backing the recorder.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
