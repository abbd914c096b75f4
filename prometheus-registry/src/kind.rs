use std::fmt;

/// Metric kind.
///
/// Defines the kind, or type, of a metric family.  A metric name is bound to exactly one kind for as
/// long as any instance exists under it.
///
/// Both histogram variants are exposed to Prometheus as `histogram`, but they are distinct kinds:
/// a duration histogram and a value histogram cannot share a name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MetricKind {
    /// Counter type.
    Counter,
    /// Gauge type.
    Gauge,
    /// Histogram observing durations.
    DurationHistogram,
    /// Histogram observing plain floating-point values.
    ValueHistogram,
}

impl MetricKind {
    /// The metric type as written on a `# TYPE` line.
    pub fn as_type_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::DurationHistogram | MetricKind::ValueHistogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::DurationHistogram => "duration histogram",
            MetricKind::ValueHistogram => "value histogram",
        };
        f.write_str(name)
    }
}
