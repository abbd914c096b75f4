//! Bucketed histograms.

use std::{fmt, time::Duration};

use parking_lot::Mutex;

use crate::{
    family::{Descriptor, Family, Metric, MetricFamily, MetricId},
    formatting::{write_infinite_bucket_line, write_metric_line, SampleValue},
    kind::MetricKind,
    label::LabelSet,
};

/// A histogram observing durations, exposed in seconds.
pub type DurationHistogram = Histogram<Duration>;

/// A histogram observing plain floating-point values.
pub type ValueHistogram = Histogram<f64>;

/// A value that can be observed by a [`Histogram`].
pub trait HistogramValue: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// The additive identity, used for an empty sum.
    const ZERO: Self;

    /// Adds two observations together for the running sum.
    fn accumulate(self, other: Self) -> Self;

    /// The value as written in the exposition format.
    fn to_f64(self) -> f64;
}

impl HistogramValue for f64 {
    const ZERO: Self = 0.0;

    fn accumulate(self, other: Self) -> Self {
        self + other
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl HistogramValue for Duration {
    const ZERO: Self = Duration::ZERO;

    fn accumulate(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn to_f64(self) -> f64 {
        duration_as_seconds(self)
    }
}

fn duration_as_seconds(duration: Duration) -> f64 {
    duration.as_secs() as f64 + f64::from(duration.subsec_nanos()) / 1e9
}

/// A consistent copy of a histogram's state.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSnapshot<T> {
    /// Upper bounds and cumulative counts, in ascending order of bound.
    pub buckets: Vec<(T, u64)>,
    /// Sum of every observation.
    pub sum: T,
    /// Number of observations.
    pub count: u64,
}

#[derive(Debug)]
struct State<T> {
    buckets: Vec<(T, u64)>,
    sum: T,
    count: u64,
}

/// A cumulative, bucketed histogram.
///
/// Each bucket counts the observations less than or equal to its upper bound, so a single
/// observation lands in every bucket whose bound it does not exceed.  Bucket counts, the sum, and
/// the count are updated together under one lock so readers never see a partial observation.
#[derive(Debug)]
pub struct Histogram<T> {
    descriptor: Descriptor,
    state: Mutex<State<T>>,
}

impl<T: HistogramValue> Histogram<T> {
    fn with_bounds(descriptor: Descriptor, bounds: &[T]) -> Self {
        let state = State {
            buckets: bounds.iter().map(|bound| (*bound, 0)).collect(),
            sum: T::ZERO,
            count: 0,
        };
        Self { descriptor, state: Mutex::new(state) }
    }

    /// Identity of this histogram within its registry.
    pub fn id(&self) -> MetricId {
        self.descriptor.id
    }

    /// Sanitized metric name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Labels identifying this histogram within its family.
    pub fn labels(&self) -> &LabelSet {
        &self.descriptor.labels
    }

    /// Records a single observation.
    pub fn record(&self, value: T) {
        let mut state = self.state.lock();
        for (bound, count) in state.buckets.iter_mut() {
            if value <= *bound {
                *count += 1;
            }
        }
        state.sum = state.sum.accumulate(value);
        state.count += 1;
    }

    /// Copies the current state of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot<T> {
        let state = self.state.lock();
        HistogramSnapshot { buckets: state.buckets.clone(), sum: state.sum, count: state.count }
    }

    fn render_snapshot(&self, buffer: &mut Vec<u8>) {
        // Copy under the lock, write without it.
        let HistogramSnapshot { buckets, sum, count } = self.snapshot();
        let name = &self.descriptor.name;
        let labels = &self.descriptor.label_text;

        for (bound, bucket_count) in buckets {
            let le = bound.to_f64();
            let le_label = Some(("le", &le as &dyn SampleValue));
            write_metric_line(buffer, name, Some("bucket"), labels, le_label, bucket_count);
        }
        write_infinite_bucket_line(buffer, name, labels, count);
        write_metric_line(buffer, name, Some("sum"), labels, None, sum.to_f64());
        write_metric_line(buffer, name, Some("count"), labels, None, count);
    }
}

impl ValueHistogram {
    /// Records a duration as a number of seconds.
    pub fn record_duration(&self, duration: Duration) {
        self.record(duration_as_seconds(duration));
    }
}

impl Metric for DurationHistogram {
    type Buckets = Vec<Duration>;

    const KIND: MetricKind = MetricKind::DurationHistogram;

    fn create(descriptor: Descriptor, buckets: &Vec<Duration>) -> Self {
        Self::with_bounds(descriptor, buckets)
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn render(&self, buffer: &mut Vec<u8>) {
        self.render_snapshot(buffer)
    }

    fn wrap(family: Family<Self>) -> MetricFamily {
        MetricFamily::DurationHistogram(family)
    }

    fn unwrap_mut(family: &mut MetricFamily) -> Option<&mut Family<Self>> {
        match family {
            MetricFamily::DurationHistogram(family) => Some(family),
            _ => None,
        }
    }
}

impl Metric for ValueHistogram {
    type Buckets = Vec<f64>;

    const KIND: MetricKind = MetricKind::ValueHistogram;

    fn create(descriptor: Descriptor, buckets: &Vec<f64>) -> Self {
        Self::with_bounds(descriptor, buckets)
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn render(&self, buffer: &mut Vec<u8>) {
        self.render_snapshot(buffer)
    }

    fn wrap(family: Family<Self>) -> MetricFamily {
        MetricFamily::ValueHistogram(family)
    }

    fn unwrap_mut(family: &mut MetricFamily) -> Option<&mut Family<Self>> {
        match family {
            MetricFamily::ValueHistogram(family) => Some(family),
            _ => None,
        }
    }
}

#[cfg(feature = "recorder")]
impl metrics::HistogramFn for ValueHistogram {
    fn record(&self, value: f64) {
        Histogram::record(self, value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DurationHistogram, HistogramSnapshot, ValueHistogram};
    use crate::{
        family::{Descriptor, Metric, MetricId},
        label::LabelSet,
    };

    fn descriptor(name: &str, labels: &[(&str, &str)]) -> Descriptor {
        Descriptor::new(MetricId(0), name, LabelSet::from_pairs(labels))
    }

    fn render<M: Metric>(metric: &M) -> String {
        let mut buffer = Vec::new();
        metric.render(&mut buffer);
        String::from_utf8(buffer).expect("histogram output should be utf-8")
    }

    #[test]
    fn cumulative_buckets() {
        let histogram = ValueHistogram::create(descriptor("size", &[]), &vec![1.0, 2.0, 3.0]);
        histogram.record(2.5);
        histogram.record(1.5);

        let snapshot = histogram.snapshot();
        assert_eq!(
            snapshot,
            HistogramSnapshot { buckets: vec![(1.0, 0), (2.0, 1), (3.0, 2)], sum: 4.0, count: 2 }
        );

        let expected = concat!(
            "size_bucket{le=\"1\"} 0\n",
            "size_bucket{le=\"2\"} 1\n",
            "size_bucket{le=\"3\"} 2\n",
            "size_bucket{le=\"+Inf\"} 2\n",
            "size_sum 4\n",
            "size_count 2\n",
        );
        assert_eq!(render(&histogram), expected);
    }

    #[test]
    fn boundary_values_fall_into_their_bucket() {
        let histogram = ValueHistogram::create(descriptor("size", &[]), &vec![1.0, 2.0]);
        histogram.record(1.0);
        histogram.record(5.0);

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.buckets, vec![(1.0, 1), (2.0, 1)]);
        assert_eq!(snapshot.count, 2);
    }

    #[test]
    fn labeled_rendering() {
        let histogram =
            ValueHistogram::create(descriptor("latency", &[("route", "/")]), &vec![0.25]);
        histogram.record(0.1);

        let expected = concat!(
            "latency_bucket{route=\"/\",le=\"0.25\"} 1\n",
            "latency_bucket{route=\"/\",le=\"+Inf\"} 1\n",
            "latency_sum{route=\"/\"} 0.1\n",
            "latency_count{route=\"/\"} 1\n",
        );
        assert_eq!(render(&histogram), expected);
    }

    #[test]
    fn duration_histogram_renders_seconds() {
        let buckets = vec![Duration::from_millis(100), Duration::from_millis(500)];
        let histogram = DurationHistogram::create(descriptor("request_duration", &[]), &buckets);
        histogram.record(Duration::from_millis(250));
        histogram.record(Duration::from_millis(50));

        assert_eq!(histogram.snapshot().sum, Duration::from_millis(300));

        let expected = concat!(
            "request_duration_bucket{le=\"0.1\"} 1\n",
            "request_duration_bucket{le=\"0.5\"} 2\n",
            "request_duration_bucket{le=\"+Inf\"} 2\n",
            "request_duration_sum 0.3\n",
            "request_duration_count 2\n",
        );
        assert_eq!(render(&histogram), expected);
    }

    #[test]
    fn value_histogram_accepts_durations() {
        let histogram = ValueHistogram::create(descriptor("wait", &[]), &vec![1.0]);
        histogram.record_duration(Duration::new(1, 500_000_000));
        histogram.record_duration(Duration::from_nanos(1));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.sum, 1.5 + 1e-9);
        assert_eq!(snapshot.buckets, vec![(1.0, 1)]);
    }

    #[test]
    fn empty_bounds_only_render_infinite_bucket() {
        let histogram = ValueHistogram::create(descriptor("empty", &[]), &Vec::new());
        histogram.record(3.0);

        let expected = concat!(
            "empty_bucket{le=\"+Inf\"} 1\n",
            "empty_sum 3\n",
            "empty_count 1\n",
        );
        assert_eq!(render(&histogram), expected);
    }
}
