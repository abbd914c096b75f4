use std::sync::atomic::Ordering;

use crate::{
    atomics::{AtomicF64, AtomicU64},
    family::{Descriptor, Family, Metric, MetricFamily, MetricId},
    formatting::write_metric_line,
    kind::MetricKind,
    label::LabelSet,
};

/// A monotonically increasing counter.
///
/// Integer and floating-point increments are kept in separate cells so that the common integer
/// path is a single fetch-and-add.  The two cells are only combined when the value is read.
///
/// Obtained from [`Registry::make_counter`](crate::Registry::make_counter); every call site that
/// asks for the same name and labels shares the same counter.
#[derive(Debug)]
pub struct Counter {
    descriptor: Descriptor,
    integer: AtomicU64,
    float: AtomicF64,
}

impl Counter {
    /// Identity of this counter within its registry.
    pub fn id(&self) -> MetricId {
        self.descriptor.id
    }

    /// Sanitized metric name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Labels identifying this counter within its family.
    pub fn labels(&self) -> &LabelSet {
        &self.descriptor.labels
    }

    /// Increments the counter by an integer amount.
    ///
    /// The integer cell wraps on overflow.
    pub fn increment(&self, delta: u64) {
        let _ = self.integer.fetch_add(delta, Ordering::Release);
    }

    /// Increments the counter by a floating-point amount.
    ///
    /// # Panics
    ///
    /// Panics if `delta` is negative or NaN, as counters can only go up.
    pub fn increment_by(&self, delta: f64) {
        assert!(
            delta >= 0.0,
            "counter `{}` cannot be incremented by {}: counters are monotonic",
            self.descriptor.name,
            delta
        );
        let _ = self.float.fetch_add(delta);
    }

    /// Raises the integer part of the counter to at least `value`.
    ///
    /// Useful for facades that report totals computed elsewhere rather than deltas.
    pub fn absolute(&self, value: u64) {
        let _ = self.integer.fetch_max(value, Ordering::AcqRel);
    }

    /// Zeroes both cells.
    pub fn reset(&self) {
        self.integer.store(0, Ordering::Release);
        self.float.store(0.0);
    }

    /// Current value: the integer cell plus the floating-point cell.
    pub fn value(&self) -> f64 {
        self.integer.load(Ordering::Acquire) as f64 + self.float.load()
    }
}

impl Metric for Counter {
    type Buckets = ();

    const KIND: MetricKind = MetricKind::Counter;

    fn create(descriptor: Descriptor, _: &()) -> Self {
        Self { descriptor, integer: AtomicU64::new(0), float: AtomicF64::default() }
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn render(&self, buffer: &mut Vec<u8>) {
        let integer = self.integer.load(Ordering::Acquire);
        let float = self.float.load();
        let name = &self.descriptor.name;
        let labels = &self.descriptor.label_text;

        // Counters that only ever saw integer increments are written without a fractional part.
        if float == 0.0 {
            write_metric_line(buffer, name, None, labels, None, integer);
        } else {
            write_metric_line(buffer, name, None, labels, None, integer as f64 + float);
        }
    }

    fn wrap(family: Family<Self>) -> MetricFamily {
        MetricFamily::Counter(family)
    }

    fn unwrap_mut(family: &mut MetricFamily) -> Option<&mut Family<Self>> {
        match family {
            MetricFamily::Counter(family) => Some(family),
            _ => None,
        }
    }
}

#[cfg(feature = "recorder")]
impl metrics::CounterFn for Counter {
    fn increment(&self, value: u64) {
        Counter::increment(self, value)
    }

    fn absolute(&self, value: u64) {
        Counter::absolute(self, value)
    }
}
