use crate::{
    atomics::AtomicF64,
    family::{Descriptor, Family, Metric, MetricFamily, MetricId},
    formatting::write_metric_line,
    kind::MetricKind,
    label::LabelSet,
};

/// A value that can go up and down arbitrarily.
///
/// Backed by a single floating-point cell: `set` stores directly, while `increment` and `decrement`
/// go through a compare-and-swap loop so that concurrent deltas of any sign compose exactly.
#[derive(Debug)]
pub struct Gauge {
    descriptor: Descriptor,
    value: AtomicF64,
}

impl Gauge {
    /// Identity of this gauge within its registry.
    pub fn id(&self) -> MetricId {
        self.descriptor.id
    }

    /// Sanitized metric name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Labels identifying this gauge within its family.
    pub fn labels(&self) -> &LabelSet {
        &self.descriptor.labels
    }

    /// Overwrites the current value.
    pub fn set(&self, value: f64) {
        self.value.store(value);
    }

    /// Adds `delta`, which may be negative.
    pub fn increment(&self, delta: f64) {
        let _ = self.value.fetch_add(delta);
    }

    /// Subtracts `delta`, which may be negative.
    pub fn decrement(&self, delta: f64) {
        let _ = self.value.fetch_add(-delta);
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value.load()
    }
}

impl Metric for Gauge {
    type Buckets = ();

    const KIND: MetricKind = MetricKind::Gauge;

    fn create(descriptor: Descriptor, _: &()) -> Self {
        Self { descriptor, value: AtomicF64::default() }
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn render(&self, buffer: &mut Vec<u8>) {
        let value = self.value.load();
        let Descriptor { name, label_text, .. } = &self.descriptor;
        write_metric_line(buffer, name, None, label_text, None, value);
    }

    fn wrap(family: Family<Self>) -> MetricFamily {
        MetricFamily::Gauge(family)
    }

    fn unwrap_mut(family: &mut MetricFamily) -> Option<&mut Family<Self>> {
        match family {
            MetricFamily::Gauge(family) => Some(family),
            _ => None,
        }
    }
}

#[cfg(feature = "recorder")]
impl metrics::GaugeFn for Gauge {
    fn increment(&self, value: f64) {
        Gauge::increment(self, value)
    }

    fn decrement(&self, value: f64) {
        Gauge::decrement(self, value)
    }

    fn set(&self, value: f64) {
        Gauge::set(self, value)
    }
}
