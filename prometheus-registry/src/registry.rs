use std::{fmt, sync::Arc, time::Duration};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    counter::Counter,
    error::RegistryError,
    family::{Descriptor, Family, Metric, MetricFamily, MetricId, Removal, Render},
    formatting::{sanitize_description, sanitize_metric_name, write_help_line, write_type_line},
    gauge::Gauge,
    histogram::{DurationHistogram, ValueHistogram},
    kind::MetricKind,
    label::{duplicate_key, LabelSet},
};

/// A registry of metric families that renders the Prometheus text exposition format.
///
/// `make_*` methods return shared handles: asking twice for the same name and label set returns the
/// same instance.  Handles are updated without going back through the registry, and [`emit`]
/// renders every registered instance.
///
/// The registry lock only guards the name index.  It is never held while a metric value is read
/// or written, and [`emit`] releases it after copying the handles it needs.
///
/// ## Contract violations
///
/// Registering a name with a different metric kind, a different set of label names, mixing
/// labeled and unlabeled instances, or changing histogram buckets are programmer errors.  The
/// `make_*` methods panic on them; the `try_make_*` methods report them as [`RegistryError`].
///
/// Names and label keys are sanitized rather than rejected; a label whose key only collides with
/// an earlier one after sanitization is dropped.  Help text is stripped of control
/// and invisible formatting characters.  The first non-empty help text registered for a name is
/// kept; later, different help text is ignored.
///
/// [`emit`]: Registry::emit
pub struct Registry {
    families: Mutex<IndexMap<String, MetricFamily>>,
}

impl Registry {
    /// Creates an empty `Registry`.
    pub fn new() -> Self {
        Self { families: Mutex::new(IndexMap::new()) }
    }

    /// Gets or creates a counter.
    ///
    /// # Panics
    ///
    /// Panics if the registration is inconsistent with earlier registrations of `name`.  See
    /// [`try_make_counter`](Registry::try_make_counter).
    #[track_caller]
    pub fn make_counter(&self, name: &str, labels: &[(&str, &str)], help: &str) -> Arc<Counter> {
        expect_consistent(self.try_make_counter(name, labels, help))
    }

    /// Gets or creates a counter, reporting contract violations as errors.
    pub fn try_make_counter(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
    ) -> Result<Arc<Counter>, RegistryError> {
        self.get_or_create(name, labels, help, ())
    }

    /// Gets or creates a gauge.
    ///
    /// # Panics
    ///
    /// Panics if the registration is inconsistent with earlier registrations of `name`.  See
    /// [`try_make_gauge`](Registry::try_make_gauge).
    #[track_caller]
    pub fn make_gauge(&self, name: &str, labels: &[(&str, &str)], help: &str) -> Arc<Gauge> {
        expect_consistent(self.try_make_gauge(name, labels, help))
    }

    /// Gets or creates a gauge, reporting contract violations as errors.
    pub fn try_make_gauge(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
    ) -> Result<Arc<Gauge>, RegistryError> {
        self.get_or_create(name, labels, help, ())
    }

    /// Gets or creates a histogram of durations.
    ///
    /// `buckets` are the upper bounds of the explicit buckets, in any order; the `+Inf` bucket is
    /// always present.  Every instance under `name` shares the buckets of the first registration.
    ///
    /// # Panics
    ///
    /// Panics if the registration is inconsistent with earlier registrations of `name`.  See
    /// [`try_make_duration_histogram`](Registry::try_make_duration_histogram).
    #[track_caller]
    pub fn make_duration_histogram(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
        buckets: &[Duration],
    ) -> Arc<DurationHistogram> {
        expect_consistent(self.try_make_duration_histogram(name, labels, help, buckets))
    }

    /// Gets or creates a histogram of durations, reporting contract violations as errors.
    pub fn try_make_duration_histogram(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
        buckets: &[Duration],
    ) -> Result<Arc<DurationHistogram>, RegistryError> {
        let mut buckets = buckets.to_vec();
        buckets.sort_unstable();
        buckets.dedup();

        self.get_or_create(name, labels, help, buckets)
    }

    /// Gets or creates a histogram of plain values.
    ///
    /// `buckets` are the upper bounds of the explicit buckets, in any order; the `+Inf` bucket is
    /// always present.  Every instance under `name` shares the buckets of the first registration.
    ///
    /// # Panics
    ///
    /// Panics if the registration is inconsistent with earlier registrations of `name`, or if a
    /// bucket bound is NaN.  See [`try_make_value_histogram`](Registry::try_make_value_histogram).
    #[track_caller]
    pub fn make_value_histogram(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
        buckets: &[f64],
    ) -> Arc<ValueHistogram> {
        expect_consistent(self.try_make_value_histogram(name, labels, help, buckets))
    }

    /// Gets or creates a histogram of plain values, reporting contract violations as errors.
    pub fn try_make_value_histogram(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
        buckets: &[f64],
    ) -> Result<Arc<ValueHistogram>, RegistryError> {
        if buckets.iter().any(|bound| bound.is_nan()) {
            return Err(RegistryError::InvalidBucketBound { name: sanitize_metric_name(name) });
        }

        // The `+Inf` bucket is implicit.
        let mut buckets =
            buckets.iter().copied().filter(|bound| *bound != f64::INFINITY).collect::<Vec<_>>();
        buckets.sort_unstable_by(f64::total_cmp);
        buckets.dedup();

        self.get_or_create(name, labels, help, buckets)
    }

    /// Removes a counter from the registry.
    ///
    /// Only removes the instance if it is the one currently registered under its name and labels,
    /// so a stale handle never removes a newer registration.  Returns `true` if it was removed.
    pub fn unregister_counter(&self, counter: &Counter) -> bool {
        self.unregister(counter)
    }

    /// Removes a gauge from the registry.
    ///
    /// See [`unregister_counter`](Registry::unregister_counter).
    pub fn unregister_gauge(&self, gauge: &Gauge) -> bool {
        self.unregister(gauge)
    }

    /// Removes a duration histogram from the registry.
    ///
    /// See [`unregister_counter`](Registry::unregister_counter).
    pub fn unregister_duration_histogram(&self, histogram: &DurationHistogram) -> bool {
        self.unregister(histogram)
    }

    /// Removes a value histogram from the registry.
    ///
    /// See [`unregister_counter`](Registry::unregister_counter).
    pub fn unregister_value_histogram(&self, histogram: &ValueHistogram) -> bool {
        self.unregister(histogram)
    }

    /// Renders every registered metric into `buffer` in the Prometheus text exposition format.
    ///
    /// Families are written in the order they were first registered, and instances within a
    /// family in the order they were created.
    pub fn emit(&self, buffer: &mut Vec<u8>) {
        for family in self.snapshot() {
            if !family.help.is_empty() {
                write_help_line(buffer, &family.name, &family.help);
            }
            write_type_line(buffer, &family.name, family.kind.as_type_str());

            for instance in &family.instances {
                instance.render(buffer);
            }
        }
    }

    /// Renders every registered metric into a new buffer.
    pub fn emit_to_buffer(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.emit(&mut buffer);
        buffer
    }

    /// Renders every registered metric into a `String`.
    pub fn emit_to_string(&self) -> String {
        // Names are sanitized to ASCII and every other piece of text comes from a `str`, so the
        // buffer is always valid UTF-8.
        String::from_utf8(self.emit_to_buffer())
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }

    /// Number of metric names currently registered.
    pub fn len(&self) -> usize {
        self.families.lock().len()
    }

    /// Returns `true` if no metric is registered.
    pub fn is_empty(&self) -> bool {
        self.families.lock().is_empty()
    }

    /// Sets the help text of an existing family if it has none yet.
    #[cfg_attr(not(feature = "recorder"), allow(dead_code))]
    pub(crate) fn describe(&self, name: &str, help: &str) {
        let name = sanitize_metric_name(name);
        let help = sanitize_description(help);
        if let Some(family) = self.families.lock().get_mut(&name) {
            family.merge_help(&name, &help);
        }
    }

    fn get_or_create<M: Metric>(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        help: &str,
        buckets: M::Buckets,
    ) -> Result<Arc<M>, RegistryError> {
        let name = sanitize_metric_name(name);
        if let Some(label) = duplicate_key(labels) {
            return Err(RegistryError::DuplicateLabelName { name, label: label.to_owned() });
        }
        let labels = LabelSet::from_pairs(labels);
        let help = sanitize_description(help);

        let create = |labels: LabelSet| {
            let descriptor = Descriptor::new(MetricId::next(), &name, labels);
            Arc::new(M::create(descriptor, &buckets))
        };

        let mut families = self.families.lock();
        match families.get_mut(&name) {
            Some(family) => {
                let existing = family.kind();
                let family = M::unwrap_mut(family).ok_or_else(|| RegistryError::KindMismatch {
                    name: name.clone(),
                    existing,
                    requested: M::KIND,
                })?;
                family.get_or_insert_with(&name, &labels, &help, &buckets, || {
                    create(labels.clone())
                })
            }
            None => {
                let instance = create(labels);
                let family = Family::new(help, buckets.clone(), Arc::clone(&instance));
                debug!(metric = %name, kind = %M::KIND, "Registered metric family.");
                families.insert(name, M::wrap(family));
                Ok(instance)
            }
        }
    }

    fn unregister<M: Metric>(&self, metric: &M) -> bool {
        let descriptor = metric.descriptor();

        let mut families = self.families.lock();
        let Some(family) = families.get_mut(descriptor.name.as_str()) else {
            return false;
        };
        let Some(family) = M::unwrap_mut(family) else {
            return false;
        };

        match family.remove(&descriptor.labels, descriptor.id) {
            Removal::Missing => false,
            Removal::Removed => true,
            Removal::Emptied => {
                families.shift_remove(descriptor.name.as_str());
                debug!(metric = %descriptor.name, "Removed metric family.");
                true
            }
        }
    }

    fn snapshot(&self) -> Vec<FamilySnapshot> {
        let families = self.families.lock();
        families
            .iter()
            .map(|(name, family)| FamilySnapshot {
                name: name.clone(),
                help: family.help().to_owned(),
                kind: family.kind(),
                instances: family.snapshot(),
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let families = self.families.lock();
        f.debug_struct("Registry").field("families", &families.keys().collect::<Vec<_>>()).finish()
    }
}

/// The handles of one family, copied out of the registry for rendering.
struct FamilySnapshot {
    name: String,
    help: String,
    kind: MetricKind,
    instances: Vec<Arc<dyn Render>>,
}

#[track_caller]
fn expect_consistent<T>(result: Result<T, RegistryError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}", e),
    }
}
