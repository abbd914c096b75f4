//! Per-name containers of metric instances.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{atomic::Ordering, Arc},
};

use indexmap::IndexMap;

use crate::{
    atomics::AtomicU64,
    counter::Counter,
    error::RegistryError,
    gauge::Gauge,
    histogram::{DurationHistogram, ValueHistogram},
    kind::MetricKind,
    label::LabelSet,
};

/// Opaque identity of a metric instance.
///
/// Issued when an instance is created, from a counter shared by every registry in the process,
/// and never reused.  Two handles refer to the same instance exactly when their ids are equal,
/// even when they come from different registries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct MetricId(pub(crate) u64);

impl MetricId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        MetricId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity and pre-rendered exposition text shared by every metric type.
#[derive(Debug)]
pub(crate) struct Descriptor {
    pub id: MetricId,
    pub name: String,
    pub labels: LabelSet,
    pub label_text: Box<[u8]>,
}

impl Descriptor {
    pub fn new(id: MetricId, name: &str, labels: LabelSet) -> Self {
        let label_text = labels.render();
        Self { id, name: name.to_owned(), labels, label_text }
    }
}

/// A metric type that can live inside a [`Family`].
pub(crate) trait Metric: Sized + Send + Sync + 'static {
    /// Configuration that is fixed for the whole family, such as histogram buckets.
    type Buckets: Clone + PartialEq + fmt::Debug;

    const KIND: MetricKind;

    fn create(descriptor: Descriptor, buckets: &Self::Buckets) -> Self;

    fn descriptor(&self) -> &Descriptor;

    /// Appends the sample lines of this instance to `buffer`.
    fn render(&self, buffer: &mut Vec<u8>);

    fn wrap(family: Family<Self>) -> MetricFamily;

    fn unwrap_mut(family: &mut MetricFamily) -> Option<&mut Family<Self>>;
}

/// Object-safe view of a metric, used when rendering a snapshot of mixed families.
pub(crate) trait Render: Send + Sync {
    fn render(&self, buffer: &mut Vec<u8>);
}

impl<M: Metric> Render for M {
    fn render(&self, buffer: &mut Vec<u8>) {
        Metric::render(self, buffer)
    }
}

/// Outcome of removing an instance from a family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Removal {
    /// No instance with that identity was stored.
    Missing,
    /// The instance was removed and others remain.
    Removed,
    /// The instance was the last one; the family should be dropped.
    Emptied,
}

enum Instances<M> {
    Unlabeled(Arc<M>),
    Labeled { names: BTreeSet<String>, by_labels: IndexMap<LabelSet, Arc<M>> },
}

/// All instances registered under a single metric name.
///
/// A family is either unlabeled, holding exactly one instance, or labeled, holding one or more
/// instances whose label sets share the same label names.
pub(crate) struct Family<M: Metric> {
    help: String,
    buckets: M::Buckets,
    instances: Instances<M>,
}

impl<M: Metric> Family<M> {
    pub fn new(help: String, buckets: M::Buckets, instance: Arc<M>) -> Self {
        let labels = &instance.descriptor().labels;
        let instances = if labels.is_empty() {
            Instances::Unlabeled(instance)
        } else {
            let names = labels.names().into_iter().map(str::to_owned).collect();
            let mut by_labels = IndexMap::new();
            by_labels.insert(labels.clone(), instance);
            Instances::Labeled { names, by_labels }
        };

        Self { help, buckets, instances }
    }

    /// Gets the instance for `labels`, creating it with `create` if it does not exist yet.
    ///
    /// Fails if `labels` or `buckets` are inconsistent with the instances already in the family.
    /// Buckets are checked before the lookup, so a mismatch fails even for an existing instance.
    pub fn get_or_insert_with<F>(
        &mut self,
        name: &str,
        labels: &LabelSet,
        help: &str,
        buckets: &M::Buckets,
        create: F,
    ) -> Result<Arc<M>, RegistryError>
    where
        F: FnOnce() -> Arc<M>,
    {
        if &self.buckets != buckets {
            return Err(RegistryError::BucketMismatch {
                name: name.to_owned(),
                expected: format!("{:?}", self.buckets),
                found: format!("{:?}", buckets),
            });
        }

        let instance = match &mut self.instances {
            Instances::Unlabeled(instance) => {
                if !labels.is_empty() {
                    return Err(RegistryError::LabeledUnlabeledConflict { name: name.to_owned() });
                }
                Arc::clone(instance)
            }
            Instances::Labeled { names, by_labels } => {
                if labels.is_empty() {
                    return Err(RegistryError::LabeledUnlabeledConflict { name: name.to_owned() });
                }

                if let Some(instance) = by_labels.get(labels) {
                    Arc::clone(instance)
                } else {
                    let found = labels.names();
                    if !names.iter().map(String::as_str).eq(found.iter().copied()) {
                        return Err(RegistryError::LabelNamesMismatch {
                            name: name.to_owned(),
                            expected: names.iter().cloned().collect(),
                            found: found.into_iter().map(str::to_owned).collect(),
                        });
                    }

                    let instance = create();
                    by_labels.insert(labels.clone(), Arc::clone(&instance));
                    instance
                }
            }
        };

        self.merge_help(name, help);
        Ok(instance)
    }

    /// Removes the instance stored under `labels` if it is the instance identified by `id`.
    pub fn remove(&mut self, labels: &LabelSet, id: MetricId) -> Removal {
        match &mut self.instances {
            Instances::Unlabeled(instance) if labels.is_empty() => {
                if instance.descriptor().id == id {
                    Removal::Emptied
                } else {
                    Removal::Missing
                }
            }
            Instances::Unlabeled(_) => Removal::Missing,
            Instances::Labeled { by_labels, .. } => match by_labels.get(labels) {
                Some(instance) if instance.descriptor().id == id => {
                    by_labels.shift_remove(labels);
                    if by_labels.is_empty() {
                        Removal::Emptied
                    } else {
                        Removal::Removed
                    }
                }
                _ => Removal::Missing,
            },
        }
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn merge_help(&mut self, name: &str, help: &str) {
        if help.is_empty() || help == self.help {
            return;
        }

        if self.help.is_empty() {
            self.help = help.to_owned();
        } else {
            tracing::debug!(
                metric = name,
                existing = %self.help,
                ignored = help,
                "Ignoring conflicting help text for metric."
            );
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Render>> {
        match &self.instances {
            Instances::Unlabeled(instance) => vec![Arc::clone(instance) as Arc<dyn Render>],
            Instances::Labeled { by_labels, .. } => {
                by_labels.values().map(|instance| Arc::clone(instance) as Arc<dyn Render>).collect()
            }
        }
    }
}

/// A family of any metric kind, as stored in the registry.
pub(crate) enum MetricFamily {
    Counter(Family<Counter>),
    Gauge(Family<Gauge>),
    DurationHistogram(Family<DurationHistogram>),
    ValueHistogram(Family<ValueHistogram>),
}

impl MetricFamily {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricFamily::Counter(_) => MetricKind::Counter,
            MetricFamily::Gauge(_) => MetricKind::Gauge,
            MetricFamily::DurationHistogram(_) => MetricKind::DurationHistogram,
            MetricFamily::ValueHistogram(_) => MetricKind::ValueHistogram,
        }
    }

    pub fn help(&self) -> &str {
        match self {
            MetricFamily::Counter(family) => family.help(),
            MetricFamily::Gauge(family) => family.help(),
            MetricFamily::DurationHistogram(family) => family.help(),
            MetricFamily::ValueHistogram(family) => family.help(),
        }
    }

    pub fn merge_help(&mut self, name: &str, help: &str) {
        match self {
            MetricFamily::Counter(family) => family.merge_help(name, help),
            MetricFamily::Gauge(family) => family.merge_help(name, help),
            MetricFamily::DurationHistogram(family) => family.merge_help(name, help),
            MetricFamily::ValueHistogram(family) => family.merge_help(name, help),
        }
    }

    /// Copies the handles of every instance, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Render>> {
        match self {
            MetricFamily::Counter(family) => family.snapshot(),
            MetricFamily::Gauge(family) => family.snapshot(),
            MetricFamily::DurationHistogram(family) => family.snapshot(),
            MetricFamily::ValueHistogram(family) => family.snapshot(),
        }
    }
}
