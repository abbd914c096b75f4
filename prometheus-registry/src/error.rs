use thiserror::Error as ThisError;

use crate::kind::MetricKind;

/// Contract violations detected while registering a metric.
///
/// These are programmer errors: the caller asked for something inconsistent with an earlier
/// registration under the same name.  The `make_*` methods of [`Registry`](crate::Registry) panic
/// with these messages; the `try_make_*` methods return them instead.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum RegistryError {
    /// The name is already bound to a different metric kind.
    #[error(
        "metric `{name}` is already registered as a {existing}, cannot register it as a {requested}"
    )]
    KindMismatch {
        /// Metric name.
        name: String,
        /// Kind the name is currently bound to.
        existing: MetricKind,
        /// Kind that was requested.
        requested: MetricKind,
    },

    /// The name is registered without labels and labels were supplied, or vice versa.
    #[error("metric `{name}` cannot mix labeled and unlabeled instances")]
    LabeledUnlabeledConflict {
        /// Metric name.
        name: String,
    },

    /// The label names differ from those of the existing instances of the family.
    #[error("metric `{name}` is registered with labels {expected:?}, got {found:?}")]
    LabelNamesMismatch {
        /// Metric name.
        name: String,
        /// Label names shared by the existing instances.
        expected: Vec<String>,
        /// Label names that were supplied.
        found: Vec<String>,
    },

    /// The same label key was supplied twice in one label set.
    #[error("metric `{name}` has duplicate label `{label}`")]
    DuplicateLabelName {
        /// Metric name.
        name: String,
        /// Duplicated label key, as supplied.
        label: String,
    },

    /// The histogram buckets differ from the ones the family was created with.
    #[error("histogram `{name}` is registered with buckets {expected}, got {found}")]
    BucketMismatch {
        /// Metric name.
        name: String,
        /// Bucket bounds of the existing family.
        expected: String,
        /// Bucket bounds that were supplied.
        found: String,
    },

    /// A histogram bucket bound is NaN.
    #[error("histogram `{name}` has a NaN bucket bound")]
    InvalidBucketBound {
        /// Metric name.
        name: String,
    },
}
