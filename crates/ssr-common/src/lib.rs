//! Common types for the Strimzi Schema Registry operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Annotation on the JKS Secret recording the cluster CA Secret's resourceVersion
pub const CA_VERSION_ANNOTATION: &str =
    "strimziregistryoperator.roundtable.lsst.codes/caSecretVersion";

/// Annotation on the JKS Secret recording the KafkaUser Secret's resourceVersion
pub const CLIENT_VERSION_ANNOTATION: &str =
    "strimziregistryoperator.roundtable.lsst.codes/clientSecretVersion";

/// Pod template annotation holding the JKS Secret's resourceVersion.
///
/// Changing it is what forces the Deployment to roll.
pub const JKS_VERSION_ANNOTATION: &str = "strimziregistryoperator.roundtable.lsst.codes/jksVersion";

/// Label Strimzi puts on every resource belonging to a Kafka cluster
pub const STRIMZI_CLUSTER_LABEL: &str = "strimzi.io/cluster";

/// Standard managed-by label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on resources created by this operator
pub const LABEL_MANAGED_BY_OPERATOR: &str = "strimzi-registry-operator";

/// Field manager used for server-side patches
pub const FIELD_MANAGER: &str = "strimzi-registry-operator";

/// Requeue interval after a successful reconcile (periodic resync)
pub const REQUEUE_SUCCESS_SECS: u64 = 300;

/// Requeue interval after a retryable error
pub const REQUEUE_ERROR_SECS: u64 = 10;

/// Requeue interval after a non-retryable error (needs a config or tool fix)
pub const REQUEUE_PERMANENT_ERROR_SECS: u64 = 600;
