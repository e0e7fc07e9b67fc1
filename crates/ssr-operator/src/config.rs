//! Operator and per-registry configuration
//!
//! Process-wide settings come from flags or `SSR_*` environment variables.
//! Per-registry settings come from the StrimziSchemaRegistry spec, with
//! defaults filled in here.

use clap::Args;
use tracing::warn;

use ssr_common::crd::{StrimziSchemaRegistrySpec, DEFAULT_STRIMZI_API_VERSION};
use ssr_common::telemetry::LogFormat;

/// Default Kafka listener name
pub const DEFAULT_LISTENER: &str = "tls";
/// Default Service type
pub const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";
/// Default Schema Registry image
pub const DEFAULT_REGISTRY_IMAGE: &str = "confluentinc/cp-schema-registry";
/// Default Schema Registry image tag
pub const DEFAULT_REGISTRY_IMAGE_TAG: &str = "8.0.0";
/// Default replica count
pub const DEFAULT_REPLICAS: i32 = 1;
/// Default subject compatibility level
pub const DEFAULT_COMPATIBILITY_LEVEL: &str = "forward";
/// Default Kafka store security protocol
pub const DEFAULT_SECURITY_PROTOCOL: &str = "SSL";
/// Default schema topic
pub const DEFAULT_REGISTRY_TOPIC: &str = "registry-schemas";

/// Process-wide operator settings
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Name of the Strimzi Kafka cluster served by this operator
    #[arg(long, env = "SSR_CLUSTER_NAME", default_value = "events")]
    pub cluster_name: String,

    /// Namespace watched for registries and Strimzi Secrets
    #[arg(long, env = "SSR_NAMESPACE", default_value = "events")]
    pub namespace: String,

    /// Log output format (text or json)
    #[arg(long, env = "SSR_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

/// A registry spec with every default applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Strimzi API version for Kafka and KafkaUser lookups
    pub strimzi_version: String,
    /// Kafka listener to connect through
    pub listener: String,
    /// Service type
    pub service_type: String,
    /// Container image without tag
    pub registry_image: String,
    /// Container image tag
    pub registry_image_tag: String,
    /// Replica count
    pub replicas: i32,
    /// CPU limit, if any
    pub cpu_limit: Option<String>,
    /// CPU request, if any
    pub cpu_request: Option<String>,
    /// Memory limit, if any
    pub memory_limit: Option<String>,
    /// Memory request, if any
    pub memory_request: Option<String>,
    /// Subject compatibility level
    pub compatibility_level: String,
    /// Kafka store security protocol
    pub security_protocol: String,
    /// Schema topic
    pub registry_topic: String,
}

/// `None` for unset or empty strings
fn nullable(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn or_default(value: &Option<String>, default: &str) -> String {
    nullable(value).unwrap_or_else(|| default.to_string())
}

impl RegistryConfig {
    /// Apply defaults to a registry spec.
    ///
    /// A missing `strimziVersion` or `listener` is logged, since those are
    /// the settings most likely to be wrong for a given cluster.
    pub fn from_spec(name: &str, spec: &StrimziSchemaRegistrySpec) -> Self {
        if nullable(&spec.strimzi_version).is_none() {
            warn!(
                registry = %name,
                default = DEFAULT_STRIMZI_API_VERSION,
                "registry is missing strimziVersion; using default"
            );
        }
        if nullable(&spec.listener).is_none() {
            warn!(
                registry = %name,
                default = DEFAULT_LISTENER,
                "registry is missing a listener name; using default"
            );
        }

        Self {
            strimzi_version: or_default(&spec.strimzi_version, DEFAULT_STRIMZI_API_VERSION),
            listener: or_default(&spec.listener, DEFAULT_LISTENER),
            service_type: or_default(&spec.service_type, DEFAULT_SERVICE_TYPE),
            registry_image: or_default(&spec.registry_image, DEFAULT_REGISTRY_IMAGE),
            registry_image_tag: or_default(&spec.registry_image_tag, DEFAULT_REGISTRY_IMAGE_TAG),
            replicas: spec.replicas.unwrap_or(DEFAULT_REPLICAS),
            cpu_limit: nullable(&spec.cpu_limit),
            cpu_request: nullable(&spec.cpu_request),
            memory_limit: nullable(&spec.memory_limit),
            memory_request: nullable(&spec.memory_request),
            compatibility_level: or_default(
                &spec.compatibility_level,
                DEFAULT_COMPATIBILITY_LEVEL,
            ),
            security_protocol: or_default(&spec.security_protocol, DEFAULT_SECURITY_PROTOCOL),
            registry_topic: or_default(&spec.registry_topic, DEFAULT_REGISTRY_TOPIC),
        }
    }

    /// Full image reference
    pub fn image(&self) -> String {
        format!("{}:{}", self.registry_image, self.registry_image_tag)
    }
}
