//! StrimziSchemaRegistry CRD
//!
//! A StrimziSchemaRegistry asks the operator to run a Confluent Schema Registry
//! against a Strimzi-managed Kafka cluster. The registry authenticates with the
//! KafkaUser of the same name, whose PEM credentials the operator repackages
//! into JKS stores.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// StrimziSchemaRegistry deploys a Schema Registry for a Strimzi Kafka cluster.
///
/// Every field is optional; defaults are applied by the operator and a
/// warning is logged for `strimziVersion` and `listener`.
///
/// Example:
/// ```yaml
/// apiVersion: roundtable.lsst.codes/v1beta1
/// kind: StrimziSchemaRegistry
/// metadata:
///   name: confluent-schema-registry
/// spec:
///   strimziVersion: v1beta2
///   listener: tls
///   compatibilityLevel: forward
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "roundtable.lsst.codes",
    version = "v1beta1",
    kind = "StrimziSchemaRegistry",
    plural = "strimzischemaregistries",
    shortname = "ssr",
    namespaced,
    status = "StrimziSchemaRegistryStatus",
    printcolumn = r#"{"name":"Listener","type":"string","jsonPath":".spec.listener"}"#,
    printcolumn = r#"{"name":"Bootstrap","type":"string","jsonPath":".status.bootstrapServer"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StrimziSchemaRegistrySpec {
    /// API version of the Strimzi resources (e.g., "v1beta2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strimzi_version: Option<String>,

    /// Name of the Kafka listener to connect through (e.g., "tls")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<String>,

    /// Kubernetes Service type for the registry API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,

    /// Schema Registry container image (without tag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_image: Option<String>,

    /// Schema Registry container image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_image_tag: Option<String>,

    /// Number of registry replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// CPU limit for the registry container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,

    /// CPU request for the registry container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,

    /// Memory limit for the registry container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,

    /// Memory request for the registry container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_request: Option<String>,

    /// Default subject compatibility level (none, backward, forward, full, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_level: Option<String>,

    /// Kafka store security protocol (SSL, PLAINTEXT, SASL_PLAINTEXT, SASL_SSL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_protocol: Option<String>,

    /// Kafka topic the registry stores schemas in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_topic: Option<String>,
}

/// Observed state written back by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrimziSchemaRegistryStatus {
    /// Resolved `host:port` of the Kafka bootstrap listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_server: Option<String>,

    /// resourceVersion of the JKS Secret the Deployment currently runs with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jks_secret_version: Option<String>,
}
