//! Deployment and Service manifests for a Schema Registry
//!
//! The registry reads its Kafka TLS material from the JKS Secret, mounted at
//! `/var/schemaregistry`, with the store passwords injected from the same
//! Secret. The pod template carries the JKS Secret's resourceVersion so a
//! republished Secret can roll the pods.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, ResourceRequirements, SecretKeySelector, SecretVolumeSource, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};

use ssr_common::{JKS_VERSION_ANNOTATION, LABEL_MANAGED_BY, LABEL_MANAGED_BY_OPERATOR};

use crate::config::RegistryConfig;
use crate::reconciler::{
    KEYSTORE_KEY, KEYSTORE_PASSWORD_KEY, TRUSTSTORE_KEY, TRUSTSTORE_PASSWORD_KEY,
};

/// Port the registry REST API listens on
pub const REGISTRY_PORT: i32 = 8081;
/// Name of the registry port
pub const REGISTRY_PORT_NAME: &str = "schema-registry";
/// Mount path of the JKS Secret
pub const TLS_MOUNT_PATH: &str = "/var/schemaregistry";

const TLS_VOLUME: &str = "tls";
const CONTAINER_NAME: &str = "server";
const APP_NAME: &str = "strimzischemaregistry";

/// Everything needed to render a registry Deployment
#[derive(Clone, Debug)]
pub struct DeploymentParams<'a> {
    /// Registry name (Deployment name and `app` label)
    pub name: &'a str,
    /// Resolved Kafka bootstrap `host:port`
    pub bootstrap_server: &'a str,
    /// Name of the JKS Secret
    pub secret_name: &'a str,
    /// resourceVersion of the JKS Secret
    pub secret_version: &'a str,
    /// Registry settings
    pub config: &'a RegistryConfig,
    /// Owner reference to the StrimziSchemaRegistry
    pub owner: &'a OwnerReference,
}

fn common_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/instance".to_string(), name.to_string()),
        (
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_OPERATOR.to_string(),
        ),
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/part-of".to_string(), name.to_string()),
    ])
}

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), name.to_string())])
}

fn env_value(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn env_secret(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn registry_env(params: &DeploymentParams<'_>) -> Vec<EnvVar> {
    let config = params.config;
    vec![
        EnvVar {
            name: "SCHEMA_REGISTRY_HOST_NAME".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "status.podIP".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        env_value(
            "SCHEMA_REGISTRY_LISTENERS",
            format!("http://0.0.0.0:{}", REGISTRY_PORT),
        ),
        env_value(
            "SCHEMA_REGISTRY_KAFKASTORE_BOOTSTRAP_SERVERS",
            params.bootstrap_server,
        ),
        env_value(
            "SCHEMA_REGISTRY_SCHEMA_COMPATIBILITY_LEVEL",
            &config.compatibility_level,
        ),
        env_value("SCHEMA_REGISTRY_MASTER_ELIGIBILITY", "true"),
        env_value("SCHEMA_REGISTRY_HEAP_OPTS", "-Xms512M -Xmx512M"),
        env_value("SCHEMA_REGISTRY_KAFKASTORE_TOPIC", &config.registry_topic),
        env_value(
            "SCHEMA_REGISTRY_KAFKASTORE_SSL_KEYSTORE_LOCATION",
            format!("{}/{}", TLS_MOUNT_PATH, KEYSTORE_KEY),
        ),
        env_secret(
            "SCHEMA_REGISTRY_KAFKASTORE_SSL_KEYSTORE_PASSWORD",
            params.secret_name,
            KEYSTORE_PASSWORD_KEY,
        ),
        env_value(
            "SCHEMA_REGISTRY_KAFKASTORE_SSL_TRUSTSTORE_LOCATION",
            format!("{}/{}", TLS_MOUNT_PATH, TRUSTSTORE_KEY),
        ),
        env_secret(
            "SCHEMA_REGISTRY_KAFKASTORE_SSL_TRUSTSTORE_PASSWORD",
            params.secret_name,
            TRUSTSTORE_PASSWORD_KEY,
        ),
        env_value(
            "SCHEMA_REGISTRY_KAFKASTORE_SECURITY_PROTOCOL",
            &config.security_protocol,
        ),
    ]
}

/// Resource limits/requests; `None` when nothing is configured
fn resources(config: &RegistryConfig) -> Option<ResourceRequirements> {
    let pick = |cpu: &Option<String>, memory: &Option<String>| {
        let mut map = BTreeMap::new();
        if let Some(cpu) = cpu {
            map.insert("cpu".to_string(), Quantity(cpu.clone()));
        }
        if let Some(memory) = memory {
            map.insert("memory".to_string(), Quantity(memory.clone()));
        }
        (!map.is_empty()).then_some(map)
    };
    let limits = pick(&config.cpu_limit, &config.memory_limit);
    let requests = pick(&config.cpu_request, &config.memory_request);
    if limits.is_none() && requests.is_none() {
        return None;
    }
    Some(ResourceRequirements {
        limits,
        requests,
        ..Default::default()
    })
}

/// Render the registry Deployment
pub fn build_deployment(params: &DeploymentParams<'_>) -> Deployment {
    let config = params.config;
    let mut labels = common_labels(params.name);
    labels.extend(selector_labels(params.name));
    labels.insert(
        "app.kubernetes.io/version".to_string(),
        config.registry_image_tag.clone(),
    );

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(config.image()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(REGISTRY_PORT_NAME.to_string()),
            container_port: REGISTRY_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(registry_env(params)),
        volume_mounts: Some(vec![VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        resources: resources(config),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(params.name.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![params.owner.clone()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(config.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(params.name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(params.name)),
                    annotations: Some(BTreeMap::from([(
                        JKS_VERSION_ANNOTATION.to_string(),
                        params.secret_version.to_string(),
                    )])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: TLS_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(params.secret_name.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Render the Service exposing the registry REST API
pub fn build_service(name: &str, service_type: &str, owner: &OwnerReference) -> Service {
    let mut labels = common_labels(name);
    labels.insert("name".to_string(), name.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![owner.clone()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            ports: Some(vec![ServicePort {
                name: Some(REGISTRY_PORT_NAME.to_string()),
                port: REGISTRY_PORT,
                ..Default::default()
            }]),
            selector: Some(selector_labels(name)),
            ..Default::default()
        }),
        ..Default::default()
    }
}
