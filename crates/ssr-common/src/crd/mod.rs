//! Custom Resource Definitions and upstream Strimzi resource references

mod registry;
mod strimzi;

pub use registry::{StrimziSchemaRegistry, StrimziSchemaRegistrySpec, StrimziSchemaRegistryStatus};
pub use strimzi::{
    cluster_ca_secret_name, kafka_api_resource, kafka_user_api_resource, CLUSTER_CA_CERT_KEY,
    DEFAULT_STRIMZI_API_VERSION, STRIMZI_GROUP, USER_CA_CERT_KEY, USER_CERT_KEY, USER_KEY_KEY,
};
