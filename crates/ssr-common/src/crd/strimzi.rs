//! References to Strimzi-owned resources
//!
//! The operator never owns Kafka or KafkaUser objects; it only reads them, so
//! they are accessed as `DynamicObject`s at whatever API version the registry
//! asks for.

use kube::discovery::ApiResource;

use crate::kube_utils::build_api_resource;

/// API group of Strimzi resources
pub const STRIMZI_GROUP: &str = "kafka.strimzi.io";

/// Strimzi API version used when a registry does not name one
pub const DEFAULT_STRIMZI_API_VERSION: &str = "v1beta2";

/// Data key holding the cluster CA certificate in `<cluster>-cluster-ca-cert`
pub const CLUSTER_CA_CERT_KEY: &str = "ca.crt";

/// Data key holding the clients CA certificate in a KafkaUser Secret
pub const USER_CA_CERT_KEY: &str = "ca.crt";

/// Data key holding the user certificate in a KafkaUser Secret
pub const USER_CERT_KEY: &str = "user.crt";

/// Data key holding the user private key in a KafkaUser Secret
pub const USER_KEY_KEY: &str = "user.key";

/// Name of the Secret in which Strimzi publishes the cluster CA certificate
pub fn cluster_ca_secret_name(cluster: &str) -> String {
    format!("{}-cluster-ca-cert", cluster)
}

/// ApiResource for `Kafka` at the given Strimzi version
pub fn kafka_api_resource(version: &str) -> ApiResource {
    build_api_resource(&format!("{}/{}", STRIMZI_GROUP, version), "Kafka")
}

/// ApiResource for `KafkaUser` at the given Strimzi version
pub fn kafka_user_api_resource(version: &str) -> ApiResource {
    build_api_resource(&format!("{}/{}", STRIMZI_GROUP, version), "KafkaUser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_ca_secret_follows_strimzi_naming() {
        assert_eq!(cluster_ca_secret_name("events"), "events-cluster-ca-cert");
    }

    #[test]
    fn api_resources_track_requested_version() {
        let kafka = kafka_api_resource("v1beta1");
        assert_eq!(kafka.api_version, "kafka.strimzi.io/v1beta1");
        assert_eq!(kafka.plural, "kafkas");

        let user = kafka_user_api_resource(DEFAULT_STRIMZI_API_VERSION);
        assert_eq!(user.api_version, "kafka.strimzi.io/v1beta2");
        assert_eq!(user.plural, "kafkausers");
    }
}
