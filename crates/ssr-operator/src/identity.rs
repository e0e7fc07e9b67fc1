//! Registry identity and the names derived from it
//!
//! A registry, its KafkaUser, the KafkaUser's Secret, the Deployment and the
//! Service all share one name. Only the JKS Secret gets a suffix.

use ssr_common::crd::cluster_ca_secret_name;

/// One StrimziSchemaRegistry as seen by the reconciliation engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryIdentity {
    /// Registry name (also the KafkaUser, Deployment and Service name)
    pub name: String,
    /// Namespace shared by the registry and the Strimzi cluster
    pub namespace: String,
    /// Name of the Strimzi Kafka cluster
    pub cluster: String,
}

impl RegistryIdentity {
    /// Create a new identity
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster: cluster.into(),
        }
    }

    /// Name of the derived JKS Secret
    pub fn jks_secret_name(&self) -> String {
        format!("{}-jks", self.name)
    }

    /// Name of the Secret Strimzi writes for this registry's KafkaUser
    pub fn client_secret_name(&self) -> &str {
        &self.name
    }

    /// Name of the cluster CA Secret
    pub fn cluster_ca_secret_name(&self) -> String {
        cluster_ca_secret_name(&self.cluster)
    }
}
