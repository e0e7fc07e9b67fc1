//! Credential source reader
//!
//! Resolves the cluster CA Secret and the KafkaUser Secret into PEM strings
//! tagged with their resourceVersion. Callers that already hold one of the
//! Secrets (e.g., from a watch event) pass it in to skip the fetch.

use k8s_openapi::api::core::v1::Secret;
use tracing::debug;
use zeroize::Zeroizing;

use ssr_common::crd::{CLUSTER_CA_CERT_KEY, USER_CA_CERT_KEY, USER_CERT_KEY, USER_KEY_KEY};
use ssr_common::kube_utils::{object_ref, resource_version, secret_string};
use ssr_common::Error;

use crate::identity::RegistryIdentity;
use crate::kube_client::RegistryKubeClient;

/// Cluster CA certificate plus the version of the Secret it came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaMaterial {
    /// PEM-encoded cluster CA certificate
    pub pem: String,
    /// resourceVersion of the cluster CA Secret
    pub version: String,
}

/// KafkaUser client credential plus the version of the Secret it came from
#[derive(Clone)]
pub struct ClientCredential {
    /// PEM-encoded clients CA certificate
    pub ca_pem: String,
    /// PEM-encoded user certificate
    pub cert_pem: String,
    /// PEM-encoded user private key
    pub key_pem: Zeroizing<String>,
    /// resourceVersion of the KafkaUser Secret
    pub version: String,
}

impl std::fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredential")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Both inputs of a derived store
#[derive(Clone, Debug)]
pub struct CredentialSources {
    /// Cluster CA material (goes into the truststore)
    pub ca: CaMaterial,
    /// Client credential (goes into the keystore)
    pub client: ClientCredential,
}

/// Secrets the caller already has in hand
#[derive(Clone, Debug, Default)]
pub struct CachedSources {
    /// The `<cluster>-cluster-ca-cert` Secret
    pub cluster_ca: Option<Secret>,
    /// The KafkaUser Secret
    pub client: Option<Secret>,
}

impl CachedSources {
    /// No cached objects; everything is fetched
    pub fn none() -> Self {
        Self::default()
    }

    /// A freshly observed cluster CA Secret
    pub fn with_cluster_ca(secret: Secret) -> Self {
        Self {
            cluster_ca: Some(secret),
            client: None,
        }
    }

    /// A freshly observed KafkaUser Secret
    pub fn with_client(secret: Secret) -> Self {
        Self {
            cluster_ca: None,
            client: Some(secret),
        }
    }
}

fn version_of(secret: &Secret) -> Result<String, Error> {
    resource_version(&secret.metadata)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::malformed(
                object_ref("Secret", &secret.metadata),
                "missing metadata.resourceVersion",
            )
        })
}

/// Extract the cluster CA material from the `<cluster>-cluster-ca-cert` Secret
pub fn ca_material_from_secret(secret: &Secret) -> Result<CaMaterial, Error> {
    Ok(CaMaterial {
        pem: secret_string(secret, CLUSTER_CA_CERT_KEY)?,
        version: version_of(secret)?,
    })
}

/// Extract the client credential from a KafkaUser Secret
pub fn client_credential_from_secret(secret: &Secret) -> Result<ClientCredential, Error> {
    Ok(ClientCredential {
        ca_pem: secret_string(secret, USER_CA_CERT_KEY)?,
        cert_pem: secret_string(secret, USER_CERT_KEY)?,
        key_pem: Zeroizing::new(secret_string(secret, USER_KEY_KEY)?),
        version: version_of(secret)?,
    })
}

async fn fetch_secret(
    kube: &dyn RegistryKubeClient,
    namespace: &str,
    name: &str,
) -> Result<Secret, Error> {
    kube.get_secret(namespace, name)
        .await?
        .ok_or_else(|| Error::not_found("Secret", namespace, name))
}

/// Resolve both credential sources for a registry.
///
/// Cached Secrets are used as-is; anything missing is fetched. A source that
/// does not exist is `NotFound`, one without the expected keys is
/// `MalformedSource`. Neither is retried here.
pub async fn read_sources(
    kube: &dyn RegistryKubeClient,
    identity: &RegistryIdentity,
    cached: CachedSources,
) -> Result<CredentialSources, Error> {
    let ca_secret = match cached.cluster_ca {
        Some(secret) => secret,
        None => {
            let secret = fetch_secret(
                kube,
                &identity.namespace,
                &identity.cluster_ca_secret_name(),
            )
            .await?;
            debug!(registry = %identity.name, "retrieved cluster CA certificate");
            secret
        }
    };
    let ca = ca_material_from_secret(&ca_secret)?;
    debug!(registry = %identity.name, version = %ca.version, "cluster CA certificate version");

    let client_secret = match cached.client {
        Some(secret) => secret,
        None => {
            let secret = fetch_secret(
                kube,
                &identity.namespace,
                identity.client_secret_name(),
            )
            .await?;
            debug!(registry = %identity.name, "retrieved client certificate");
            secret
        }
    };
    let client = client_credential_from_secret(&client_secret)?;
    debug!(registry = %identity.name, version = %client.version, "client certificate version");

    Ok(CredentialSources { ca, client })
}
