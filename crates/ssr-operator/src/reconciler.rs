//! Derived JKS Secret reconciliation
//!
//! The `<name>-jks` Secret records the resourceVersions of the two Secrets it
//! was built from. While both still match, the Secret is current and nothing
//! is regenerated. When either changes, the Secret is deleted and rebuilt
//! wholesale with fresh passwords; it is never patched in place.
//!
//! State is only ever decided from a confirmed answer. A 404 means absent;
//! any other read failure is returned to the caller, which retries the whole
//! reconcile later.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use tracing::{debug, info, warn};

use ssr_common::kube_utils::{annotation, object_ref, resource_version};
use ssr_common::{
    Error, CA_VERSION_ANNOTATION, CLIENT_VERSION_ANNOTATION, LABEL_MANAGED_BY,
    LABEL_MANAGED_BY_OPERATOR,
};

use crate::identity::RegistryIdentity;
use crate::keystore::{GeneratedStore, StoreSynthesizer};
use crate::kube_client::RegistryKubeClient;
use crate::source::{read_sources, CachedSources, CredentialSources};

/// Data key of the truststore in the JKS Secret
pub const TRUSTSTORE_KEY: &str = "truststore.jks";
/// Data key of the keystore in the JKS Secret
pub const KEYSTORE_KEY: &str = "keystore.jks";
/// Data key of the truststore password in the JKS Secret
pub const TRUSTSTORE_PASSWORD_KEY: &str = "truststore_password";
/// Data key of the keystore password in the JKS Secret
pub const KEYSTORE_PASSWORD_KEY: &str = "keystore_password";

/// Freshness of the derived Secret relative to its sources
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreState {
    /// No derived Secret exists (confirmed 404)
    Absent,
    /// A derived Secret exists but was built from other source versions
    Stale {
        /// CA version recorded on the existing Secret
        recorded_ca: Option<String>,
        /// Client version recorded on the existing Secret
        recorded_client: Option<String>,
    },
    /// Both recorded versions match the live sources
    Current,
}

/// Compare an existing derived Secret against the live source versions
pub fn assess(existing: Option<&Secret>, sources: &CredentialSources) -> StoreState {
    let Some(secret) = existing else {
        return StoreState::Absent;
    };
    let recorded_ca = annotation(&secret.metadata, CA_VERSION_ANNOTATION);
    let recorded_client = annotation(&secret.metadata, CLIENT_VERSION_ANNOTATION);

    if recorded_ca == Some(sources.ca.version.as_str())
        && recorded_client == Some(sources.client.version.as_str())
    {
        StoreState::Current
    } else {
        StoreState::Stale {
            recorded_ca: recorded_ca.map(str::to_string),
            recorded_client: recorded_client.map(str::to_string),
        }
    }
}

/// Freshly synthesized stores and the source versions they were built from
#[derive(Debug)]
pub struct DerivedStore {
    /// Truststore holding the cluster CA
    pub truststore: GeneratedStore,
    /// Keystore holding the client key and chain
    pub keystore: GeneratedStore,
    /// Cluster CA Secret version used
    pub ca_version: String,
    /// KafkaUser Secret version used
    pub client_version: String,
}

impl DerivedStore {
    /// Synthesize both stores from the given sources
    pub async fn synthesize(
        synthesizer: &StoreSynthesizer,
        sources: &CredentialSources,
    ) -> Result<Self, Error> {
        let truststore = synthesizer.create_truststore(&sources.ca.pem, None).await?;
        let keystore = synthesizer
            .create_keystore(
                &sources.client.ca_pem,
                &sources.client.cert_pem,
                &sources.client.key_pem,
                None,
            )
            .await?;
        Ok(Self {
            truststore,
            keystore,
            ca_version: sources.ca.version.clone(),
            client_version: sources.client.version.clone(),
        })
    }

    /// Render the Secret to publish for `identity`, owned by `owner`
    pub fn to_secret(&self, identity: &RegistryIdentity, owner: &OwnerReference) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(identity.jks_secret_name()),
                namespace: Some(identity.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    LABEL_MANAGED_BY.to_string(),
                    LABEL_MANAGED_BY_OPERATOR.to_string(),
                )])),
                annotations: Some(BTreeMap::from([
                    (CA_VERSION_ANNOTATION.to_string(), self.ca_version.clone()),
                    (
                        CLIENT_VERSION_ANNOTATION.to_string(),
                        self.client_version.clone(),
                    ),
                ])),
                owner_references: Some(vec![owner.clone()]),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([
                (
                    TRUSTSTORE_KEY.to_string(),
                    ByteString(self.truststore.bytes.clone()),
                ),
                (
                    KEYSTORE_KEY.to_string(),
                    ByteString(self.keystore.bytes.clone()),
                ),
                (
                    TRUSTSTORE_PASSWORD_KEY.to_string(),
                    ByteString(self.truststore.password.as_bytes().to_vec()),
                ),
                (
                    KEYSTORE_PASSWORD_KEY.to_string(),
                    ByteString(self.keystore.password.as_bytes().to_vec()),
                ),
            ])),
            ..Default::default()
        }
    }
}

/// Result of [`ensure_derived_store`]
#[derive(Clone, Debug)]
pub enum StoreOutcome {
    /// The existing Secret was current and returned unchanged
    Reused(Secret),
    /// A new Secret was synthesized and published
    Published(Secret),
}

impl StoreOutcome {
    /// The JKS Secret now in effect
    pub fn secret(&self) -> &Secret {
        match self {
            StoreOutcome::Reused(s) | StoreOutcome::Published(s) => s,
        }
    }

    /// Whether new stores were published
    pub fn published(&self) -> bool {
        matches!(self, StoreOutcome::Published(_))
    }

    /// resourceVersion of the JKS Secret, used as the rollout token
    pub fn version(&self) -> Result<&str, Error> {
        let secret = self.secret();
        resource_version(&secret.metadata).ok_or_else(|| {
            Error::malformed(
                object_ref("Secret", &secret.metadata),
                "JKS Secret has no metadata.resourceVersion",
            )
        })
    }
}

/// Make sure the JKS Secret of `identity` reflects the current sources.
///
/// Current: returned unchanged without running any tool. Stale: deleted
/// (best effort), rebuilt and published. Absent: built and published. The
/// published Secret is the API server's response, so it carries the
/// resourceVersion callers stamp onto the Deployment.
pub async fn ensure_derived_store(
    kube: &dyn RegistryKubeClient,
    synthesizer: &StoreSynthesizer,
    owner: &OwnerReference,
    identity: &RegistryIdentity,
    cached: CachedSources,
) -> Result<StoreOutcome, Error> {
    let sources = read_sources(kube, identity, cached).await?;
    let jks_name = identity.jks_secret_name();
    let existing = kube.get_secret(&identity.namespace, &jks_name).await?;

    match (assess(existing.as_ref(), &sources), existing) {
        (StoreState::Current, Some(secret)) => {
            info!(registry = %identity.name, secret = %jks_name, "JKS secret is up-to-date");
            return Ok(StoreOutcome::Reused(secret));
        }
        (
            StoreState::Stale {
                recorded_ca,
                recorded_client,
            },
            _,
        ) => {
            info!(
                registry = %identity.name,
                secret = %jks_name,
                recorded_ca = ?recorded_ca,
                recorded_client = ?recorded_client,
                ca_version = %sources.ca.version,
                client_version = %sources.client.version,
                "JKS secret is stale; replacing it"
            );
            match kube.delete_secret(&identity.namespace, &jks_name).await {
                Ok(()) => debug!(secret = %jks_name, "deleted stale JKS secret"),
                Err(e) if e.is_not_found() => {
                    debug!(secret = %jks_name, "stale JKS secret already gone")
                }
                Err(e) => warn!(
                    secret = %jks_name,
                    error = %e,
                    "failed to delete stale JKS secret; publishing anyway"
                ),
            }
        }
        _ => {
            info!(registry = %identity.name, secret = %jks_name, "no JKS secret yet; creating it");
        }
    }

    let derived = DerivedStore::synthesize(synthesizer, &sources).await?;
    let secret = derived.to_secret(identity, owner);
    let created = kube.create_secret(&identity.namespace, &secret).await?;
    info!(
        registry = %identity.name,
        secret = %jks_name,
        version = ?created.metadata.resource_version,
        "published JKS secret"
    );
    Ok(StoreOutcome::Published(created))
}
