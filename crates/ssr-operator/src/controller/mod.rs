//! Reconciliation entry points
//!
//! - [`registry`]: the `StrimziSchemaRegistry` controller, which provisions
//!   the JKS Secret, Deployment and Service and resyncs them periodically
//! - [`secret_watcher`]: reacts to Strimzi rotating the cluster CA or a
//!   KafkaUser credential
//!
//! Both go through [`sync_store`], so the JKS Secret is always published
//! before the Deployment is stamped with its version.

pub mod registry;
pub mod secret_watcher;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::debug;

use ssr_common::Error;

use crate::context::Context;
use crate::identity::RegistryIdentity;
use crate::reconciler::ensure_derived_store;
use crate::rollout::{needs_rollout, stamp};
use crate::source::CachedSources;

pub use registry::{error_policy, reconcile};
pub use secret_watcher::{handle_secret_change, run_secret_watcher, SecretEventType};

/// What [`sync_store`] found and did
#[derive(Clone, Debug)]
pub struct SyncedStore {
    /// resourceVersion of the JKS Secret in effect
    pub version: String,
    /// Whether a new JKS Secret was published
    pub published: bool,
    /// The registry Deployment, if it exists
    pub deployment: Option<Deployment>,
    /// Whether the Deployment was stamped with a new version
    pub rolled: bool,
}

/// Bring the JKS Secret up to date and roll the Deployment onto it.
///
/// The Deployment is only stamped when its pod template records a different
/// JKS Secret version, which also catches a stamp lost after an earlier
/// publish.
pub(crate) async fn sync_store(
    ctx: &Context,
    owner: &OwnerReference,
    identity: &RegistryIdentity,
    cached: CachedSources,
) -> Result<SyncedStore, Error> {
    let outcome = ensure_derived_store(
        ctx.kube.as_ref(),
        &ctx.synthesizer,
        owner,
        identity,
        cached,
    )
    .await?;
    let version = outcome.version()?.to_string();

    let deployment = ctx
        .kube
        .get_deployment(&identity.namespace, &identity.name)
        .await?;

    let rolled = match &deployment {
        Some(d) if needs_rollout(d, &version) => {
            stamp(ctx.kube.as_ref(), &identity.namespace, &identity.name, &version).await?;
            true
        }
        Some(_) => {
            debug!(
                registry = %identity.name,
                version = %version,
                "deployment already on current JKS version"
            );
            false
        }
        None => false,
    };

    Ok(SyncedStore {
        version,
        published: outcome.published(),
        deployment,
        rolled,
    })
}
