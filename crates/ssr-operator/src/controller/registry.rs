//! StrimziSchemaRegistry controller
//!
//! Provisions everything a registry needs to run against its Strimzi
//! cluster:
//!
//! 1. Look up the KafkaUser of the same name to learn which cluster it
//!    belongs to
//! 2. Resolve the bootstrap address of the configured listener from the
//!    Kafka status
//! 3. Ensure the JKS Secret matches the current CA and client credentials
//! 4. Create the Deployment and Service when absent, or roll the Deployment
//!    when it runs with an older JKS Secret
//!
//! Every step is idempotent, so the periodic requeue doubles as a resync.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use ssr_common::crd::{StrimziSchemaRegistry, StrimziSchemaRegistryStatus};
use ssr_common::kube_utils::{label, object_ref, owner_reference};
use ssr_common::{
    Error, REQUEUE_ERROR_SECS, REQUEUE_PERMANENT_ERROR_SECS, REQUEUE_SUCCESS_SECS,
    STRIMZI_CLUSTER_LABEL,
};

use crate::config::RegistryConfig;
use crate::context::Context;
use crate::identity::RegistryIdentity;
use crate::listener::resolve_bootstrap_server;
use crate::manifests::{build_deployment, build_service, DeploymentParams};
use crate::source::CachedSources;

use super::sync_store;

/// Reconcile a StrimziSchemaRegistry
#[instrument(skip(registry, ctx), fields(registry = %registry.name_any()))]
pub async fn reconcile(
    registry: Arc<StrimziSchemaRegistry>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = registry.name_any();
    let namespace = registry
        .namespace()
        .unwrap_or_else(|| ctx.config.namespace.clone());
    let config = RegistryConfig::from_spec(&name, &registry.spec);
    let owner = owner_reference(registry.as_ref())?;

    let _guard = ctx.locks.lock(&name).await;
    debug!(namespace = %namespace, "reconciling registry");

    let kafka_user = ctx
        .kube
        .get_kafka_user(&namespace, &config.strimzi_version, &name)
        .await?
        .ok_or_else(|| Error::not_found("KafkaUser", &namespace, &name))?;
    let cluster = label(&kafka_user.metadata, STRIMZI_CLUSTER_LABEL)
        .ok_or_else(|| {
            Error::malformed(
                object_ref("KafkaUser", &kafka_user.metadata),
                format!("missing label {}", STRIMZI_CLUSTER_LABEL),
            )
        })?
        .to_string();
    if cluster != ctx.config.cluster_name {
        warn!(
            cluster = %cluster,
            watched_cluster = %ctx.config.cluster_name,
            "KafkaUser belongs to a cluster this operator does not watch; credential rotation will not be picked up"
        );
    }

    let kafka = ctx
        .kube
        .get_kafka(&namespace, &config.strimzi_version, &cluster)
        .await?
        .ok_or_else(|| Error::not_found("Kafka", &namespace, &cluster))?;
    let bootstrap_server = resolve_bootstrap_server(&kafka.data, &config.listener)?;
    debug!(listener = %config.listener, bootstrap_server = %bootstrap_server, "resolved listener");

    let identity = RegistryIdentity::new(&name, &namespace, &cluster);
    let synced = sync_store(&ctx, &owner, &identity, CachedSources::none()).await?;
    let secret_name = identity.jks_secret_name();

    if synced.deployment.is_none() {
        let deployment = build_deployment(&DeploymentParams {
            name: &name,
            bootstrap_server: &bootstrap_server,
            secret_name: &secret_name,
            secret_version: &synced.version,
            config: &config,
            owner: &owner,
        });
        ctx.kube.create_deployment(&namespace, &deployment).await?;
        info!(deployment = %name, jks_version = %synced.version, "created registry Deployment");
    }

    if ctx.kube.get_service(&namespace, &name).await?.is_none() {
        let service = build_service(&name, &config.service_type, &owner);
        ctx.kube.create_service(&namespace, &service).await?;
        info!(service = %name, service_type = %config.service_type, "created registry Service");
    }

    if ctx.registries.insert(name.as_str()) {
        info!(tracked = ctx.registries.len(), "tracking registry");
    }

    let status = StrimziSchemaRegistryStatus {
        bootstrap_server: Some(bootstrap_server),
        jks_secret_version: Some(synced.version),
    };
    if registry.status.as_ref() != Some(&status) {
        ctx.kube
            .patch_registry_status(&namespace, &name, &status)
            .await?;
    }

    Ok(Action::requeue(Duration::from_secs(REQUEUE_SUCCESS_SECS)))
}

/// Error policy for the registry controller
///
/// Retryable errors come back quickly; anything that needs a fix to the
/// registry, its KafkaUser or the tool images waits longer.
pub fn error_policy(
    registry: Arc<StrimziSchemaRegistry>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    error!(
        ?error,
        registry = %registry.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS))
    } else {
        Action::requeue(Duration::from_secs(REQUEUE_PERMANENT_ERROR_SECS))
    }
}
