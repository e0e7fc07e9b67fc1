//! Secret watcher
//!
//! Strimzi rotates the cluster CA Secret and the per-user client Secrets on
//! its own schedule. This watcher sees every Secret labelled with the
//! operator's cluster and refreshes the affected registries:
//!
//! - the cluster CA Secret changed: every tracked registry
//! - a Secret named after a tracked registry changed: that registry
//!
//! The changed Secret is passed down as cached source material, so each
//! refresh reads only the other source from the API.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use ssr_common::crd::cluster_ca_secret_name;
use ssr_common::kube_utils::{label, owner_reference};
use ssr_common::{Error, STRIMZI_CLUSTER_LABEL};

use crate::config::OperatorConfig;
use crate::context::Context;
use crate::identity::RegistryIdentity;
use crate::registry_cache::RegistryNames;
use crate::source::CachedSources;

use super::sync_store;

/// Kind of change a Secret went through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretEventType {
    /// Seen for the first time (including the watcher's initial listing)
    Added,
    /// Updated in place
    Modified,
    /// Removed
    Deleted,
}

/// Which refresh a Secret event calls for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretDispatch {
    /// Not relevant to any registry
    Ignored,
    /// The cluster CA changed; refresh every tracked registry
    ClusterCa,
    /// The client credential of one registry changed
    Client(String),
}

/// Result of refreshing one registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The JKS Secret and Deployment are in sync
    Refreshed {
        /// resourceVersion of the JKS Secret in effect
        version: String,
        /// Whether a new JKS Secret was published
        published: bool,
        /// Whether the Deployment was stamped
        rolled: bool,
    },
    /// The registry no longer exists and was dropped from the cache
    Forgotten,
}

/// Decide what a Secret event means for the tracked registries.
///
/// Deletions are ignored: a missing source is picked up by the next
/// reconcile of the registry, which fails with `NotFound` until Strimzi
/// recreates it.
pub fn classify(
    config: &OperatorConfig,
    registries: &RegistryNames,
    event_type: SecretEventType,
    secret: &Secret,
) -> SecretDispatch {
    let name = secret.name_any();

    if event_type == SecretEventType::Deleted {
        debug!(secret = %name, "ignoring Secret deletion");
        return SecretDispatch::Ignored;
    }

    match label(&secret.metadata, STRIMZI_CLUSTER_LABEL) {
        Some(cluster) if cluster == config.cluster_name => {}
        other => {
            debug!(secret = %name, cluster = ?other, "Secret is not part of the watched cluster");
            return SecretDispatch::Ignored;
        }
    }

    if name == cluster_ca_secret_name(&config.cluster_name) {
        SecretDispatch::ClusterCa
    } else if registries.contains(&name) {
        SecretDispatch::Client(name)
    } else {
        debug!(secret = %name, "Secret does not belong to a tracked registry");
        SecretDispatch::Ignored
    }
}

/// Handle one Secret event
pub async fn handle_secret_change(
    ctx: &Context,
    event_type: SecretEventType,
    secret: &Secret,
) -> Result<SecretDispatch, Error> {
    let dispatch = classify(&ctx.config, &ctx.registries, event_type, secret);
    let namespace = secret
        .namespace()
        .unwrap_or_else(|| ctx.config.namespace.clone());

    match &dispatch {
        SecretDispatch::Ignored => {}
        SecretDispatch::ClusterCa => {
            info!(
                secret = %secret.name_any(),
                version = ?secret.metadata.resource_version,
                event = ?event_type,
                "cluster CA Secret changed"
            );
            refresh_with_new_cluster_ca(ctx, &namespace, secret).await?;
        }
        SecretDispatch::Client(name) => {
            info!(
                registry = %name,
                version = ?secret.metadata.resource_version,
                event = ?event_type,
                "client Secret changed"
            );
            refresh_with_new_client_secret(ctx, &namespace, name, secret).await?;
        }
    }

    Ok(dispatch)
}

/// Refresh every tracked registry against a new cluster CA.
///
/// One failing registry does not stop the others; the first error is
/// returned once all have been attempted.
pub async fn refresh_with_new_cluster_ca(
    ctx: &Context,
    namespace: &str,
    cluster_ca: &Secret,
) -> Result<(), Error> {
    let names = ctx.registries.names();
    debug!(count = names.len(), "refreshing registries for new cluster CA");

    let mut first_error = None;
    for name in names {
        let cached = CachedSources::with_cluster_ca(cluster_ca.clone());
        if let Err(e) = refresh_registry(ctx, namespace, &name, cached).await {
            warn!(registry = %name, error = %e, "failed to refresh registry for new cluster CA");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Refresh one registry against its new client Secret
pub async fn refresh_with_new_client_secret(
    ctx: &Context,
    namespace: &str,
    name: &str,
    client: &Secret,
) -> Result<RefreshOutcome, Error> {
    refresh_registry(ctx, namespace, name, CachedSources::with_client(client.clone())).await
}

/// Bring one registry's JKS Secret and Deployment up to date.
///
/// A registry that no longer exists is dropped from the cache and the lock
/// table. A registry whose Deployment is missing only gets its JKS Secret;
/// the registry controller creates the Deployment.
pub async fn refresh_registry(
    ctx: &Context,
    namespace: &str,
    name: &str,
    cached: CachedSources,
) -> Result<RefreshOutcome, Error> {
    let guard = ctx.locks.lock(name).await;

    let Some(registry) = ctx.kube.get_registry(namespace, name).await? else {
        ctx.registries.remove(name);
        drop(guard);
        ctx.locks.forget(name);
        info!(registry = %name, "registry no longer exists; no longer tracking it");
        return Ok(RefreshOutcome::Forgotten);
    };

    let owner = owner_reference(&registry)?;
    let identity = RegistryIdentity::new(name, namespace, &ctx.config.cluster_name);
    let synced = sync_store(ctx, &owner, &identity, cached).await?;

    if synced.deployment.is_none() {
        warn!(
            registry = %name,
            "registry has no Deployment yet; leaving it to the registry controller"
        );
    }

    Ok(RefreshOutcome::Refreshed {
        version: synced.version,
        published: synced.published,
        rolled: synced.rolled,
    })
}

/// Translate a watcher event and handle it
async fn handle_watch_event(ctx: &Context, event: Result<Event<Secret>, watcher::Error>) {
    let (event_type, secret) = match event {
        Ok(Event::InitApply(secret)) => (SecretEventType::Added, secret),
        Ok(Event::Apply(secret)) => (SecretEventType::Modified, secret),
        Ok(Event::Delete(secret)) => (SecretEventType::Deleted, secret),
        Ok(Event::Init) | Ok(Event::InitDone) => {
            debug!("Secret watcher (re)listing");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Secret watcher error, will retry");
            tokio::time::sleep(Duration::from_secs(5)).await;
            return;
        }
    };

    if let Err(e) = handle_secret_change(ctx, event_type, &secret).await {
        warn!(
            secret = %secret.name_any(),
            error = %e,
            retryable = e.is_retryable(),
            "failed to handle Secret change; the periodic resync will retry"
        );
    }
}

/// Watch the cluster's Secrets until the stream ends
pub async fn run_secret_watcher(client: Client, ctx: Arc<Context>) {
    let api: Api<Secret> = Api::namespaced(client, &ctx.config.namespace);
    let selector = format!("{}={}", STRIMZI_CLUSTER_LABEL, ctx.config.cluster_name);
    let watcher = watcher::watcher(api, watcher::Config::default().labels(&selector));
    let mut watcher = std::pin::pin!(watcher);

    info!(
        namespace = %ctx.config.namespace,
        selector = %selector,
        "Secret watcher started"
    );

    while let Some(event) = watcher.next().await {
        handle_watch_event(&ctx, event).await;
    }

    warn!("Secret watcher stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use ssr_common::crd::{StrimziSchemaRegistry, StrimziSchemaRegistrySpec};
    use ssr_common::{CA_VERSION_ANNOTATION, CLIENT_VERSION_ANNOTATION, JKS_VERSION_ANNOTATION};

    use crate::keystore::runner::MockCommandRunner;
    use crate::keystore::tests::fake_tools_counted;
    use crate::kube_client::MockRegistryKubeClient;
    use crate::source::tests::{client_secret, cluster_ca_secret};

    fn registry_named(name: &str) -> StrimziSchemaRegistry {
        let mut registry = StrimziSchemaRegistry::new(name, StrimziSchemaRegistrySpec::default());
        registry.metadata.namespace = Some("events".to_string());
        registry.metadata.uid = Some(format!("uid-{name}"));
        registry
    }

    fn jks_secret(name: &str, ca_version: &str, client_version: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("events".to_string()),
                resource_version: Some("8000".to_string()),
                annotations: Some(BTreeMap::from([
                    (CA_VERSION_ANNOTATION.to_string(), ca_version.to_string()),
                    (
                        CLIENT_VERSION_ANNOTATION.to_string(),
                        client_version.to_string(),
                    ),
                ])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn deployment_on(version: &str) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(BTreeMap::from([(
                            JKS_VERSION_ANNOTATION.to_string(),
                            version.to_string(),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn unrelated_secret(labels: Option<(&str, &str)>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("some-other-secret".to_string()),
                namespace: Some("events".to_string()),
                labels: labels.map(|(k, v)| BTreeMap::from([(k.to_string(), v.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Deployment patches captured per Deployment name
    type Patches = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// Kube mock where every registry's sources sit at CA "100" and client
    /// "200" and its JKS Secret was built from CA "100" and client "200".
    ///
    /// The cluster CA Secret may only be read when `ca_readable` is set.
    fn cluster(ca_readable: bool) -> (MockRegistryKubeClient, Patches) {
        let patches: Patches = Arc::new(Mutex::new(Vec::new()));
        let mut mock = MockRegistryKubeClient::new();

        mock.expect_get_registry()
            .returning(|_, name| Ok(Some(registry_named(name))));
        mock.expect_get_secret().returning(move |_, name| match name {
            "events-cluster-ca-cert" if ca_readable => Ok(Some(cluster_ca_secret("100"))),
            "events-cluster-ca-cert" => panic!("cluster CA should come from the event"),
            jks if jks.ends_with("-jks") => Ok(Some(jks_secret(jks, "100", "200"))),
            client => Ok(Some(client_secret(client, "200"))),
        });
        mock.expect_delete_secret().returning(|_, _| Ok(()));
        mock.expect_create_secret().returning(|_, secret| {
            let mut stored = secret.clone();
            stored.metadata.resource_version = Some("9001".to_string());
            Ok(stored)
        });
        mock.expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment_on("8000"))));
        let capture = patches.clone();
        mock.expect_patch_deployment()
            .returning(move |_, name, patch| {
                capture
                    .lock()
                    .unwrap()
                    .push((name.to_string(), patch.clone()));
                Ok(())
            });

        (mock, patches)
    }

    fn config() -> OperatorConfig {
        Context::for_testing(
            Arc::new(MockRegistryKubeClient::new()),
            Arc::new(MockCommandRunner::new()),
        )
        .config
    }

    #[test]
    fn deletions_are_ignored() {
        let registries = RegistryNames::new();
        assert_eq!(
            classify(
                &config(),
                &registries,
                SecretEventType::Deleted,
                &cluster_ca_secret("100")
            ),
            SecretDispatch::Ignored
        );
    }

    #[test]
    fn secrets_of_other_clusters_are_ignored() {
        let registries = RegistryNames::new();
        registries.insert("some-other-secret");

        for labels in [None, Some((STRIMZI_CLUSTER_LABEL, "alert-broker"))] {
            assert_eq!(
                classify(
                    &config(),
                    &registries,
                    SecretEventType::Modified,
                    &unrelated_secret(labels)
                ),
                SecretDispatch::Ignored
            );
        }
    }

    #[test]
    fn dispatch_by_secret_name() {
        let registries = RegistryNames::new();
        registries.insert("registry");

        assert_eq!(
            classify(
                &config(),
                &registries,
                SecretEventType::Added,
                &cluster_ca_secret("100")
            ),
            SecretDispatch::ClusterCa
        );
        assert_eq!(
            classify(
                &config(),
                &registries,
                SecretEventType::Modified,
                &client_secret("registry", "200")
            ),
            SecretDispatch::Client("registry".to_string())
        );
        assert_eq!(
            classify(
                &config(),
                &registries,
                SecretEventType::Modified,
                &unrelated_secret(Some((STRIMZI_CLUSTER_LABEL, "events")))
            ),
            SecretDispatch::Ignored
        );
    }

    #[tokio::test]
    async fn untracked_secret_touches_nothing() {
        let ctx = Context::for_testing(
            Arc::new(MockRegistryKubeClient::new()),
            Arc::new(MockCommandRunner::new()),
        );
        let dispatch = handle_secret_change(
            &ctx,
            SecretEventType::Modified,
            &unrelated_secret(Some((STRIMZI_CLUSTER_LABEL, "events"))),
        )
        .await
        .unwrap();
        assert_eq!(dispatch, SecretDispatch::Ignored);
    }

    /// Story: Strimzi renews the cluster CA
    ///
    /// Every tracked registry gets a new JKS Secret built from the CA in the
    /// event, and every Deployment is stamped with the new version.
    #[tokio::test]
    async fn story_cluster_ca_rotation_refreshes_every_registry() {
        let (kube, patches) = cluster(false);
        let (tools, invocations) = fake_tools_counted();
        let ctx = Context::for_testing(Arc::new(kube), Arc::new(tools));
        ctx.registries.insert("registry-a");
        ctx.registries.insert("registry-b");

        let dispatch =
            handle_secret_change(&ctx, SecretEventType::Modified, &cluster_ca_secret("101"))
                .await
                .unwrap();
        assert_eq!(dispatch, SecretDispatch::ClusterCa);

        assert_eq!(invocations.load(Ordering::SeqCst), 6);
        let patches = patches.lock().unwrap();
        let names: Vec<&str> = patches.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["registry-a", "registry-b"]);
        for (_, patch) in patches.iter() {
            assert_eq!(
                patch["spec"]["template"]["metadata"]["annotations"][JKS_VERSION_ANNOTATION],
                "9001"
            );
        }
    }

    /// Story: Strimzi renews one KafkaUser's certificate
    #[tokio::test]
    async fn story_client_rotation_refreshes_one_registry() {
        let (kube, patches) = cluster(true);
        let (tools, invocations) = fake_tools_counted();
        let ctx = Context::for_testing(Arc::new(kube), Arc::new(tools));
        ctx.registries.insert("registry-a");
        ctx.registries.insert("registry-b");

        let dispatch = handle_secret_change(
            &ctx,
            SecretEventType::Modified,
            &client_secret("registry-b", "201"),
        )
        .await
        .unwrap();
        assert_eq!(dispatch, SecretDispatch::Client("registry-b".to_string()));

        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        let patches = patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, "registry-b");
    }

    /// Story: the watcher's initial listing replays unchanged Secrets
    ///
    /// Nothing is rebuilt and no Deployment is touched.
    #[tokio::test]
    async fn story_replayed_secret_is_a_noop() {
        let mut kube = MockRegistryKubeClient::new();
        kube.expect_get_registry()
            .returning(|_, name| Ok(Some(registry_named(name))));
        kube.expect_get_secret().returning(|_, name| match name {
            "events-cluster-ca-cert" => Ok(Some(cluster_ca_secret("100"))),
            "registry-jks" => Ok(Some(jks_secret(name, "100", "200"))),
            other => panic!("unexpected Secret read {other}"),
        });
        kube.expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment_on("8000"))));
        kube.expect_create_secret().never();
        kube.expect_patch_deployment().never();

        let mut tools = MockCommandRunner::new();
        tools.expect_run().never();
        let ctx = Context::for_testing(Arc::new(kube), Arc::new(tools));
        ctx.registries.insert("registry");

        let outcome = refresh_with_new_client_secret(
            &ctx,
            "events",
            "registry",
            &client_secret("registry", "200"),
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Refreshed {
                version: "8000".to_string(),
                published: false,
                rolled: false,
            }
        );
    }

    /// Story: a registry was deleted while the operator still tracked it
    #[tokio::test]
    async fn story_deleted_registry_is_forgotten() {
        let mut kube = MockRegistryKubeClient::new();
        kube.expect_get_registry().returning(|_, _| Ok(None));
        kube.expect_get_secret().never();
        let ctx = Context::for_testing(Arc::new(kube), Arc::new(MockCommandRunner::new()));
        ctx.registries.insert("registry");

        let outcome = refresh_with_new_client_secret(
            &ctx,
            "events",
            "registry",
            &client_secret("registry", "201"),
        )
        .await
        .unwrap();
        assert_eq!(outcome, RefreshOutcome::Forgotten);
        assert!(!ctx.registries.contains("registry"));
        assert!(!ctx.locks.contains("registry"));
    }

    #[tokio::test]
    async fn one_failing_registry_does_not_block_the_rest() {
        let patches: Patches = Arc::new(Mutex::new(Vec::new()));
        let mut kube = MockRegistryKubeClient::new();
        kube.expect_get_registry().returning(|_, name| match name {
            "registry-a" => Err(Error::internal("apiserver unavailable")),
            other => Ok(Some(registry_named(other))),
        });
        kube.expect_get_secret().returning(|_, name| match name {
            "registry-b-jks" => Ok(Some(jks_secret(name, "100", "200"))),
            "registry-b" => Ok(Some(client_secret(name, "200"))),
            other => panic!("unexpected Secret read {other}"),
        });
        kube.expect_delete_secret().returning(|_, _| Ok(()));
        kube.expect_create_secret().returning(|_, secret| {
            let mut stored = secret.clone();
            stored.metadata.resource_version = Some("9001".to_string());
            Ok(stored)
        });
        kube.expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment_on("8000"))));
        let capture = patches.clone();
        kube.expect_patch_deployment()
            .returning(move |_, name, patch| {
                capture
                    .lock()
                    .unwrap()
                    .push((name.to_string(), patch.clone()));
                Ok(())
            });

        let (tools, _) = fake_tools_counted();
        let ctx = Context::for_testing(Arc::new(kube), Arc::new(tools));
        ctx.registries.insert("registry-a");
        ctx.registries.insert("registry-b");

        let err = refresh_with_new_cluster_ca(&ctx, "events", &cluster_ca_secret("101"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));

        let patches = patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, "registry-b");
        assert!(ctx.registries.contains("registry-a"));
    }
}
