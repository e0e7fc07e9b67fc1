//! Kubernetes access for the operator
//!
//! Every API call the reconciliation engine makes goes through
//! [`RegistryKubeClient`], so the engine can be exercised against a mock in
//! unit tests while production uses the kube-rs client.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use ssr_common::crd::{
    kafka_api_resource, kafka_user_api_resource, StrimziSchemaRegistry,
    StrimziSchemaRegistryStatus,
};
use ssr_common::kube_utils::{is_conflict, is_not_found};
use ssr_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes client operations for the registry operator
///
/// `get_*` methods return `Ok(None)` only for a confirmed 404; any other
/// failure is an error so callers never mistake an outage for absence.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistryKubeClient: Send + Sync {
    /// Get a Secret by name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a Secret, returning the stored object (with its resourceVersion)
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, Error>;

    /// Delete a Secret
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Get a StrimziSchemaRegistry by name
    async fn get_registry(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StrimziSchemaRegistry>, Error>;

    /// List StrimziSchemaRegistries in a namespace
    async fn list_registries(&self, namespace: &str) -> Result<Vec<StrimziSchemaRegistry>, Error>;

    /// Patch the status of a StrimziSchemaRegistry
    async fn patch_registry_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StrimziSchemaRegistryStatus,
    ) -> Result<(), Error>;

    /// Get a Strimzi KafkaUser at the given API version
    async fn get_kafka_user(
        &self,
        namespace: &str,
        version: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Get a Strimzi Kafka at the given API version
    async fn get_kafka(
        &self,
        namespace: &str,
        version: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Get a Deployment by name
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// Create a Deployment
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
        -> Result<(), Error>;

    /// Apply a JSON merge patch to a Deployment
    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Get a Service by name
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct RegistryKubeClientImpl {
    client: Client,
}

impl RegistryKubeClientImpl {
    /// Create a new RegistryKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map a kube get result to `Ok(None)` on 404
fn optional<T>(result: Result<T, kube::Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl RegistryKubeClient for RegistryKubeClientImpl {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), secret).await {
            Ok(created) => Ok(created),
            Err(e) if is_conflict(&e) => Err(Error::ConflictOnPublish {
                namespace: namespace.to_string(),
                name: secret.metadata.name.clone().unwrap_or_default(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        debug!(secret = %name, "deleted Secret");
        Ok(())
    }

    async fn get_registry(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StrimziSchemaRegistry>, Error> {
        let api: Api<StrimziSchemaRegistry> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn list_registries(&self, namespace: &str) -> Result<Vec<StrimziSchemaRegistry>, Error> {
        let api: Api<StrimziSchemaRegistry> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().timeout(60)).await?;
        Ok(list.items)
    }

    async fn patch_registry_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StrimziSchemaRegistryStatus,
    ) -> Result<(), Error> {
        let api: Api<StrimziSchemaRegistry> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }

    async fn get_kafka_user(
        &self,
        namespace: &str,
        version: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        let ar = kafka_user_api_resource(version);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        optional(api.get(name).await)
    }

    async fn get_kafka(
        &self,
        namespace: &str,
        version: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        let ar = kafka_api_resource(version);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        optional(api.get(name).await)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), deployment).await?;
        Ok(())
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), service).await?;
        Ok(())
    }
}
