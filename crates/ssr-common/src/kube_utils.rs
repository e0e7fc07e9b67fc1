//! Shared Kubernetes utilities using kube-rs

use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::discovery::ApiResource;
use kube::{Client, Config, Resource, ResourceExt};

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from the in-cluster or local kubeconfig environment.
///
/// `Config::infer` tries the in-cluster service account first and falls back
/// to `~/.kube/config`, which is what local development wants.
pub async fn create_client() -> Result<Client, Error> {
    let mut config = Config::infer().await.map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
    })?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Check if a kube error is a confirmed 404 from the API server.
///
/// Only an API response counts; transport failures are never treated as
/// absence.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Check if a kube error is a 409 conflict (e.g., duplicate-name create)
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// Used for Strimzi resources whose version is chosen per registry at runtime.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    let plural = format!("{}s", kind.to_ascii_lowercase());
    ApiResource {
        group,
        version,
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural,
    }
}

/// Build a controller owner reference pointing at `owner`.
///
/// Fails when the owner has not been persisted yet (no uid), since the
/// garbage collector cannot follow a reference without one.
pub fn owner_reference<K>(owner: &K) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation_for(
            owner.name_any(),
            format!("{} has no metadata.uid; cannot own children", K::kind(&())),
        )
    })
}

/// Return the opaque resourceVersion token of an object.
pub fn resource_version(meta: &ObjectMeta) -> Option<&str> {
    meta.resource_version.as_deref()
}

/// Human-readable `Kind namespace/name` reference used in error messages
pub fn object_ref(kind: &str, meta: &ObjectMeta) -> String {
    format!(
        "{} {}/{}",
        kind,
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

/// Read a UTF-8 string out of a Secret's `data` map.
///
/// The transport base64 layer is already removed by `ByteString`; missing
/// keys and non-UTF-8 payloads are both `MalformedSource`.
pub fn secret_string(secret: &Secret, key: &str) -> Result<String, Error> {
    let object = object_ref("Secret", &secret.metadata);
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| Error::malformed(&object, format!("missing data key {}", key)))?;
    String::from_utf8(bytes.0.clone())
        .map_err(|e| Error::malformed(&object, format!("data key {} is not UTF-8: {}", key, e)))
}

/// Read a label value from object metadata
pub fn label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels.as_ref()?.get(key).map(String::as_str)
}

/// Read an annotation value from object metadata
pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref()?.get(key).map(String::as_str)
}
