//! Rollout trigger
//!
//! The registry reads its JKS stores once at startup, so a republished store
//! only takes effect after the pods are replaced. Changing a pod template
//! annotation makes the Deployment controller do a rolling replacement under
//! its own strategy.

use k8s_openapi::api::apps::v1::Deployment;
use serde_json::{json, Value};
use tracing::info;

use ssr_common::{Error, JKS_VERSION_ANNOTATION};

use crate::kube_client::RegistryKubeClient;

/// JSON merge patch setting only the pod template's JKS version annotation
pub fn rollout_patch(token: &str) -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        JKS_VERSION_ANNOTATION: token
                    }
                }
            }
        }
    })
}

/// JKS version currently stamped on a Deployment's pod template
pub fn stamped_version(deployment: &Deployment) -> Option<&str> {
    deployment
        .spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(JKS_VERSION_ANNOTATION)
        .map(String::as_str)
}

/// Whether the Deployment still runs with a different JKS Secret version
pub fn needs_rollout(deployment: &Deployment, token: &str) -> bool {
    stamped_version(deployment) != Some(token)
}

/// Stamp `token` onto the Deployment's pod template, forcing a rollout
pub async fn stamp(
    kube: &dyn RegistryKubeClient,
    namespace: &str,
    name: &str,
    token: &str,
) -> Result<(), Error> {
    kube.patch_deployment(namespace, name, &rollout_patch(token))
        .await?;
    info!(deployment = %name, jks_version = %token, "stamped JKS version on pod template");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use crate::kube_client::MockRegistryKubeClient;

    /// RFC 7396 JSON merge patch, as the API server applies it
    fn merge(target: &mut Value, patch: &Value) {
        match patch {
            Value::Object(patch_map) => {
                if !target.is_object() {
                    *target = json!({});
                }
                let target_map = target.as_object_mut().unwrap();
                for (key, value) in patch_map {
                    if value.is_null() {
                        target_map.remove(key);
                    } else {
                        merge(target_map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
            other => *target = other.clone(),
        }
    }

    fn deployment(token: Option<&str>) -> Deployment {
        let mut annotations = BTreeMap::from([(
            "kubectl.kubernetes.io/restartedAt".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        )]);
        if let Some(token) = token {
            annotations.insert(JKS_VERSION_ANNOTATION.to_string(), token.to_string());
        }
        Deployment {
            metadata: ObjectMeta {
                name: Some("registry".to_string()),
                annotations: Some(BTreeMap::from([(
                    "deployment.kubernetes.io/revision".to_string(),
                    "3".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(annotations),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "server".to_string(),
                            image: Some("confluentinc/cp-schema-registry:8.0.0".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Story: stamping "v2" changes exactly one field of the Deployment
    ///
    /// Replica count, image, the Deployment's own annotations and every other
    /// pod template annotation must survive the patch untouched.
    #[test]
    fn story_stamp_touches_exactly_one_field() {
        let before = deployment(Some("v1"));
        let mut after = serde_json::to_value(&before).unwrap();
        merge(&mut after, &rollout_patch("v2"));
        let after: Deployment = serde_json::from_value(after).unwrap();

        assert_eq!(stamped_version(&after), Some("v2"));

        let mut expected = before.clone();
        expected
            .spec
            .as_mut()
            .unwrap()
            .template
            .metadata
            .as_mut()
            .unwrap()
            .annotations
            .as_mut()
            .unwrap()
            .insert(JKS_VERSION_ANNOTATION.to_string(), "v2".to_string());
        assert_eq!(after, expected);
    }

    #[test]
    fn patch_targets_pod_template_not_deployment_metadata() {
        let patch = rollout_patch("42");
        assert!(patch.get("metadata").is_none());
        assert_eq!(
            patch.pointer("/spec/template/metadata/annotations").unwrap(),
            &json!({ "strimziregistryoperator.roundtable.lsst.codes/jksVersion": "42" })
        );
    }

    #[test]
    fn rollout_needed_only_on_token_drift() {
        assert!(!needs_rollout(&deployment(Some("7")), "7"));
        assert!(needs_rollout(&deployment(Some("7")), "8"));
        assert!(needs_rollout(&deployment(None), "7"));
        assert!(needs_rollout(&Deployment::default(), "7"));
    }

    #[tokio::test]
    async fn stamp_sends_merge_patch() {
        let sent = Arc::new(Mutex::new(None::<Value>));
        let capture = sent.clone();

        let mut mock = MockRegistryKubeClient::new();
        mock.expect_patch_deployment()
            .times(1)
            .returning(move |ns, name, patch| {
                assert_eq!(ns, "events");
                assert_eq!(name, "registry");
                *capture.lock().unwrap() = Some(patch.clone());
                Ok(())
            });

        stamp(&mock, "events", "registry", "v2").await.unwrap();
        assert_eq!(sent.lock().unwrap().clone().unwrap(), rollout_patch("v2"));
    }
}
