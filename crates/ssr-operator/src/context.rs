//! Shared state handed to both reconciliation entry points

use std::sync::Arc;

use kube::Client;

use crate::config::OperatorConfig;
use crate::keystore::{CommandRunner, StoreSynthesizer, TokioCommandRunner};
use crate::kube_client::{RegistryKubeClient, RegistryKubeClientImpl};
use crate::registry_cache::{IdentityLocks, RegistryNames};

/// Controller context
///
/// Shared across every reconcile of the registry controller and every
/// event of the secret watcher.
pub struct Context {
    /// Kubernetes client for API operations
    pub kube: Arc<dyn RegistryKubeClient>,
    /// JKS store builder
    pub synthesizer: StoreSynthesizer,
    /// Tracked registry names
    pub registries: RegistryNames,
    /// Per-registry reconcile locks
    pub locks: IdentityLocks,
    /// Process-wide settings
    pub config: OperatorConfig,
}

impl Context {
    /// Create a new Context with the given dependencies
    pub fn new(
        kube: Arc<dyn RegistryKubeClient>,
        runner: Arc<dyn CommandRunner>,
        registries: RegistryNames,
        config: OperatorConfig,
    ) -> Self {
        Self {
            kube,
            synthesizer: StoreSynthesizer::new(runner),
            registries,
            locks: IdentityLocks::new(),
            config,
        }
    }

    /// Create a Context from a Kubernetes client, running the real tools
    pub fn from_client(client: Client, config: OperatorConfig) -> Self {
        Self::new(
            Arc::new(RegistryKubeClientImpl::new(client)),
            Arc::new(TokioCommandRunner),
            RegistryNames::new(),
            config,
        )
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn RegistryKubeClient>, runner: Arc<dyn CommandRunner>) -> Self {
        use ssr_common::telemetry::LogFormat;

        Self::new(
            kube,
            runner,
            RegistryNames::new(),
            OperatorConfig {
                cluster_name: "events".to_string(),
                namespace: "events".to_string(),
                log_format: LogFormat::Text,
            },
        )
    }
}
