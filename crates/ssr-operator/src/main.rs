//! Strimzi Schema Registry operator - JKS credentials and Deployments for Schema Registry

use std::sync::Arc;

use clap::Parser;
use kube::CustomResourceExt;

use ssr_common::crd::StrimziSchemaRegistry;
use ssr_common::kube_utils::create_client;
use ssr_common::telemetry::init_tracing;
use ssr_operator::config::OperatorConfig;
use ssr_operator::controller_runner::{build_registry_controller, build_secret_watcher};
use ssr_operator::startup::prime_registry_cache;
use ssr_operator::Context;

/// Deploys Confluent Schema Registry against a Strimzi Kafka cluster
#[derive(Parser, Debug)]
#[command(name = "strimzi-registry-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&StrimziSchemaRegistry::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_tracing(cli.config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    run_operator(cli.config).await
}

async fn run_operator(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        cluster = %config.cluster_name,
        namespace = %config.namespace,
        "Starting Strimzi registry operator"
    );

    let client = create_client()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let ctx = Arc::new(Context::from_client(client.clone(), config));
    prime_registry_cache(&ctx).await;

    tracing::info!("Starting controllers:");
    let controller = build_registry_controller(client.clone(), ctx.clone());
    let watcher = build_secret_watcher(client, ctx);

    tokio::select! {
        _ = controller => tracing::info!("Registry controller stopped"),
        _ = watcher => tracing::warn!("Secret watcher stopped"),
    }

    tracing::info!("Shutting down");
    Ok(())
}
