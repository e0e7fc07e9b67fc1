//! Controller runner - builds the operator's long-running futures
//!
//! The registry controller and the Secret watcher share one [`Context`];
//! the caller runs both until either finishes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use ssr_common::crd::StrimziSchemaRegistry;

use crate::context::Context;
use crate::controller::{error_policy, reconcile, run_secret_watcher};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the StrimziSchemaRegistry controller future
///
/// Stops on SIGTERM/SIGINT once in-flight reconciles finish.
pub fn build_registry_controller(
    client: Client,
    ctx: Arc<Context>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let registries: Api<StrimziSchemaRegistry> =
        Api::namespaced(client, &ctx.config.namespace);

    tracing::info!(namespace = %ctx.config.namespace, "- StrimziSchemaRegistry controller");

    Box::pin(
        Controller::new(
            registries,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("StrimziSchemaRegistry")),
    )
}

/// Build the Secret watcher future
pub fn build_secret_watcher(
    client: Client,
    ctx: Arc<Context>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    tracing::info!(cluster = %ctx.config.cluster_name, "- Strimzi Secret watcher");
    Box::pin(run_secret_watcher(client, ctx))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
