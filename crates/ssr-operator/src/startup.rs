//! Startup tasks run before the controllers start

use tracing::{error, info};

use crate::context::Context;

/// Seed the registry cache with the registries that already exist.
///
/// A failed listing is logged and startup continues: the registry controller
/// inserts each registry again on its first reconcile, so the cache fills
/// in either way. Returns the number of registries found.
pub async fn prime_registry_cache(ctx: &Context) -> usize {
    match ctx.kube.list_registries(&ctx.config.namespace).await {
        Ok(registries) => {
            ctx.registries.prime(&registries);
            info!(
                namespace = %ctx.config.namespace,
                registries = ?ctx.registries.names(),
                "primed registry cache"
            );
            registries.len()
        }
        Err(e) => {
            error!(
                namespace = %ctx.config.namespace,
                error = %e,
                "failed to list registries; starting with an empty cache"
            );
            0
        }
    }
}
