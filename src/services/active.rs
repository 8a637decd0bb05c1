//! Fetch, resolve and cache the active snippets for a scope set.

use std::collections::HashSet;

use crate::errors::AppError;
use crate::models::snippet::Partition;
use crate::services::cache::SnippetCache;
use crate::services::options;
use crate::services::resolver::{self, ActiveSet, ScopeSet};
use crate::services::store::{ListFilter, SnippetStore};

/// Ids of network snippets this site runs regardless of their network-wide
/// active flag: activated by the site and still on the network shared list.
pub async fn site_shared_ids<S: SnippetStore>(store: &S) -> Result<HashSet<i64>, AppError> {
    let shared = options::shared_network_ids(store).await?;
    let activated = options::active_shared_ids(store).await?;
    Ok(activated.intersection(&shared).copied().collect())
}

/// Resolve the active set for `scopes`, using the cache when possible.
pub async fn fetch_active_snippets<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    scopes: &ScopeSet,
    multisite: bool,
) -> Result<ActiveSet, AppError> {
    if scopes.is_empty() {
        return Ok(ActiveSet::default());
    }

    if let Some(cached) = cache.get_active(scopes, multisite).await {
        return Ok(cached);
    }

    let generation = cache.generation().await;
    let filter = ListFilter::scopes(scopes.iter());
    let site = store.list(Partition::Site, &filter).await?;

    let (network, shared_ids) = if multisite {
        (
            store.list(Partition::Network, &filter).await?,
            site_shared_ids(store).await?,
        )
    } else {
        (Vec::new(), HashSet::new())
    };

    let active = resolver::resolve(scopes, site, network, &shared_ids);
    tracing::debug!(
        scopes = %scopes.cache_key(),
        site = active.site.len(),
        network = active.network.len(),
        "Resolved active snippets"
    );

    if let Some(generation) = generation {
        cache.put_active(scopes, multisite, &active, generation).await;
    }
    Ok(active)
}
