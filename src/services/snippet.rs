//! Snippet management: CRUD, activation, cloning, bulk actions and the
//! network shared list.
//!
//! Every mutation invalidates the cached active sets for the scopes it
//! touched and bumps the asset revision of any css/js bucket involved.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::scope::Scope;
use crate::models::snippet::{FieldUpdate, Partition, Snippet, SnippetInput};
use crate::services::cache::SnippetCache;
use crate::services::options::{self, ACTIVE_SHARED_NETWORK_SNIPPETS, SHARED_NETWORK_SNIPPETS};
use crate::services::revision::{self, BumpTarget};
use crate::services::store::{ListFilter, SnippetStore};

/// Suffix appended to the name of a cloned snippet.
const CLONE_SUFFIX: &str = " [CLONE]";

/// Filters for listing snippets.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SnippetFilters {
    pub scope: Option<String>,
    pub tag: Option<String>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

/// A saved snippet plus the input fields whose values were rejected and
/// left unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct SavedSnippet {
    pub snippet: Snippet,
    pub rejected_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BulkActionKind {
    Activate,
    Deactivate,
    Delete,
    Clone,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkAction {
    pub action: BulkActionKind,
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub action: BulkActionKind,
    pub succeeded: Vec<i64>,
    pub failed: Vec<BulkFailure>,
}

/// A network snippet on the shared list, as seen from the site.
#[derive(Debug, Clone, Serialize)]
pub struct SharedSnippet {
    #[serde(flatten)]
    pub snippet: Snippet,
    pub active_on_site: bool,
}

/// Invalidate caches and bump revisions after snippets with `scopes` changed
/// in `partition`.
pub async fn after_change<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    partition: Partition,
    scopes: &[Scope],
) -> Result<(), AppError> {
    cache.invalidate(scopes).await;

    let buckets: BTreeSet<_> = scopes.iter().filter_map(|s| s.asset_bucket()).collect();
    for bucket in buckets {
        revision::bump(store, BumpTarget::Bucket(bucket), partition).await?;
    }
    Ok(())
}

async fn mark_shared<S: SnippetStore>(store: &S, snippets: &mut [Snippet]) -> Result<(), AppError> {
    if !snippets.iter().any(|s| s.network) {
        return Ok(());
    }
    let shared = options::shared_network_ids(store).await?;
    for snippet in snippets.iter_mut().filter(|s| s.network) {
        snippet.shared_network = shared.contains(&snippet.id);
    }
    Ok(())
}

fn matches_filters(snippet: &Snippet, filters: &SnippetFilters) -> bool {
    if let Some(tag) = filters.tag.as_deref() {
        if !snippet.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }
    }
    if let Some(search) = filters.search.as_deref() {
        let needle = search.to_lowercase();
        let haystacks = [&snippet.name, &snippet.description, &snippet.code];
        if !haystacks.iter().any(|h| h.to_lowercase().contains(&needle)) {
            return false;
        }
    }
    true
}

/// List snippets in a partition with filters and pagination.
pub async fn list<S: SnippetStore>(
    store: &S,
    partition: Partition,
    filters: &SnippetFilters,
    pagination: &Pagination,
) -> Result<PagedResult<Snippet>, AppError> {
    let scopes = match filters.scope.as_deref() {
        Some(raw) => Some(vec![raw
            .parse::<Scope>()
            .map_err(|e| AppError::Validation(e.to_string()))?]),
        None => None,
    };
    let filter = ListFilter {
        scopes,
        active: filters.active,
    };

    let mut snippets: Vec<Snippet> = store
        .list(partition, &filter)
        .await?
        .into_iter()
        .filter(|s| matches_filters(s, filters))
        .collect();
    mark_shared(store, &mut snippets).await?;

    Ok(pagination.paginate(snippets))
}

/// Find a snippet by id.
pub async fn find_by_id<S: SnippetStore>(
    store: &S,
    id: i64,
    partition: Partition,
) -> Result<Snippet, AppError> {
    let snippet = store
        .get(id, partition)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Snippet {id} not found")))?;
    let mut one = [snippet];
    mark_shared(store, &mut one).await?;
    let [snippet] = one;
    Ok(snippet)
}

/// Create a snippet from input fields.
pub async fn create<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    partition: Partition,
    input: &SnippetInput,
) -> Result<SavedSnippet, AppError> {
    let mut snippet = Snippet::new(partition);
    let rejected_fields = snippet.apply_fields(&input.to_fields());

    let id = store.save(&snippet).await?;
    tracing::info!(id, partition = partition.as_str(), scope = %snippet.scope, "Created snippet");

    after_change(store, cache, partition, &[snippet.scope]).await?;
    Ok(SavedSnippet {
        snippet: find_by_id(store, id, partition).await?,
        rejected_fields,
    })
}

/// Update a snippet's fields. Rejected fields keep their stored values.
pub async fn update<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    id: i64,
    partition: Partition,
    input: &SnippetInput,
) -> Result<SavedSnippet, AppError> {
    let mut snippet = find_by_id(store, id, partition).await?;
    let previous_scope = snippet.scope;
    let rejected_fields = snippet.apply_fields(&input.to_fields());

    store.save(&snippet).await?;
    tracing::info!(id, partition = partition.as_str(), "Updated snippet");

    after_change(store, cache, partition, &[previous_scope, snippet.scope]).await?;
    Ok(SavedSnippet {
        snippet: find_by_id(store, id, partition).await?,
        rejected_fields,
    })
}

/// Delete a snippet.
pub async fn delete<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    id: i64,
    partition: Partition,
) -> Result<(), AppError> {
    let snippet = find_by_id(store, id, partition).await?;
    store.delete(id, partition).await?;
    tracing::info!(id, partition = partition.as_str(), "Deleted snippet");

    if partition.is_network() {
        remove_from_shared_lists(store, id).await?;
    }

    after_change(store, cache, partition, &[snippet.scope]).await
}

/// Activate or deactivate a snippet.
pub async fn set_active<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    id: i64,
    partition: Partition,
    active: bool,
) -> Result<Snippet, AppError> {
    let snippet = find_by_id(store, id, partition).await?;
    let update = FieldUpdate {
        active: Some(active),
        priority: None,
    };
    if !store.update_fields(id, partition, &update).await? {
        return Err(AppError::NotFound(format!("Snippet {id} not found")));
    }
    tracing::info!(id, partition = partition.as_str(), active, "Changed snippet activation");

    after_change(store, cache, partition, &[snippet.scope]).await?;
    find_by_id(store, id, partition).await
}

/// Copy a snippet into a new, inactive record.
pub async fn clone_snippet<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    id: i64,
    partition: Partition,
) -> Result<Snippet, AppError> {
    let source = find_by_id(store, id, partition).await?;

    let mut copy = source.clone();
    copy.id = 0;
    copy.name = format!("{}{CLONE_SUFFIX}", source.name);
    copy.active = false;
    copy.shared_network = false;
    copy.created = None;
    copy.modified = None;

    let new_id = store.save(&copy).await?;
    tracing::info!(source = id, id = new_id, partition = partition.as_str(), "Cloned snippet");

    after_change(store, cache, partition, &[copy.scope]).await?;
    find_by_id(store, new_id, partition).await
}

/// Apply one action to many snippets. Failures are collected, not fatal.
pub async fn bulk<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    partition: Partition,
    request: &BulkAction,
) -> Result<BulkResult, AppError> {
    let mut result = BulkResult {
        action: request.action,
        succeeded: Vec::new(),
        failed: Vec::new(),
    };

    let mut seen = HashSet::new();
    for &id in request.ids.iter().filter(|id| seen.insert(**id)) {
        let outcome = match request.action {
            BulkActionKind::Activate => set_active(store, cache, id, partition, true).await.map(|_| id),
            BulkActionKind::Deactivate => set_active(store, cache, id, partition, false).await.map(|_| id),
            BulkActionKind::Delete => delete(store, cache, id, partition).await.map(|_| id),
            BulkActionKind::Clone => clone_snippet(store, cache, id, partition).await.map(|s| s.id),
        };
        match outcome {
            Ok(affected) => result.succeeded.push(affected),
            Err(e) => {
                tracing::warn!(id, action = ?request.action, error = %e, "Bulk action failed for snippet");
                result.failed.push(BulkFailure {
                    id,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(result)
}

async fn remove_from_shared_lists<S: SnippetStore>(store: &S, id: i64) -> Result<(), AppError> {
    let mut shared = options::shared_network_ids(store).await?;
    if shared.remove(&id) {
        options::save(store, Partition::Network, SHARED_NETWORK_SNIPPETS, &shared).await?;
    }
    let mut activated = options::active_shared_ids(store).await?;
    if activated.remove(&id) {
        options::save(store, Partition::Site, ACTIVE_SHARED_NETWORK_SNIPPETS, &activated).await?;
    }
    Ok(())
}

/// Network snippets on the shared list, with their activation state on this site.
pub async fn list_shared<S: SnippetStore>(store: &S) -> Result<Vec<SharedSnippet>, AppError> {
    let shared = options::shared_network_ids(store).await?;
    let activated = options::active_shared_ids(store).await?;

    let mut out = Vec::with_capacity(shared.len());
    for id in shared {
        match store.get(id, Partition::Network).await? {
            Some(mut snippet) => {
                snippet.shared_network = true;
                out.push(SharedSnippet {
                    active_on_site: activated.contains(&id),
                    snippet,
                });
            }
            None => tracing::warn!(id, "Shared list references a missing network snippet"),
        }
    }
    out.sort_by_key(|s| (s.snippet.priority, s.snippet.id));
    Ok(out)
}

/// Replace the network shared list. Ids must name existing network snippets.
/// Site activations of snippets no longer shared are dropped.
pub async fn set_shared<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    ids: &[i64],
) -> Result<Vec<SharedSnippet>, AppError> {
    let mut shared = BTreeSet::new();
    for &id in ids {
        if store.get(id, Partition::Network).await?.is_none() {
            return Err(AppError::Validation(format!("Network snippet {id} does not exist")));
        }
        shared.insert(id);
    }
    options::save(store, Partition::Network, SHARED_NETWORK_SNIPPETS, &shared).await?;

    let activated = options::active_shared_ids(store).await?;
    let kept: BTreeSet<i64> = activated.intersection(&shared).copied().collect();
    if kept != activated {
        options::save(store, Partition::Site, ACTIVE_SHARED_NETWORK_SNIPPETS, &kept).await?;
    }

    tracing::info!(count = shared.len(), "Updated shared network snippets");
    cache.invalidate_all().await;
    revision::bump(store, BumpTarget::All, Partition::Site).await?;

    list_shared(store).await
}

/// Activate or deactivate a shared network snippet for this site only.
pub async fn set_shared_active<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    id: i64,
    active: bool,
) -> Result<SharedSnippet, AppError> {
    let shared = options::shared_network_ids(store).await?;
    if !shared.contains(&id) {
        return Err(AppError::Validation(format!("Network snippet {id} is not shared")));
    }
    let snippet = find_by_id(store, id, Partition::Network).await?;

    let mut activated = options::active_shared_ids(store).await?;
    let changed = if active {
        activated.insert(id)
    } else {
        activated.remove(&id)
    };
    if changed {
        options::save(store, Partition::Site, ACTIVE_SHARED_NETWORK_SNIPPETS, &activated).await?;
        after_change(store, cache, Partition::Site, &[snippet.scope]).await?;
    }
    tracing::info!(id, active, "Changed shared snippet activation for site");

    Ok(SharedSnippet {
        snippet,
        active_on_site: active,
    })
}
