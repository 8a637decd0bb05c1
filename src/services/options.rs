//! Typed access to per-partition options.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::settings::{EngineSettings, SETTINGS_OPTION};
use crate::models::snippet::Partition;
use crate::services::store::SnippetStore;

/// Network option: ids of network snippets visible to sites.
pub const SHARED_NETWORK_SNIPPETS: &str = "shared_network_snippets";

/// Site option: ids of shared network snippets the site has activated.
pub const ACTIVE_SHARED_NETWORK_SNIPPETS: &str = "active_shared_network_snippets";

/// Read an option, falling back to the type's default when unset or malformed.
pub async fn load<S, T>(store: &S, partition: Partition, name: &str) -> Result<T, AppError>
where
    S: SnippetStore,
    T: DeserializeOwned + Default,
{
    match store.get_option(partition, name).await? {
        Some(value) => Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, option = name, "Malformed option value, using default");
            T::default()
        })),
        None => Ok(T::default()),
    }
}

pub async fn save<S, T>(store: &S, partition: Partition, name: &str, value: &T) -> Result<(), AppError>
where
    S: SnippetStore,
    T: Serialize,
{
    let value = serde_json::to_value(value)?;
    store.set_option(partition, name, &value).await
}

pub async fn shared_network_ids<S: SnippetStore>(store: &S) -> Result<BTreeSet<i64>, AppError> {
    load(store, Partition::Network, SHARED_NETWORK_SNIPPETS).await
}

pub async fn active_shared_ids<S: SnippetStore>(store: &S) -> Result<BTreeSet<i64>, AppError> {
    load(store, Partition::Site, ACTIVE_SHARED_NETWORK_SNIPPETS).await
}

/// Effective settings: the site's own settings if stored, otherwise the
/// network's when multisite, otherwise defaults.
pub async fn effective_settings<S: SnippetStore>(
    store: &S,
    multisite: bool,
) -> Result<EngineSettings, AppError> {
    if let Some(value) = store.get_option(Partition::Site, SETTINGS_OPTION).await? {
        return Ok(serde_json::from_value(value).unwrap_or_default());
    }
    if multisite {
        return load(store, Partition::Network, SETTINGS_OPTION).await;
    }
    Ok(EngineSettings::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn missing_option_loads_default() {
        let store = MemoryStore::new();
        let ids = tokio_test::block_on(shared_network_ids(&store)).unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn malformed_option_loads_default() {
        let store = MemoryStore::new();
        store
            .set_option(Partition::Site, ACTIVE_SHARED_NETWORK_SNIPPETS, &json!("nope"))
            .await
            .unwrap();
        assert!(active_shared_ids(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_fall_back_to_network_when_multisite() {
        let store = MemoryStore::new();
        save(
            &store,
            Partition::Network,
            SETTINGS_OPTION,
            &EngineSettings { minify_output: true },
        )
        .await
        .unwrap();

        assert!(effective_settings(&store, true).await.unwrap().minify_output);
        assert!(!effective_settings(&store, false).await.unwrap().minify_output);

        save(&store, Partition::Site, SETTINGS_OPTION, &EngineSettings::default())
            .await
            .unwrap();
        assert!(!effective_settings(&store, true).await.unwrap().minify_output);
    }
}
