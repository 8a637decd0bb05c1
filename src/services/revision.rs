//! Asset revision counters used as cache-busting version tokens.
//!
//! Each partition keeps one counter per asset bucket. Counters only ever
//! grow, so a bumped bundle always gets a URL no downstream cache has seen.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::scope::{AssetBucket, UnknownScope};
use crate::models::snippet::Partition;
use crate::services::options;
use crate::services::store::SnippetStore;

pub const ASSET_REVISIONS: &str = "asset_revisions";

/// What a bump applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpTarget {
    Bucket(AssetBucket),
    /// Every bucket that already has a counter.
    All,
}

impl FromStr for BumpTarget {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(BumpTarget::All)
        } else {
            s.parse::<AssetBucket>().map(BumpTarget::Bucket)
        }
    }
}

/// Counters for one partition, keyed by bucket name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revisions(BTreeMap<String, i64>);

impl Revisions {
    pub fn get(&self, bucket: AssetBucket) -> i64 {
        self.0.get(bucket.as_str()).copied().unwrap_or(0)
    }

    /// `All` increments existing counters by one; a named bucket starts at 1.
    pub fn bump(&mut self, target: BumpTarget) {
        match target {
            BumpTarget::All => {
                for value in self.0.values_mut() {
                    *value += 1;
                }
            }
            BumpTarget::Bucket(bucket) => {
                *self.0.entry(bucket.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }
}

pub async fn load<S: SnippetStore>(store: &S, partition: Partition) -> Result<Revisions, AppError> {
    options::load(store, partition, ASSET_REVISIONS).await
}

/// Bump counters in one partition and persist them. Concurrent bumps are
/// serialized by the store.
pub async fn bump<S: SnippetStore>(
    store: &S,
    target: BumpTarget,
    partition: Partition,
) -> Result<Revisions, AppError> {
    let stored = store
        .update_option(partition, ASSET_REVISIONS, |current| {
            let mut revisions: Revisions = match current {
                Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Malformed asset revisions, starting over");
                    Revisions::default()
                }),
                None => Revisions::default(),
            };
            revisions.bump(target);
            Ok(serde_json::to_value(&revisions)?)
        })
        .await?;
    tracing::debug!(?target, partition = partition.as_str(), "Bumped asset revision");
    Ok(serde_json::from_value(stored)?)
}

/// Version token for a bucket: site counter plus, when multisite, the
/// network counter.
pub async fn current<S: SnippetStore>(
    store: &S,
    bucket: AssetBucket,
    multisite: bool,
) -> Result<i64, AppError> {
    let mut revision = load(store, Partition::Site).await?.get(bucket);
    if multisite {
        revision += load(store, Partition::Network).await?.get(bucket);
    }
    Ok(revision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn bump_all_increments_existing_buckets_only() {
        let mut revisions = Revisions::default();
        revisions.bump(BumpTarget::Bucket(AssetBucket::SiteCss));
        revisions.bump(BumpTarget::Bucket(AssetBucket::SiteCss));
        revisions.bump(BumpTarget::Bucket(AssetBucket::AdminCss));

        revisions.bump(BumpTarget::All);

        assert_eq!(revisions.get(AssetBucket::SiteCss), 3);
        assert_eq!(revisions.get(AssetBucket::AdminCss), 2);
        assert_eq!(revisions.get(AssetBucket::SiteHeadJs), 0);
    }

    #[test]
    fn bump_target_parsing() {
        assert_eq!("all".parse::<BumpTarget>().unwrap(), BumpTarget::All);
        assert_eq!(
            "site-head-js".parse::<BumpTarget>().unwrap(),
            BumpTarget::Bucket(AssetBucket::SiteHeadJs)
        );
        assert!("global".parse::<BumpTarget>().is_err());
    }

    #[tokio::test]
    async fn current_sums_partitions_when_multisite() {
        let store = MemoryStore::new();
        bump(&store, BumpTarget::Bucket(AssetBucket::SiteCss), Partition::Site)
            .await
            .unwrap();
        bump(&store, BumpTarget::Bucket(AssetBucket::SiteCss), Partition::Network)
            .await
            .unwrap();

        let before = current(&store, AssetBucket::SiteCss, true).await.unwrap();
        assert_eq!(before, 2);
        assert_eq!(current(&store, AssetBucket::SiteCss, false).await.unwrap(), 1);

        bump(&store, BumpTarget::All, Partition::Site).await.unwrap();
        assert_eq!(current(&store, AssetBucket::SiteCss, true).await.unwrap(), before + 1);

        bump(&store, BumpTarget::All, Partition::Network).await.unwrap();
        assert_eq!(current(&store, AssetBucket::SiteCss, true).await.unwrap(), before + 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bumps_of_different_buckets_are_all_kept() {
        let store = Arc::new(MemoryStore::new());
        let buckets = [AssetBucket::SiteCss, AssetBucket::AdminCss, AssetBucket::SiteHeadJs];

        let mut handles = Vec::new();
        for round in 0..30 {
            let store = Arc::clone(&store);
            let bucket = buckets[round % buckets.len()];
            handles.push(tokio::spawn(async move {
                bump(store.as_ref(), BumpTarget::Bucket(bucket), Partition::Site)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let revisions = load(store.as_ref(), Partition::Site).await.unwrap();
        for bucket in buckets {
            assert_eq!(revisions.get(bucket), 10);
        }
    }
}
