//! Redis-backed cache of resolved active sets.
//!
//! Every cached key is also recorded in a per-scope index set so that a
//! change to one scope drops exactly the cached sets that include it.
//! Invalidation also bumps a generation counter, and a resolved set is only
//! stored if the generation it was read under is still current.
//! Redis failures are logged and behave like a cache miss.

use redis::aio::MultiplexedConnection;

use crate::models::scope::Scope;
use crate::services::resolver::{ActiveSet, ScopeSet};

const KEY_PREFIX: &str = "snippetd:active";

const GENERATION_KEY: &str = "snippetd:active:generation";

/// KEYS: generation, active key, index keys... ARGV: expected generation, body, ttl.
const PUT_IF_CURRENT: &str = r#"
if (redis.call('GET', KEYS[1]) or '0') ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
for i = 3, #KEYS do
    redis.call('SADD', KEYS[i], KEYS[2])
end
return 1
"#;

#[derive(Debug, Clone)]
pub struct SnippetCache {
    client: Option<redis::Client>,
    ttl_secs: u64,
}

impl SnippetCache {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self {
            client: Some(client),
            ttl_secs,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            client: None,
            ttl_secs: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Key for a resolved set. Multisite results differ from single-site
    /// results for the same scopes, so the mode is part of the key.
    pub fn active_key(scopes: &ScopeSet, multisite: bool) -> String {
        let mode = if multisite { "ms" } else { "single" };
        format!("{KEY_PREFIX}:{mode}:{}", scopes.cache_key())
    }

    fn index_key(scope: Scope) -> String {
        format!("{KEY_PREFIX}:index:{}", scope.as_str())
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection failed, bypassing active-set cache");
                None
            }
        }
    }

    pub async fn get_active(&self, scopes: &ScopeSet, multisite: bool) -> Option<ActiveSet> {
        let mut conn = self.connection().await?;
        let key = Self::active_key(scopes, multisite);

        let raw: Option<String> = match redis::cmd("GET").arg(&key).query_async(&mut conn).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Active-set cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<ActiveSet>(&raw?) {
            Ok(set) => {
                tracing::debug!(key = %key, count = set.len(), "Active-set cache hit");
                Some(set)
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Discarding undecodable cached active set");
                None
            }
        }
    }

    /// Current invalidation generation. Read it before loading from the
    /// store and pass it to `put_active`. `None` when the cache is unusable.
    pub async fn generation(&self) -> Option<i64> {
        let mut conn = self.connection().await?;
        match redis::cmd("GET")
            .arg(GENERATION_KEY)
            .query_async::<Option<i64>>(&mut conn)
            .await
        {
            Ok(generation) => Some(generation.unwrap_or(0)),
            Err(e) => {
                tracing::warn!(error = %e, "Active-set generation read failed");
                None
            }
        }
    }

    /// Store a resolved set unless an invalidation happened since
    /// `generation` was read.
    pub async fn put_active(&self, scopes: &ScopeSet, multisite: bool, set: &ActiveSet, generation: i64) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let key = Self::active_key(scopes, multisite);
        let body = match serde_json::to_string(set) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode active set for cache");
                return;
            }
        };

        let mut cmd = redis::cmd("EVAL");
        cmd.arg(PUT_IF_CURRENT)
            .arg(2 + scopes.iter().count())
            .arg(GENERATION_KEY)
            .arg(&key);
        for scope in scopes.iter() {
            cmd.arg(Self::index_key(scope));
        }
        cmd.arg(generation.to_string())
            .arg(body)
            .arg(self.ttl_secs.max(1));

        match cmd.query_async::<i64>(&mut conn).await {
            Ok(0) => tracing::debug!(key = %key, generation, "Skipped caching active set resolved before an invalidation"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, key = %key, "Active-set cache write failed"),
        }
    }

    /// Drop every cached set whose scope set includes any of `scopes`.
    pub async fn invalidate(&self, scopes: &[Scope]) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        if let Err(e) = redis::cmd("INCR")
            .arg(GENERATION_KEY)
            .query_async::<i64>(&mut conn)
            .await
        {
            tracing::warn!(error = %e, "Active-set generation bump failed");
        }

        for scope in scopes {
            let index = Self::index_key(*scope);
            let keys: Vec<String> = match redis::cmd("SMEMBERS")
                .arg(&index)
                .query_async(&mut conn)
                .await
            {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(error = %e, scope = %scope, "Active-set index read failed");
                    continue;
                }
            };

            let mut del = redis::cmd("DEL");
            del.arg(&index);
            for key in &keys {
                del.arg(key);
            }
            match del.query_async::<i64>(&mut conn).await {
                Ok(_) => {
                    tracing::debug!(scope = %scope, dropped = keys.len(), "Invalidated active-set cache")
                }
                Err(e) => tracing::warn!(error = %e, scope = %scope, "Active-set cache invalidation failed"),
            }
        }
    }

    pub async fn invalidate_all(&self) {
        self.invalidate(&Scope::ALL).await;
    }

    /// Round-trip a PING. `None` when the cache is disabled.
    pub async fn ping(&self) -> Option<Result<(), redis::RedisError>> {
        let client = self.client.as_ref()?;
        let result = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok(())
        }
        .await;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_key_includes_mode_and_canonical_scopes() {
        let scopes = ScopeSet::new([Scope::SiteCss, Scope::AdminCss]);
        assert_eq!(
            SnippetCache::active_key(&scopes, false),
            "snippetd:active:single:admin-css,site-css"
        );
        assert_ne!(
            SnippetCache::active_key(&scopes, true),
            SnippetCache::active_key(&scopes, false)
        );
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = SnippetCache::disabled();
        let scopes = ScopeSet::new([Scope::Global]);
        cache.put_active(&scopes, false, &ActiveSet::default(), 0).await;
        assert!(cache.get_active(&scopes, false).await.is_none());
        assert!(cache.generation().await.is_none());
        cache.invalidate_all().await;
        assert!(!cache.is_enabled());
    }

    fn test_cache() -> SnippetCache {
        let url = std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/15".into());
        SnippetCache::new(redis::Client::open(url).unwrap(), 60)
    }

    #[tokio::test]
    #[ignore = "requires a Redis instance at TEST_REDIS_URL"]
    async fn set_resolved_before_invalidation_is_not_stored() {
        let cache = test_cache();
        let scopes = ScopeSet::new([Scope::SiteCss, Scope::Global]);
        cache.invalidate_all().await;

        let stale = cache.generation().await.unwrap();
        cache.invalidate(&[Scope::SiteCss]).await;
        cache.put_active(&scopes, false, &ActiveSet::default(), stale).await;
        assert!(cache.get_active(&scopes, false).await.is_none());

        let fresh = cache.generation().await.unwrap();
        assert!(fresh > stale);
        cache.put_active(&scopes, false, &ActiveSet::default(), fresh).await;
        assert!(cache.get_active(&scopes, false).await.is_some());

        cache.invalidate(&[Scope::Global]).await;
        assert!(cache.get_active(&scopes, false).await.is_none());
    }
}
