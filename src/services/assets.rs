//! css/js bundle emission.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::AppError;
use crate::models::scope::AssetBucket;
use crate::services::active;
use crate::services::cache::SnippetCache;
use crate::services::minify;
use crate::services::options;
use crate::services::resolver::{ActiveSet, ScopeSet};
use crate::services::revision;
use crate::services::store::SnippetStore;

/// Bundles are versioned by URL, so they can be cached for a year.
pub const ASSET_MAX_AGE_SECS: i64 = 31_536_000;

/// Separator placed between snippets in a bundle.
pub const BUNDLE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Serialize)]
pub struct AssetBundle {
    pub bucket: AssetBucket,
    pub body: String,
    pub revision: i64,
    pub minified: bool,
}

impl AssetBundle {
    pub fn content_type(&self) -> &'static str {
        self.bucket.content_type()
    }

    pub fn cache_control(&self) -> String {
        format!("public, max-age={ASSET_MAX_AGE_SECS}")
    }

    /// `Expires` header value one max-age after `now`.
    pub fn expires(&self, now: DateTime<Utc>) -> String {
        (now + Duration::seconds(ASSET_MAX_AGE_SECS))
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }

    pub fn etag(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.body.as_bytes());
        format!("\"{}\"", hex::encode(&hasher.finalize()[..16]))
    }
}

/// Join the code of every snippet in resolved order.
pub fn concatenate(active: &ActiveSet) -> String {
    active
        .iter()
        .map(|(_, snippet)| snippet.code.as_str())
        .collect::<Vec<_>>()
        .join(BUNDLE_SEPARATOR)
}

pub async fn build_bundle<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    bucket: AssetBucket,
    multisite: bool,
) -> Result<AssetBundle, AppError> {
    let scopes = ScopeSet::new([bucket.scope()]);
    let active = active::fetch_active_snippets(store, cache, &scopes, multisite).await?;
    let settings = options::effective_settings(store, multisite).await?;

    let mut body = concatenate(&active);
    if settings.minify_output {
        body = minify::minify(&body, bucket.code_type());
    }

    let revision = revision::current(store, bucket, multisite).await?;
    tracing::debug!(
        bucket = bucket.as_str(),
        snippets = active.len(),
        revision,
        bytes = body.len(),
        "Built asset bundle"
    );

    Ok(AssetBundle {
        bucket,
        body,
        revision,
        minified: settings.minify_output,
    })
}

/// One line of the asset manifest.
#[derive(Debug, Clone, Serialize)]
pub struct AssetLink {
    pub bucket: AssetBucket,
    pub revision: i64,
    pub url: String,
}

pub fn asset_url(bucket: AssetBucket, revision: i64) -> String {
    format!("/assets/{}?ver={revision}", bucket.file_name())
}

pub async fn manifest<S: SnippetStore>(store: &S, multisite: bool) -> Result<Vec<AssetLink>, AppError> {
    let mut links = Vec::with_capacity(AssetBucket::ALL.len());
    for bucket in AssetBucket::ALL {
        let revision = revision::current(store, bucket, multisite).await?;
        links.push(AssetLink {
            bucket,
            revision,
            url: asset_url(bucket, revision),
        });
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scope::Scope;
    use crate::models::snippet::{Partition, Snippet};
    use chrono::TimeZone;

    fn css(id: i64, priority: i32, code: &str) -> Snippet {
        let mut s = Snippet::new(Partition::Site);
        s.id = id;
        s.priority = priority;
        s.scope = Scope::SiteCss;
        s.active = true;
        s.code = code.to_string();
        s
    }

    #[test]
    fn concatenates_with_blank_line() {
        let active = ActiveSet {
            network: vec![],
            site: vec![css(2, 10, "a{}"), css(5, 20, "b{}")],
        };
        assert_eq!(concatenate(&active), "a{}\n\nb{}");
    }

    #[test]
    fn expires_one_year_ahead() {
        let bundle = AssetBundle {
            bucket: AssetBucket::SiteCss,
            body: String::new(),
            revision: 0,
            minified: false,
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(bundle.expires(now), "Sun, 01 Mar 2026 12:00:00 GMT");
        assert_eq!(bundle.cache_control(), "public, max-age=31536000");
        assert_eq!(bundle.content_type(), "text/css; charset=utf-8");
    }

    #[test]
    fn etag_tracks_body() {
        let mut bundle = AssetBundle {
            bucket: AssetBucket::SiteHeadJs,
            body: "a".to_string(),
            revision: 1,
            minified: false,
        };
        let first = bundle.etag();
        bundle.body.push('b');
        assert_ne!(first, bundle.etag());
        assert!(first.starts_with('"') && first.ends_with('"'));
    }

    #[test]
    fn asset_urls_carry_revision() {
        assert_eq!(asset_url(AssetBucket::SiteFooterJs, 7), "/assets/site-footer-js.js?ver=7");
    }
}
