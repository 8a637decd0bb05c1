//! `[code_snippet]` and `[code_snippet_source]` shortcode rendering.
//!
//! Content snippets are never emitted eagerly; each shortcode occurrence
//! renders one record on demand. Nested expansion inside a content snippet
//! runs with the `code_snippet` handler unregistered, so a snippet that
//! embeds itself cannot recurse.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::scope::{CodeType, Scope};
use crate::models::snippet::{Partition, Snippet};
use crate::services::active;
use crate::services::evaluator::{EvalMode, Evaluator};
use crate::services::formatting::{autop, escape_html};
use crate::services::store::SnippetStore;

pub const CONTENT_TAG: &str = "code_snippet";
pub const SOURCE_TAG: &str = "code_snippet_source";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"([\w-]+)\s*=\s*"([^"]*)"|([\w-]+)\s*=\s*'([^']*)'|([\w-]+)\s*=\s*([^\s'"]+)|"([^"]*)"|'([^']*)'|(\S+)"#,
        )
        .unwrap()
    })
}

fn shortcode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([A-Za-z0-9_-]+)((?:\s[^\]]*)?)\]").unwrap())
}

/// Parse shortcode attributes. Keys are lowercased; a bare word becomes a
/// flag set to `"true"`.
pub fn parse_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for caps in attribute_pattern().captures_iter(text) {
        let pair = [(1, 2), (3, 4), (5, 6)]
            .iter()
            .find_map(|&(k, v)| Some((caps.get(k)?, caps.get(v)?)));
        if let Some((key, value)) = pair {
            attrs.insert(key.as_str().to_lowercase(), value.as_str().to_string());
            continue;
        }
        if let Some(flag) = caps.get(7).or_else(|| caps.get(8)).or_else(|| caps.get(9)) {
            attrs.insert(flag.as_str().to_lowercase(), "true".to_string());
        }
    }
    attrs
}

/// Shortcode boolean semantics: anything but an explicit false-like value is true.
fn truthy(value: Option<&String>) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) => !matches!(v.as_str(), "" | "0" | "false" | "no" | "off"),
        None => false,
    }
}

fn parse_id(attrs: &BTreeMap<String, String>) -> Result<i64, AppError> {
    attrs
        .get("id")
        .and_then(|id| id.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Validation("Shortcode requires a positive 'id' attribute".to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentAtts {
    pub id: i64,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub php: bool,
    #[serde(default)]
    pub format: bool,
    #[serde(default)]
    pub shortcodes: bool,
}

impl ContentAtts {
    pub fn from_attrs(attrs: &BTreeMap<String, String>) -> Result<Self, AppError> {
        Ok(Self {
            id: parse_id(attrs)?,
            network: truthy(attrs.get("network")),
            php: truthy(attrs.get("php")),
            format: truthy(attrs.get("format")),
            shortcodes: truthy(attrs.get("shortcodes")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceAtts {
    pub id: i64,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub line_numbers: bool,
}

impl SourceAtts {
    pub fn from_attrs(attrs: &BTreeMap<String, String>) -> Result<Self, AppError> {
        Ok(Self {
            id: parse_id(attrs)?,
            network: truthy(attrs.get("network")),
            line_numbers: truthy(attrs.get("line_numbers")),
        })
    }
}

/// Set of shortcode tags currently handled.
#[derive(Debug)]
pub struct ShortcodeRegistry {
    tags: Mutex<BTreeSet<String>>,
}

impl ShortcodeRegistry {
    pub fn empty() -> Self {
        Self {
            tags: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(CONTENT_TAG);
        registry.register(SOURCE_TAG);
        registry
    }

    fn tags(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.tags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, tag: &str) {
        self.tags().insert(tag.to_string());
    }

    /// Returns whether the tag was registered.
    pub fn unregister(&self, tag: &str) -> bool {
        self.tags().remove(tag)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.tags().contains(tag)
    }

    /// Unregister `tag` until the returned guard is dropped.
    pub fn suspend(&self, tag: &str) -> SuspendGuard<'_> {
        let was_registered = self.unregister(tag);
        SuspendGuard {
            registry: self,
            tag: tag.to_string(),
            was_registered,
        }
    }
}

/// Re-registers a suspended tag on drop, including on early return.
#[must_use = "the tag is re-registered as soon as the guard is dropped"]
pub struct SuspendGuard<'a> {
    registry: &'a ShortcodeRegistry,
    tag: String,
    was_registered: bool,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        if self.was_registered {
            self.registry.register(&self.tag);
        }
    }
}

/// Renders shortcodes against a store. One renderer per request: the
/// registry it owns is mutated during nested expansion.
pub struct ShortcodeRenderer<'a, S, E> {
    store: &'a S,
    evaluator: &'a E,
    registry: ShortcodeRegistry,
    multisite: bool,
}

impl<'a, S, E> ShortcodeRenderer<'a, S, E>
where
    S: SnippetStore,
    E: Evaluator,
{
    pub fn new(store: &'a S, evaluator: &'a E, multisite: bool) -> Self {
        Self {
            store,
            evaluator,
            registry: ShortcodeRegistry::with_defaults(),
            multisite,
        }
    }

    pub fn registry(&self) -> &ShortcodeRegistry {
        &self.registry
    }

    async fn load(&self, id: i64, network: bool) -> Result<Snippet, AppError> {
        let partition = Partition::from_flag(Some(network));
        self.store
            .get(id, partition)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Snippet {id} not found")))
    }

    /// Whether the record should render for this site.
    async fn is_live(&self, snippet: &Snippet) -> Result<bool, AppError> {
        if snippet.active {
            return Ok(true);
        }
        if snippet.network && self.multisite {
            return Ok(active::site_shared_ids(self.store).await?.contains(&snippet.id));
        }
        Ok(false)
    }

    /// Render a `[code_snippet]` occurrence. Inactive and non-content records
    /// render as an empty string.
    pub async fn render_content(&self, atts: &ContentAtts) -> Result<String, AppError> {
        let snippet = self.load(atts.id, atts.network).await?;

        if snippet.scope != Scope::Content {
            tracing::debug!(id = snippet.id, scope = %snippet.scope, "Shortcode target is not a content snippet");
            return Ok(String::new());
        }
        if !self.is_live(&snippet).await? {
            tracing::debug!(id = snippet.id, "Shortcode target is inactive");
            return Ok(String::new());
        }

        let mut content = snippet.code.clone();

        if atts.php {
            content = match self.evaluator.evaluate(&content, EvalMode::Template).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!(id = snippet.id, error = %e, "Content snippet evaluation failed");
                    return Ok(String::new());
                }
            };
        }

        if atts.format {
            content = autop(&content);
        }

        if atts.shortcodes {
            let expanded = {
                let _suspended = self.registry.suspend(CONTENT_TAG);
                self.expand(&content).await
            };
            content = expanded?;
        }

        Ok(content)
    }

    /// Render a `[code_snippet_source]` occurrence as escaped, highlighted-ready markup.
    pub async fn render_source(&self, atts: &SourceAtts) -> Result<String, AppError> {
        let snippet = self.load(atts.id, atts.network).await?;
        let code_type = snippet.code_type();

        let code = if code_type == CodeType::Php {
            format!("<?php\n\n{}", snippet.code)
        } else {
            snippet.code.clone()
        };

        let pre_class = if atts.line_numbers {
            "code-snippet-source line-numbers"
        } else {
            "code-snippet-source"
        };

        Ok(format!(
            "<pre class=\"{pre_class}\"><code class=\"language-{}\">{}</code></pre>",
            code_type.as_str(),
            escape_html(&code)
        ))
    }

    async fn render_tag(&self, tag: &str, raw_attrs: &str) -> Result<String, AppError> {
        let attrs = parse_attributes(raw_attrs);
        match tag {
            CONTENT_TAG => self.render_content(&ContentAtts::from_attrs(&attrs)?).await,
            SOURCE_TAG => self.render_source(&SourceAtts::from_attrs(&attrs)?).await,
            other => Err(AppError::Internal(format!("No handler for shortcode '{other}'"))),
        }
    }

    /// Replace every registered shortcode in `text`. Unregistered tags are
    /// left untouched; `[[tag]]` renders as the literal `[tag]`. A shortcode
    /// that fails to render is replaced with nothing.
    pub fn expand<'b>(&'b self, text: &'b str) -> BoxFuture<'b, Result<String, AppError>> {
        Box::pin(async move {
            // Collect owned matches first; nothing borrowed from the regex
            // iterator is held across an await.
            let found: Vec<(usize, usize, String, String)> = shortcode_pattern()
                .captures_iter(text)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let tag = caps.get(1)?;
                    let attrs = caps.get(2).map_or("", |m| m.as_str());
                    Some((whole.start(), whole.end(), tag.as_str().to_string(), attrs.to_string()))
                })
                .collect();

            let mut out = String::with_capacity(text.len());
            let mut last = 0;

            for (start, end, tag, raw_attrs) in found {
                if start < last || !self.registry.is_registered(&tag) {
                    continue;
                }

                out.push_str(&text[last..start]);

                let escaped = text[..start].ends_with('[') && text[end..].starts_with(']');
                if escaped {
                    out.pop();
                    out.push_str(&text[start..end]);
                    last = end + 1;
                    continue;
                }

                match self.render_tag(&tag, &raw_attrs).await {
                    Ok(rendered) => out.push_str(&rendered),
                    Err(e) => {
                        tracing::warn!(tag = %tag, error = %e, "Shortcode failed to render");
                    }
                }
                last = end;
            }

            out.push_str(&text[last.min(text.len())..]);
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_unquoted_and_flags() {
        let attrs = parse_attributes(r#" id="12" Network=true php='1' format shortcodes=no "#);
        assert_eq!(attrs["id"], "12");
        assert_eq!(attrs["network"], "true");
        assert_eq!(attrs["php"], "1");
        assert_eq!(attrs["format"], "true");
        assert_eq!(attrs["shortcodes"], "no");
    }

    #[test]
    fn content_atts_from_attrs() {
        let atts = ContentAtts::from_attrs(&parse_attributes("id=3 php format=0")).unwrap();
        assert_eq!(
            atts,
            ContentAtts {
                id: 3,
                network: false,
                php: true,
                format: false,
                shortcodes: false,
            }
        );
    }

    #[test]
    fn missing_or_bad_id_is_rejected() {
        assert!(ContentAtts::from_attrs(&parse_attributes("php")).is_err());
        assert!(SourceAtts::from_attrs(&parse_attributes("id=abc")).is_err());
        assert!(SourceAtts::from_attrs(&parse_attributes("id=-4")).is_err());
    }

    #[test]
    fn suspend_guard_restores_registration() {
        let registry = ShortcodeRegistry::with_defaults();
        {
            let _guard = registry.suspend(CONTENT_TAG);
            assert!(!registry.is_registered(CONTENT_TAG));
            assert!(registry.is_registered(SOURCE_TAG));
        }
        assert!(registry.is_registered(CONTENT_TAG));
    }

    #[test]
    fn suspend_guard_restores_on_panic() {
        let registry = ShortcodeRegistry::with_defaults();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = registry.suspend(CONTENT_TAG);
            panic!("expansion blew up");
        }));
        assert!(result.is_err());
        assert!(registry.is_registered(CONTENT_TAG));
    }

    #[test]
    fn suspending_unregistered_tag_does_not_register_it() {
        let registry = ShortcodeRegistry::empty();
        drop(registry.suspend("other"));
        assert!(!registry.is_registered("other"));
    }
}
