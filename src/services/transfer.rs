//! Snippet import and export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::scope::Scope;
use crate::models::snippet::{Partition, Snippet};
use crate::services::cache::SnippetCache;
use crate::services::revision::{self, BumpTarget};
use crate::services::store::{ListFilter, SnippetStore};

pub const GENERATOR: &str = concat!("snippetd ", env!("CARGO_PKG_VERSION"));

/// One exported snippet. Field names match the writable field table so an
/// export can be imported unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedSnippet {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub scope: Scope,
    pub code: String,
    pub priority: i32,
}

impl From<&Snippet> for ExportedSnippet {
    fn from(snippet: &Snippet) -> Self {
        Self {
            name: snippet.name.clone(),
            desc: snippet.description.clone(),
            tags: snippet.tags.clone(),
            scope: snippet.scope,
            code: snippet.code.clone(),
            priority: snippet.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub generator: String,
    pub date_created: DateTime<Utc>,
    pub snippets: Vec<ExportedSnippet>,
}

/// Export the given ids, or every snippet when `ids` is empty.
pub async fn export<S: SnippetStore>(
    store: &S,
    partition: Partition,
    ids: &[i64],
) -> Result<ExportDocument, AppError> {
    let snippets: Vec<Snippet> = if ids.is_empty() {
        store.list(partition, &ListFilter::default()).await?
    } else {
        let mut found = Vec::with_capacity(ids.len());
        for &id in ids {
            match store.get(id, partition).await? {
                Some(snippet) => found.push(snippet),
                None => return Err(AppError::NotFound(format!("Snippet {id} not found"))),
            }
        }
        found
    };

    tracing::info!(count = snippets.len(), partition = partition.as_str(), "Exported snippets");
    Ok(ExportDocument {
        generator: GENERATOR.to_string(),
        date_created: Utc::now(),
        snippets: snippets.iter().map(ExportedSnippet::from).collect(),
    })
}

/// What to do when an imported snippet matches an existing one by name and scope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    #[default]
    Ignore,
    Replace,
    Skip,
}

/// Import request: a list of loose field maps plus the duplicate mode.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub duplicates: DuplicateMode,
    pub snippets: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportSummary {
    pub created: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub imported_ids: Vec<i64>,
}

/// Import snippets into a partition. Every imported snippet is inactive.
pub async fn import<S: SnippetStore>(
    store: &S,
    cache: &SnippetCache,
    partition: Partition,
    request: &ImportRequest,
) -> Result<ImportSummary, AppError> {
    let existing = if request.duplicates == DuplicateMode::Ignore {
        Vec::new()
    } else {
        store.list(partition, &ListFilter::default()).await?
    };

    let mut summary = ImportSummary::default();
    for fields in &request.snippets {
        let mut snippet = Snippet::new(partition);
        let rejected = snippet.apply_fields(fields);
        if !rejected.is_empty() {
            tracing::warn!(name = %snippet.name, ?rejected, "Imported snippet had rejected fields");
        }
        snippet.active = false;

        let duplicate = existing
            .iter()
            .find(|e| e.name == snippet.name && e.scope == snippet.scope);

        match (request.duplicates, duplicate) {
            (DuplicateMode::Skip, Some(_)) => {
                summary.skipped += 1;
                continue;
            }
            (DuplicateMode::Replace, Some(current)) => {
                snippet.id = current.id;
                summary.replaced += 1;
            }
            _ => summary.created += 1,
        }

        let id = store.save(&snippet).await?;
        summary.imported_ids.push(id);
    }

    tracing::info!(
        partition = partition.as_str(),
        created = summary.created,
        replaced = summary.replaced,
        skipped = summary.skipped,
        "Imported snippets"
    );

    if !summary.imported_ids.is_empty() {
        cache.invalidate_all().await;
        revision::bump(store, BumpTarget::All, partition).await?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_document_shape() {
        let mut snippet = Snippet::new(Partition::Site);
        snippet.name = "Footer".to_string();
        snippet.scope = Scope::SiteFooterJs;
        snippet.code = "go();".to_string();

        let value = serde_json::to_value(ExportedSnippet::from(&snippet)).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Footer",
                "desc": "",
                "tags": [],
                "scope": "site-footer-js",
                "code": "go();",
                "priority": 10
            })
        );
    }

    #[test]
    fn import_request_defaults_to_ignore() {
        let request: ImportRequest =
            serde_json::from_value(json!({"snippets": [{"name": "a"}]})).unwrap();
        assert_eq!(request.duplicates, DuplicateMode::Ignore);
        assert_eq!(request.snippets.len(), 1);
    }

    #[test]
    fn generator_names_the_package() {
        assert!(GENERATOR.starts_with("snippetd "));
    }
}
