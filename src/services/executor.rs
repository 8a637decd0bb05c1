//! Execution of active php-type snippets for a request context.
//!
//! Snippets run in resolved order. A failing snippet is logged and reported
//! but never stops the batch. Single-use snippets are deactivated after they
//! run, whether or not their evaluation succeeded.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::scope::{CodeType, Scope};
use crate::models::snippet::{FieldUpdate, Partition, Snippet};
use crate::services::active;
use crate::services::cache::SnippetCache;
use crate::services::evaluator::{EvalMode, Evaluator};
use crate::services::options::{self, ACTIVE_SHARED_NETWORK_SNIPPETS};
use crate::services::resolver::ScopeSet;
use crate::services::store::SnippetStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    Frontend,
    Admin,
}

impl ExecutionContext {
    pub fn scopes(&self) -> ScopeSet {
        let context_scope = match self {
            ExecutionContext::Frontend => Scope::FrontEnd,
            ExecutionContext::Admin => Scope::Admin,
        };
        ScopeSet::new([Scope::Global, Scope::SingleUse, context_scope])
    }
}

impl FromStr for ExecutionContext {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frontend" | "front-end" => Ok(ExecutionContext::Frontend),
            "admin" => Ok(ExecutionContext::Admin),
            other => Err(AppError::Validation(format!("Unknown execution context '{other}'"))),
        }
    }
}

/// Engine switches that apply to a whole execution pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionOptions {
    pub multisite: bool,
    pub safe_mode: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutedSnippet {
    pub id: i64,
    pub partition: Partition,
    pub name: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedSnippet {
    pub id: i64,
    pub partition: Partition,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeactivatedSnippet {
    pub id: i64,
    pub partition: Partition,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionReport {
    pub context: ExecutionContext,
    pub safe_mode: bool,
    pub executed: Vec<ExecutedSnippet>,
    pub failed: Vec<FailedSnippet>,
    pub deactivated: Vec<DeactivatedSnippet>,
}

impl ExecutionReport {
    fn new(context: ExecutionContext, safe_mode: bool) -> Self {
        Self {
            context,
            safe_mode,
            executed: Vec::new(),
            failed: Vec::new(),
            deactivated: Vec::new(),
        }
    }
}

/// Run every active php snippet for `context`.
pub async fn execute_active_snippets<S, E>(
    store: &S,
    cache: &SnippetCache,
    evaluator: &E,
    context: ExecutionContext,
    opts: ExecutionOptions,
) -> Result<ExecutionReport, AppError>
where
    S: SnippetStore,
    E: Evaluator,
{
    let mut report = ExecutionReport::new(context, opts.safe_mode);
    if opts.safe_mode {
        tracing::info!(?context, "Safe mode enabled, skipping snippet execution");
        return Ok(report);
    }

    let active = active::fetch_active_snippets(store, cache, &context.scopes(), opts.multisite).await?;

    let mut ran_single_use = false;
    for (partition, snippet) in active.iter() {
        if snippet.code_type() != CodeType::Php {
            continue;
        }

        match evaluator.evaluate(&snippet.code, EvalMode::Script).await {
            Ok(output) => {
                tracing::debug!(id = snippet.id, partition = partition.as_str(), "Executed snippet");
                report.executed.push(ExecutedSnippet {
                    id: snippet.id,
                    partition,
                    name: snippet.name.clone(),
                    output,
                });
            }
            Err(e) => {
                tracing::error!(
                    id = snippet.id,
                    partition = partition.as_str(),
                    error = %e,
                    "Snippet execution failed"
                );
                report.failed.push(FailedSnippet {
                    id: snippet.id,
                    partition,
                    name: snippet.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        if snippet.is_single_use() {
            ran_single_use = true;
            match deactivate_single_use(store, partition, snippet).await {
                Ok(()) => report.deactivated.push(DeactivatedSnippet {
                    id: snippet.id,
                    partition,
                }),
                Err(e) => tracing::error!(
                    id = snippet.id,
                    partition = partition.as_str(),
                    error = %e,
                    "Failed to deactivate single-use snippet"
                ),
            }
        }
    }

    if ran_single_use {
        cache.invalidate(&[Scope::SingleUse]).await;
    }

    tracing::info!(
        ?context,
        executed = report.executed.len(),
        failed = report.failed.len(),
        deactivated = report.deactivated.len(),
        "Snippet execution pass complete"
    );

    Ok(report)
}

/// Clear the active flag, and for a shared network snippet also drop it from
/// this site's activation list so it cannot run again through sharing.
async fn deactivate_single_use<S: SnippetStore>(
    store: &S,
    partition: Partition,
    snippet: &Snippet,
) -> Result<(), AppError> {
    let update = FieldUpdate {
        active: Some(false),
        priority: None,
    };
    store.update_fields(snippet.id, partition, &update).await?;

    if partition.is_network() && snippet.shared_network {
        let mut activated: BTreeSet<i64> = options::active_shared_ids(store).await?;
        if activated.remove(&snippet.id) {
            options::save(store, Partition::Site, ACTIVE_SHARED_NETWORK_SNIPPETS, &activated).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_scopes() {
        let front = ExecutionContext::Frontend.scopes();
        assert!(front.contains(Scope::Global));
        assert!(front.contains(Scope::SingleUse));
        assert!(front.contains(Scope::FrontEnd));
        assert!(!front.contains(Scope::Admin));

        let admin = ExecutionContext::Admin.scopes();
        assert!(admin.contains(Scope::Admin));
        assert!(!admin.contains(Scope::FrontEnd));
    }

    #[test]
    fn context_parsing() {
        assert_eq!("admin".parse::<ExecutionContext>().unwrap(), ExecutionContext::Admin);
        assert_eq!(
            "front-end".parse::<ExecutionContext>().unwrap(),
            ExecutionContext::Frontend
        );
        assert!("content".parse::<ExecutionContext>().is_err());
    }
}
