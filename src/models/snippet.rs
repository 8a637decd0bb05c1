//! Snippet record model with per-field normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::models::scope::{CodeType, Scope};

/// Default execution priority for new snippets.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Storage partition a snippet lives in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Site,
    Network,
}

impl Partition {
    /// Resolve an optional `network` flag; unset means the caller's own site.
    pub fn from_flag(network: Option<bool>) -> Self {
        if network.unwrap_or(false) {
            Partition::Network
        } else {
            Partition::Site
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Partition::Network)
    }

    pub fn table(&self) -> &'static str {
        match self {
            Partition::Site => "snippets",
            Partition::Network => "ms_snippets",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Site => "site",
            Partition::Network => "network",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snippet {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub code: String,
    pub tags: Vec<String>,
    pub scope: Scope,
    pub priority: i32,
    pub active: bool,
    pub network: bool,
    /// Derived from the network shared list; never persisted on the row.
    #[serde(default)]
    pub shared_network: bool,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

type FieldSetter = fn(&mut Snippet, &Value) -> bool;

/// Writable fields in the order they are applied. `scope` precedes `code`
/// because code preparation depends on the code type.
const FIELD_SETTERS: &[(&str, FieldSetter)] = &[
    ("name", set_name),
    ("desc", set_description),
    ("description", set_description),
    ("scope", set_scope),
    ("code", set_code),
    ("tags", set_tags),
    ("priority", set_priority),
    ("active", set_active),
];

impl Snippet {
    pub fn new(partition: Partition) -> Self {
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            code: String::new(),
            tags: Vec::new(),
            scope: Scope::Global,
            priority: DEFAULT_PRIORITY,
            active: false,
            network: partition.is_network(),
            shared_network: false,
            created: None,
            modified: None,
        }
    }

    pub fn partition(&self) -> Partition {
        Partition::from_flag(Some(self.network))
    }

    pub fn code_type(&self) -> CodeType {
        self.scope.code_type()
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    pub fn is_single_use(&self) -> bool {
        self.scope == Scope::SingleUse
    }

    /// Set one named field. Returns false when the field is unknown or the
    /// value is rejected, in which case the previous value is kept.
    pub fn set_field(&mut self, field: &str, value: &Value) -> bool {
        match FIELD_SETTERS.iter().find(|(name, _)| *name == field) {
            Some((_, setter)) => {
                let accepted = setter(self, value);
                if !accepted {
                    tracing::debug!(field, value = %value, "Rejected snippet field value");
                }
                accepted
            }
            None => false,
        }
    }

    /// Apply a map of fields in setter-table order. Keys that are not
    /// writable fields are ignored. Returns the names of rejected fields.
    pub fn apply_fields(&mut self, fields: &Map<String, Value>) -> Vec<String> {
        let mut rejected = Vec::new();
        for (name, _) in FIELD_SETTERS {
            if let Some(value) = fields.get(*name) {
                if !self.set_field(name, value) {
                    rejected.push(name.to_string());
                }
            }
        }
        rejected
    }
}

fn set_name(snippet: &mut Snippet, value: &Value) -> bool {
    match value.as_str() {
        Some(name) => {
            snippet.name = name.trim().to_string();
            true
        }
        None => false,
    }
}

fn set_description(snippet: &mut Snippet, value: &Value) -> bool {
    match value.as_str() {
        Some(desc) => {
            snippet.description = desc.to_string();
            true
        }
        None => false,
    }
}

fn set_scope(snippet: &mut Snippet, value: &Value) -> bool {
    match value.as_str().and_then(|s| s.trim().parse::<Scope>().ok()) {
        Some(scope) => {
            snippet.scope = scope;
            true
        }
        None => false,
    }
}

fn set_code(snippet: &mut Snippet, value: &Value) -> bool {
    match value.as_str() {
        Some(code) => {
            snippet.code = prepare_code(code, snippet.code_type());
            true
        }
        None => false,
    }
}

fn set_tags(snippet: &mut Snippet, value: &Value) -> bool {
    let raw: Vec<&str> = match value {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => {
            let mut tags = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(tag) => tags.push(tag),
                    None => return false,
                }
            }
            tags
        }
        _ => return false,
    };
    snippet.tags = normalize_tags(raw);
    true
}

fn set_priority(snippet: &mut Snippet, value: &Value) -> bool {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(priority) => {
            snippet.priority = normalize_priority(priority);
            true
        }
        None => false,
    }
}

fn set_active(snippet: &mut Snippet, value: &Value) -> bool {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    };
    match parsed {
        Some(active) => {
            snippet.active = active;
            true
        }
        None => false,
    }
}

/// Clamp a raw priority into the stored non-negative range.
pub fn normalize_priority(priority: i64) -> i32 {
    priority.clamp(0, i64::from(i32::MAX)) as i32
}

/// Trim tags, drop empties and keep only the first of any duplicates.
pub fn normalize_tags<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Trim code and, for php, strip the surrounding open/close tags.
pub fn prepare_code(code: &str, code_type: CodeType) -> String {
    let mut code = code.trim();
    if code_type == CodeType::Php {
        if let Some(rest) = code.strip_prefix("<?php") {
            code = rest;
        } else if let Some(rest) = code.strip_prefix("<?") {
            if rest.starts_with(char::is_whitespace) {
                code = rest;
            }
        }
        code = code.trim();
        if let Some(rest) = code.strip_suffix("?>") {
            code = rest.trim_end();
        }
    }
    code.to_string()
}

/// Raw snippet row as stored in either partition table.
#[derive(Debug, Clone, FromRow)]
pub struct SnippetRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub code: String,
    pub tags: Vec<String>,
    pub scope: String,
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SnippetRow {
    pub fn into_snippet(self, partition: Partition) -> Snippet {
        let scope = self.scope.parse::<Scope>().unwrap_or_else(|_| {
            tracing::warn!(id = self.id, scope = %self.scope, "Stored snippet has unknown scope");
            Scope::Global
        });
        Snippet {
            id: self.id,
            name: self.name,
            description: self.description,
            code: self.code,
            tags: self.tags,
            scope,
            priority: self.priority.max(0),
            active: self.active,
            network: partition.is_network(),
            shared_network: false,
            created: Some(self.created_at),
            modified: Some(self.updated_at),
        }
    }
}

/// Create/update payload. Values pass through the field setters, so scope,
/// tags and priority accept the loose forms the setters accept.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnippetInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl SnippetInput {
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Fields that may be changed with a partial store update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    pub active: Option<bool>,
    pub priority: Option<i32>,
}
