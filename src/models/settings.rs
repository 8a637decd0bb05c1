//! Engine settings stored per partition.

use serde::{Deserialize, Serialize};

/// Option name under which settings are stored.
pub const SETTINGS_OPTION: &str = "settings";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    /// Minify css/js bundles before serving.
    pub minify_output: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            minify_output: false,
        }
    }
}

/// Partial settings update.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateSettings {
    pub minify_output: Option<bool>,
}

impl EngineSettings {
    pub fn apply(&mut self, update: &UpdateSettings) {
        if let Some(minify) = update.minify_output {
            self.minify_output = minify;
        }
    }
}
