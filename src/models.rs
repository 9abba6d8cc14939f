//! Core data types shared by the exporter and the agent tools.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// A file found while walking a source tree.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the walk root, always `/`-separated.
    pub relative: String,
}

/// Output of one agent call, with the session id needed to follow up.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub output: String,
    pub session_id: String,
}

/// Provider and model identifiers for a model override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider_id: String,
    pub model_id: String,
}

impl ModelRef {
    pub fn new(provider_id: &str, model_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

/// Optional settings for an agent call.
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    /// Enable or disable specific server-side tools (e.g. `websearch`).
    pub tools: Option<BTreeMap<String, bool>>,
    pub model: Option<ModelRef>,
    pub system: Option<String>,
    /// Send the prompt without naming an agent.
    pub no_agent: bool,
    /// Delete the session once the prompt completes.
    pub auto_cleanup: bool,
    /// Session title; defaults to `<agent>-<unix seconds>`.
    pub title: Option<String>,
}

/// A zero-cost model offered by the agent server's own provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeModel {
    pub provider_id: String,
    pub model_id: String,
    pub name: String,
    pub release_date: String,
    pub tool_call: Option<bool>,
}

impl FreeModel {
    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(&self.provider_id, &self.model_id)
    }
}
