//! Agent server access.
//!
//! The tools talk to a locally running agent server over HTTP. This module
//! defines the [`AgentBackend`] seam and the JSON wire types; the pieces
//! live in submodules:
//!
//! | Module | Role |
//! |--------|------|
//! | [`http`] | `reqwest` implementation of [`AgentBackend`] |
//! | [`server`] | spawning the server and waiting until it listens |
//! | [`client`] | sessions, prompts, retries, and transcript logging |

pub mod client;
pub mod http;
pub mod server;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{AgentOptions, ModelRef};

/// Operations the tools need from an agent server.
///
/// [`http::HttpBackend`] is the production implementation; tests swap in
/// in-memory backends.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Succeeds when the server answers at all.
    async fn health(&self) -> Result<()>;

    async fn create_session(&self, directory: &str, title: &str) -> Result<Session>;

    async fn get_session(&self, id: &str) -> Result<Session>;

    /// Send a prompt and wait for the assistant's complete reply.
    async fn prompt(
        &self,
        id: &str,
        directory: &str,
        request: &PromptRequest,
    ) -> Result<PromptResponse>;

    async fn delete_session(&self, id: &str, directory: &str) -> Result<()>;

    async fn providers(&self) -> Result<ProvidersResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextPartInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelSelector {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl From<&ModelRef> for ModelSelector {
    fn from(model: &ModelRef) -> Self {
        Self {
            provider_id: model.provider_id.clone(),
            model_id: model.model_id.clone(),
        }
    }
}

/// Body of `POST /session/{id}/message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptRequest {
    pub parts: Vec<TextPartInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<BTreeMap<String, bool>>,
}

impl PromptRequest {
    /// A single text part addressed to `agent`, shaped by `opts`.
    pub fn build(agent: &str, prompt: &str, opts: &AgentOptions) -> Self {
        Self {
            parts: vec![TextPartInput {
                kind: "text".to_string(),
                text: prompt.to_string(),
            }],
            agent: (!opts.no_agent).then(|| agent.to_string()),
            model: opts.model.as_ref().map(ModelSelector::from),
            system: opts.system.clone().filter(|s| !s.is_empty()),
            tools: opts.tools.clone(),
        }
    }
}

/// One part of an assistant reply. Only text parts carry `text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Part {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptResponse {
    #[serde(default)]
    pub info: serde_json::Value,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersResponse {
    #[serde(default)]
    pub providers: Vec<Provider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub models: BTreeMap<String, ProviderModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub cost: ModelCost,
    /// `None` when the server does not say; only `Some(false)` rules a
    /// model out for tool use.
    #[serde(default)]
    pub tool_call: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelCost {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
}
