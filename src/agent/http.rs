//! HTTP implementation of [`AgentBackend`] using `reqwest`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{AgentBackend, PromptRequest, PromptResponse, ProvidersResponse, Session};

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
}

impl HttpBackend {
    /// No overall request timeout is set: prompts can run for many
    /// minutes and are bounded by the calling tool instead.
    pub fn new(base_url: &str, probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into an error carrying status and body.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("agent server error {}: {}", status, body.trim());
}

#[async_trait]
impl AgentBackend for HttpBackend {
    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/session"))
            .timeout(self.probe_timeout)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn create_session(&self, directory: &str, title: &str) -> Result<Session> {
        let response = self
            .client
            .post(self.url("/session"))
            .query(&[("directory", directory)])
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .context("failed to create session")?;
        let session = check(response).await?.json().await?;
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let response = self
            .client
            .get(self.url(&format!("/session/{}", id)))
            .send()
            .await?;
        let session = check(response).await?.json().await?;
        Ok(session)
    }

    async fn prompt(
        &self,
        id: &str,
        directory: &str,
        request: &PromptRequest,
    ) -> Result<PromptResponse> {
        let response = self
            .client
            .post(self.url(&format!("/session/{}/message", id)))
            .query(&[("directory", directory)])
            .json(request)
            .send()
            .await?;
        let reply = check(response)
            .await?
            .json()
            .await
            .context("failed to decode prompt response")?;
        Ok(reply)
    }

    async fn delete_session(&self, id: &str, directory: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/session/{}", id)))
            .query(&[("directory", directory)])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn providers(&self) -> Result<ProvidersResponse> {
        let response = self
            .client
            .get(self.url("/config/providers"))
            .send()
            .await?;
        let providers = check(response).await?.json().await?;
        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:4096/", Duration::from_secs(2)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:4096");
        assert_eq!(backend.url("/session"), "http://localhost:4096/session");
    }

    #[tokio::test]
    async fn unreachable_server_fails_health() {
        // Port 9 (discard) is closed on any normal test host.
        let backend = HttpBackend::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(backend.health().await.is_err());
    }
}
