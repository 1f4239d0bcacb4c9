//! Server manager REST client with connection pooling.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::api::ServerApi;
use crate::config::Config;
use crate::error::RemoteError;
use crate::models::{NewServer, ResponseEnvelope};

/// Longest slice of a raw body quoted back in an error.
const RAW_BODY_PREVIEW: usize = 300;

/// REST client for the server manager backend with persistent connection.
pub struct ServerClient {
    client: Client,
    base_url: String,
}

impl ServerClient {
    /// Create a new client rooted at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        pool_max_idle: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(pool_max_idle)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Create a client from resolved configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.api_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.pool_max_idle_per_host,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode the response envelope.
    async fn execute(&self, request: RequestBuilder) -> Result<ResponseEnvelope, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Error bodies are usually envelopes too; fall back to the raw text.
            let message = serde_json::from_str::<ResponseEnvelope>(&text)
                .ok()
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .or_else(|| (!text.trim().is_empty()).then(|| preview(&text)))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(RemoteError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        let envelope: ResponseEnvelope = serde_json::from_str(&text)
            .map_err(|e| RemoteError::Decode(format!("{} | Raw: {}", e, preview(&text))))?;

        tracing::debug!(
            status_code = envelope.status_code,
            message = %envelope.message,
            "received response envelope"
        );

        Ok(envelope)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(RAW_BODY_PREVIEW).collect()
}

#[async_trait]
impl ServerApi for ServerClient {
    async fn list(&self) -> Result<ResponseEnvelope, RemoteError> {
        self.execute(self.client.get(self.url("/server/list"))).await
    }

    async fn ping(&self, ip_address: &str) -> Result<ResponseEnvelope, RemoteError> {
        let path = format!("/server/ping/{}", ip_address);
        self.execute(self.client.get(self.url(&path))).await
    }

    async fn save(&self, server: &NewServer) -> Result<ResponseEnvelope, RemoteError> {
        self.execute(self.client.post(self.url("/server/save")).json(server))
            .await
    }

    async fn delete(&self, id: i64) -> Result<ResponseEnvelope, RemoteError> {
        let path = format!("/server/delete/{}", id);
        self.execute(self.client.delete(self.url(&path))).await
    }
}
