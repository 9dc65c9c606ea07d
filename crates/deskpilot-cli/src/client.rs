use anyhow::{anyhow, bail, Result};
use deskpilot_schema::{ErrorBody, HealthResponse, RunAccepted, StatusResponse, StopResponse};
use serde::de::DeserializeOwned;

/// Thin HTTP client for a running control server.
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.http.get(self.url("/health"))).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.send(self.http.get(self.url("/status"))).await
    }

    pub async fn run(&self, instructions: &str) -> Result<RunAccepted> {
        let body = serde_json::json!({ "instructions": instructions });
        self.send(self.http.post(self.url("/run")).json(&body)).await
    }

    pub async fn stop(&self) -> Result<StopResponse> {
        self.send(self.http.post(self.url("/stop"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let request = match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("failed to reach control server at {}: {e}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&text) {
                Ok(ErrorBody {
                    error,
                    message: Some(message),
                }) => bail!("{status}: {error}: {message}"),
                Ok(ErrorBody { error, .. }) => bail!("{status}: {error}"),
                Err(_) => bail!("{status}: {text}"),
            }
        }

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("unexpected response from control server: {e}"))
    }
}
