//! JSON-over-HTTP producer for read-through fetches

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when fetching JSON from the backend
#[derive(Debug, Error)]
pub enum HttpError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Thin GET-JSON client
#[derive(Debug, Clone, Default)]
pub struct JsonClient {
    client: Client,
    bearer_token: Option<String>,
}

impl JsonClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new JsonClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            bearer_token: None,
        }
    }

    /// Sends `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Fetches `url` and parses the body as `T`
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
            });
        }

        let text = response.text().await?;
        debug!(url, bytes = text.len(), "Fetched JSON");
        Ok(serde_json::from_str(&text)?)
    }
}
