//! HTTP Transport
//!
//! One round trip to the OpenAI-compatible chat-completions endpoint via
//! reqwest. Retry, backoff, and the per-attempt timeout live in the client,
//! not here; this layer only classifies each failure as a transport error.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::Credentials;
use crate::error::{NavError, NavResult, TransportError};
use crate::types::InferenceTransport;

/// HTTP transport for the chat-completions endpoint.
pub struct HttpTransport {
    url: String,
    credentials: Credentials,
    http: Client,
}

impl HttpTransport {
    /// Create a transport for `{api_url}/v1/chat/completions`.
    pub fn new(api_url: &str, credentials: Credentials) -> NavResult<Self> {
        if api_url.trim().is_empty() {
            return Err(NavError::Config("api_url is empty".to_string()));
        }
        Ok(Self {
            url: format!("{}/v1/chat/completions", api_url.trim_end_matches('/')),
            credentials,
            http: Client::new(),
        })
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn round_trip(&self, body: &Value) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(
                "Authorization",
                format!("Bearer {}", self.credentials.api_key),
            )
            .header("OpenAI-Organization", &self.credentials.organization_id)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_normalizes_trailing_slash() {
        let creds = Credentials::new("key".to_string(), "org".to_string()).unwrap();
        let transport = HttpTransport::new("https://api.example.com/", creds).unwrap();
        assert_eq!(transport.url, "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn transport_rejects_empty_url() {
        let creds = Credentials::new("key".to_string(), "org".to_string()).unwrap();
        assert!(HttpTransport::new("  ", creds).is_err());
    }
}
