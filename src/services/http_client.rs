//! Shared HTTP plumbing: a single client used for registry fetches and reputation fetches.
//!
//! Sets a stable `User-Agent`, applies per-request timeouts, and surfaces non-2xx responses
//! as a typed failure. This is the sole integration point downstream components route their
//! outbound calls through (rate limiting lives at the call site in the Reputation Scorer,
//! §4.3, since only that component is rate-limited).

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::utils::error::AuditError;

const USER_AGENT: &str = concat!("depsentry/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    #[cfg(test)]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetches `url`, decodes it as JSON `T`, with a `None` result for a 404 (the caller
    /// treats a missing package/version as "skip this subtree", not an error) and a typed
    /// error for anything else that isn't 2xx.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<T>, AuditError> {
        debug!(url, "fetching registry metadata");

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(err) => {
                warn!(url, error = %err, "registry request failed");
                return Err(AuditError::RegistryUnavailable(err.to_string()));
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(url, "registry rate limited this request");
            return Err(AuditError::RegistryUnavailable("rate limited".to_string()));
        }

        if !response.status().is_success() {
            warn!(url, status = %response.status(), "registry returned non-success status");
            return Err(AuditError::RegistryUnavailable(format!(
                "status {}",
                response.status()
            )));
        }

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Option<T>, AuditError> {
        let bytes = response.bytes().await.map_err(AuditError::Http)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(error = %err, "failed to decode registry response");
                Err(AuditError::Json(err))
            }
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Dummy {
        ok: bool,
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pkg")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let client = HttpClient::new();
        let result: Option<Dummy> = client
            .get_json(&format!("{}/pkg", server.url()), Duration::from_secs(3))
            .await
            .unwrap();

        assert!(result.unwrap().ok);
    }

    #[tokio::test]
    async fn test_get_json_404_returns_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/missing").with_status(404).create_async().await;

        let client = HttpClient::new();
        let result: Option<Dummy> = client
            .get_json(&format!("{}/missing", server.url()), Duration::from_secs(3))
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_json_server_error_is_typed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/broken").with_status(500).create_async().await;

        let client = HttpClient::new();
        let result: Result<Option<Dummy>, AuditError> = client
            .get_json(&format!("{}/broken", server.url()), Duration::from_secs(3))
            .await;

        assert!(matches!(result, Err(AuditError::RegistryUnavailable(_))));
    }
}
