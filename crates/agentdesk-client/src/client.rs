//! HTTP client for the agentdesk proxy
//!
//! Wraps `POST /mongodb` and the per-user settings endpoints. Every call is
//! a single request; nothing is retried.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::gateway::DocumentGateway;
use crate::wire::{
    ConnectionSettings, DataEnvelope, ErrorEnvelope, InsertOneResult, JsonDocument, ProxyRequest,
    UpdateResult,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with a non-success status. `message` is the
    /// server's `error` field when it sent one.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: Arc<String>,
    api_key: Option<Arc<String>>,
}

impl ProxyClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("agentdesk/0.1.0")
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url: Arc::new(base_url),
            api_key: api_key.map(Arc::new),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.as_str()),
            None => request,
        }
    }

    /// `{base}/settings/{user_id}` with the id escaped as a single path segment
    fn settings_url(&self, user_id: &str) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("settings")
            .push(user_id);
        Ok(url)
    }

    /// Send one proxy request and return the raw `data` payload
    pub async fn execute(
        &self,
        request: &ProxyRequest,
        fallback_error: &str,
    ) -> Result<Value, ClientError> {
        let url = format!("{}/mongodb", self.base_url);
        debug!(
            "Proxy {} on {}.{}",
            request.action, request.database, request.collection
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;

        let envelope: DataEnvelope<Value> = read_envelope(response, fallback_error).await?;
        Ok(envelope.data)
    }

    /// Load the stored connection settings for a user, if any
    pub async fn fetch_settings(
        &self,
        user_id: &str,
    ) -> Result<Option<ConnectionSettings>, ClientError> {
        let url = self.settings_url(user_id)?;

        let response = self.authorize(self.client.get(url)).send().await?;

        let envelope: DataEnvelope<Option<ConnectionSettings>> =
            read_envelope(response, "Failed to load settings").await?;
        Ok(envelope.data)
    }

    /// Create or replace the connection settings for a user
    pub async fn save_settings(
        &self,
        user_id: &str,
        settings: &ConnectionSettings,
    ) -> Result<ConnectionSettings, ClientError> {
        let url = self.settings_url(user_id)?;

        let response = self
            .authorize(self.client.put(url))
            .json(settings)
            .send()
            .await?;

        let envelope: DataEnvelope<ConnectionSettings> =
            read_envelope(response, "Failed to save settings").await?;
        Ok(envelope.data)
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    fallback_error: &str,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| fallback_error.to_string());
        warn!("Proxy returned {}: {}", status.as_u16(), message);
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Interpret the payload of a `find` call. A `null` payload counts as empty.
pub fn documents_from(data: Value) -> Result<Vec<JsonDocument>, ClientError> {
    match data {
        Value::Null => Ok(Vec::new()),
        other => Ok(serde_json::from_value(other)?),
    }
}

#[async_trait]
impl DocumentGateway for ProxyClient {
    async fn find(&self, target: &ConnectionSettings) -> Result<Vec<JsonDocument>, ClientError> {
        let data = self
            .execute(&ProxyRequest::find(target), "Failed to fetch data")
            .await?;
        documents_from(data)
    }

    async fn find_one(
        &self,
        target: &ConnectionSettings,
        filter: JsonDocument,
    ) -> Result<Option<JsonDocument>, ClientError> {
        let data = self
            .execute(
                &ProxyRequest::find_one(target, filter),
                "Failed to fetch document",
            )
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn insert_one(
        &self,
        target: &ConnectionSettings,
        document: JsonDocument,
    ) -> Result<InsertOneResult, ClientError> {
        let data = self
            .execute(
                &ProxyRequest::insert_one(target, document),
                "Failed to insert document",
            )
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn update_one(
        &self,
        target: &ConnectionSettings,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Result<UpdateResult, ClientError> {
        let data = self
            .execute(
                &ProxyRequest::update_one(target, filter, update),
                "Failed to update document",
            )
            .await?;
        Ok(serde_json::from_value(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_find_payload_is_empty() {
        assert!(documents_from(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_find_payload_must_be_documents() {
        let docs = documents_from(json!([{ "agent_id": "a" }, { "agent_id": "b" }])).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["agent_id"], "b");

        assert!(documents_from(json!(42)).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ProxyClient::new("http://localhost:3000/", None).unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:3000");
    }

    #[test]
    fn test_settings_url_escapes_user_id() {
        let client = ProxyClient::new("http://localhost:3000", None).unwrap();

        assert_eq!(
            client.settings_url("alice").unwrap().as_str(),
            "http://localhost:3000/settings/alice"
        );
        assert_eq!(
            client.settings_url("alice#bob").unwrap().path(),
            "/settings/alice%23bob"
        );
        assert_eq!(
            client.settings_url("a?b=c").unwrap().path(),
            "/settings/a%3Fb=c"
        );
        assert_eq!(
            client.settings_url("team/alice").unwrap().path(),
            "/settings/team%2Falice"
        );

        let url = client.settings_url("alice#bob").unwrap();
        assert!(url.fragment().is_none());
        assert!(url.query().is_none());
    }

    #[test]
    fn test_settings_url_keeps_base_path() {
        let client = ProxyClient::new("http://localhost:3000/api/", None).unwrap();
        assert_eq!(
            client.settings_url("u1").unwrap().path(),
            "/api/settings/u1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let client = ProxyClient::new("not a url", None).unwrap();
        assert!(matches!(
            client.settings_url("u1"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let client = ProxyClient::new("http://localhost:3000", Some("secret".into())).unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_api_error_displays_server_message() {
        let err = ClientError::Api {
            status: 400,
            message: "Invalid action".into(),
        };
        assert_eq!(err.to_string(), "Invalid action");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_unreachable_server_is_request_error() {
        // port 9 (discard) is closed on test hosts
        let client = ProxyClient::new("http://127.0.0.1:9", None).unwrap();
        let err = tokio_test::block_on(client.fetch_settings("u1")).unwrap_err();

        assert!(matches!(err, ClientError::Request(_)));
        assert_eq!(err.status(), None);
    }
}
