//! REST client for session creation, snapshots, and SSE egress.

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::SdkConfig;
use crate::proto::EgressMessage;
use crate::trigger::AutoTrigger;

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client bound to one API key and endpoint set.
#[derive(Clone)]
pub struct SessionApiClient {
    http: Client,
    api_key: SecretString,
    config: SdkConfig,
}

impl SessionApiClient {
    pub fn new(api_key: SecretString, config: SdkConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub(crate) fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// `POST {base}/sessions`; returns the `data` object of the response.
    pub async fn create_session(&self, request: &CreateSessionRequest) -> Result<Value, ApiError> {
        let endpoint = format!("{}/sessions", self.config.base_url);
        debug!(event = "session_create_request", endpoint = %endpoint);

        let body = self.send(self.http.post(&endpoint).json(request)).await?;
        parse_create_response(&body)
    }

    /// `GET {base}/sessions/{id}`; returns the response body as-is.
    pub async fn get_session(&self, session_id: &str) -> Result<Value, ApiError> {
        let endpoint = format!("{}/sessions/{}", self.config.base_url, session_id);
        let body = self.send(self.http.get(&endpoint)).await?;
        serde_json::from_str(&body).map_err(|err| ApiError::Parse(err.to_string()))
    }

    /// Posts a control message to the SSE egress endpoint.
    pub async fn send_egress(
        &self,
        session_id: &str,
        message: &EgressMessage,
    ) -> Result<(), ApiError> {
        let endpoint = realtime_endpoint(&self.config.sse_egress_url, session_id, &self.api_key)?;
        self.send(self.http.post(endpoint).json(message)).await?;
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(ApiError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        if !status.is_success() {
            return Err(ApiError::HttpStatus { status, body });
        }
        Ok(body)
    }
}

impl std::fmt::Debug for SessionApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds `{endpoint}?sessionId=..&apiKey=..` for realtime and egress URLs.
pub(crate) fn realtime_endpoint(
    endpoint: &str,
    session_id: &str,
    api_key: &SecretString,
) -> Result<Url, ApiError> {
    Url::parse_with_params(
        endpoint,
        &[("sessionId", session_id), ("apiKey", api_key.expose_secret())],
    )
    .map_err(|err| ApiError::InvalidEndpoint(format!("{endpoint}: {err}")))
}

/// Wire body for `POST /sessions`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateSessionRequest {
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub auto_trigger: Option<AutoTrigger>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    #[error("http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),
}

impl ApiError {
    /// Human-readable failure reason.
    ///
    /// For HTTP failures the body's `error`, `message`, `error_message`, and
    /// `error_description` fields are tried in that order, then the raw body,
    /// then the status line.
    pub fn message(&self) -> String {
        match self {
            Self::HttpStatus { status, body } => {
                extract_error_message(body).unwrap_or_else(|| format!("http status {status}"))
            }
            Self::Transport(err) => err.to_string(),
            Self::Parse(detail) | Self::InvalidEndpoint(detail) => detail.clone(),
        }
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    const FIELDS: [&str; 4] = ["error", "message", "error_message", "error_description"];

    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        let found = FIELDS
            .iter()
            .filter_map(|name| fields.get(*name))
            .find_map(|value| match value {
                Value::Null | Value::Bool(false) => None,
                Value::String(text) if text.is_empty() => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            });
        if found.is_some() {
            return found;
        }
    }

    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_create_response(body: &str) -> Result<Value, ApiError> {
    #[derive(Debug, Deserialize)]
    struct Envelope {
        data: Option<Value>,
    }

    let envelope: Envelope =
        serde_json::from_str(body).map_err(|err| ApiError::Parse(err.to_string()))?;
    envelope
        .data
        .ok_or_else(|| ApiError::Parse("create response missing data".to_string()))
}
