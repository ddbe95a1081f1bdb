//! Realtime transports.
//!
//! - `duplex`: websocket carrying events in and control frames out.
//! - `stream`: SSE subscription for events, HTTP egress for control.
//! - `sse`: incremental `text/event-stream` decoder used by `stream`.
//!
//! Both variants start connecting inside their constructor and report
//! everything through an [`EventSink`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::api::{ApiError, SessionApiClient};
use crate::events::SessionEvent;

/// Websocket-backed transport.
pub mod duplex;
/// SSE decoder.
pub mod sse;
/// SSE-backed transport with HTTP egress.
pub mod stream;

pub use duplex::DuplexTransport;
pub use stream::StreamTransport;

/// Close code for a normal, requested shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Control surface shared by both transports.
///
/// Methods never block and never fail: delivery problems are reported as
/// [`SessionEvent::Error`] through the transport's sink.
pub trait Transport: Send + Sync + fmt::Debug {
    fn strategy(&self) -> ConnectStrategy;

    /// Answers an `admin_permission_request`.
    fn handle_permission_request(&self, granted: bool);

    /// Answers a `request_user_input` request.
    fn handle_input(&self, input: &str);

    /// Starts closing the connection. Later calls are no-ops.
    fn close(&self, code: u16, reason: &str);
}

/// Which transport a session uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStrategy {
    /// Persistent websocket.
    #[serde(alias = "websocket", alias = "ws")]
    Duplex,
    /// Server-sent events plus HTTP egress.
    #[default]
    #[serde(alias = "sse")]
    Stream,
}

impl ConnectStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duplex => "duplex",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for ConnectStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "duplex" | "websocket" | "ws" => Ok(Self::Duplex),
            "stream" | "sse" => Ok(Self::Stream),
            other => Err(format!("unknown connect strategy: {other}")),
        }
    }
}

/// Destination for events produced by a transport.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(SessionEvent) + Send + Sync>);

impl EventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(deliver))
    }

    pub fn emit(&self, event: SessionEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Everything a transport needs to open its connection.
#[derive(Clone, Debug)]
pub struct TransportContext {
    pub session_id: String,
    pub api: SessionApiClient,
    pub sink: EventSink,
}

impl TransportContext {
    pub fn new(session_id: impl Into<String>, api: SessionApiClient, sink: EventSink) -> Self {
        Self {
            session_id: session_id.into(),
            api,
            sink,
        }
    }

    pub(crate) fn emit_error(&self, error: impl fmt::Display) {
        self.sink.emit(SessionEvent::Error {
            session_id: self.session_id.clone(),
            error: error.to_string(),
        });
    }
}

/// Constructs the transport for `strategy`; it begins connecting immediately.
///
/// Must be called from within a tokio runtime.
pub fn open(strategy: ConnectStrategy, context: TransportContext) -> Arc<dyn Transport> {
    match strategy {
        ConnectStrategy::Duplex => Arc::new(DuplexTransport::connect(context)),
        ConnectStrategy::Stream => Arc::new(StreamTransport::connect(context)),
    }
}

/// Connection-level and adapter failures, reported as `session_error` text.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("event stream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("event stream rejected with http status {0}")]
    HttpStatus(reqwest::StatusCode),

    /// The server refused the subscription; retrying will not help.
    #[error("{}", .0.message())]
    Rejected(ApiError),

    #[error("event stream has unexpected content type {0:?}")]
    UnexpectedContentType(String),

    #[error("invalid api-key header: {0}")]
    InvalidApiKeyHeader(#[from] InvalidHeaderValue),

    #[error("{0}")]
    Endpoint(#[from] ApiError),

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("event stream ended")]
    StreamEnded,
}

impl TransportError {
    /// Whether reconnecting cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_) | Self::UnexpectedContentType(_) | Self::Endpoint(_)
        )
    }
}
