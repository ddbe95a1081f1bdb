use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of agent event kinds delivered by either transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    BrowserStarted,
    ActionRun,
    ThoughtsAndMemories,
    ExternalResourceRequested,
    Complete,
    Error,
    #[serde(alias = "hearbeat")]
    Heartbeat,
    Connected,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Started,
        EventKind::BrowserStarted,
        EventKind::ActionRun,
        EventKind::ThoughtsAndMemories,
        EventKind::ExternalResourceRequested,
        EventKind::Complete,
        EventKind::Error,
        EventKind::Heartbeat,
        EventKind::Connected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::BrowserStarted => "browser_started",
            Self::ActionRun => "action_run",
            Self::ThoughtsAndMemories => "thoughts_and_memories",
            Self::ExternalResourceRequested => "external_resource_requested",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::Connected => "connected",
        }
    }

    /// Maps a wire event name to a kind, accepting the legacy `hearbeat`
    /// spelling some servers still emit.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "hearbeat" => Some(Self::Heartbeat),
            other => Self::ALL.into_iter().find(|kind| kind.as_str() == other),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_wire(value).ok_or_else(|| format!("unknown event kind: {value}"))
    }
}

/// Normalized `{event, data}` message that both transports converge to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalEvent {
    pub event: EventKind,
    #[serde(default)]
    pub data: Value,
}

impl CanonicalEvent {
    pub fn new(event: EventKind, data: Value) -> Self {
        Self { event, data }
    }

    pub fn is_complete(&self) -> bool {
        self.event == EventKind::Complete
    }

    /// Returns the pending request kind when the agent is waiting on the caller.
    pub fn resource_request(&self) -> Option<ResourceType> {
        if self.event != EventKind::ExternalResourceRequested {
            return None;
        }
        self.data
            .get("resource_type")
            .and_then(Value::as_str)
            .and_then(ResourceType::from_wire)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    AdminPermissionRequest,
    RequestUserInput,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdminPermissionRequest => "admin_permission_request",
            Self::RequestUserInput => "request_user_input",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        match name {
            "admin_permission_request" => Some(Self::AdminPermissionRequest),
            "request_user_input" => Some(Self::RequestUserInput),
            _ => None,
        }
    }
}

/// Caller's answer to an external resource request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub resource_type: ResourceType,
    pub granted: bool,
}

impl ResourceGrant {
    pub fn permission(granted: bool) -> Self {
        Self {
            input: None,
            resource_type: ResourceType::AdminPermissionRequest,
            granted,
        }
    }

    pub fn input(text: impl Into<String>) -> Self {
        Self {
            input: Some(text.into()),
            resource_type: ResourceType::RequestUserInput,
            granted: true,
        }
    }
}

/// Frame written to the duplex socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    ExternalResourceGranted(ResourceGrant),
}

impl ClientFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Body posted to the SSE egress endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EgressMessage {
    ExternalResourceGranted(ResourceGrant),
}
