//! Rust SDK for creating and steering Assisfy agent sessions.
//!
//! The crate is organized by surface:
//! - `client`: credentials and environment selection; hands out sessions.
//! - `session`: lifecycle, event re-emission, and control calls.
//! - `transport`: websocket (`duplex`) and SSE (`stream`) realtime transports.
//! - `api`: REST calls for session creation, snapshots, and SSE egress.
//! - `proto`: canonical event and control payload types.

/// REST client and request types.
pub mod api;
/// SDK entry point.
pub mod client;
/// Environment presets and endpoint overrides.
pub mod config;
/// Session events and listener registrations.
pub mod events;
/// Wire types shared by both transports.
pub mod proto;
/// Reconnect backoff for realtime subscriptions.
pub mod retry;
/// Session state machine and orchestration.
pub mod session;
/// Realtime transport implementations.
pub mod transport;
/// Auto-trigger schedule and validation.
pub mod trigger;

pub use client::AssisfyClient;
pub use config::{Environment, SdkConfig};
pub use events::{SessionEvent, SessionEventName, Subscription};
pub use proto::{CanonicalEvent, EventKind, ResourceType};
pub use session::{CreateSessionInput, Session, SessionError, SessionState};
pub use transport::ConnectStrategy;
pub use trigger::AutoTrigger;
