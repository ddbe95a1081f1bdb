//! Session lifecycle on top of a realtime transport.
//!
//! A [`Session`] creates (or attaches to) one remote agent session, opens the
//! transport chosen by [`ConnectStrategy`], and re-emits everything the
//! transport reports to locally registered listeners. A `complete` event ends
//! the session automatically.
//!
//! Register listeners before calling [`Session::create`] or
//! [`Session::connect`]: transports start connecting immediately.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, CreateSessionRequest, SessionApiClient};
use crate::events::{Listeners, SessionEvent, SessionEventName, Subscription};
use crate::transport::{
    self, ConnectStrategy, EventSink, Transport, TransportContext, NORMAL_CLOSURE,
};
use crate::trigger::{AutoTrigger, AutoTriggerError};

const DEFAULT_END_REASON: &str = "Ending session from client";
const COMPLETED_END_REASON: &str = "Session completed";
const REPLACED_REASON: &str = "Transport replaced";

/// Lifecycle of a [`Session`].
///
/// Transitions only move forward. `Errored` is reachable from every
/// non-terminal state; `Ended` and `Errored` are terminal until the session is
/// explicitly re-attached with [`Session::connect`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum SessionState {
    #[default]
    Unstarted,
    Creating,
    /// Created with a deferred auto-trigger; no transport is opened.
    AwaitingTrigger,
    Connecting,
    Connected,
    /// At least one agent event has arrived.
    Active,
    Ending,
    Ended,
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Errored)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Unstarted => 0,
            Self::Creating => 1,
            Self::AwaitingTrigger => 2,
            Self::Connecting => 3,
            Self::Connected => 4,
            Self::Active => 5,
            Self::Ending => 6,
            Self::Ended | Self::Errored => 7,
        }
    }

    fn can_advance_to(self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Errored || next.rank() > self.rank()
    }
}

/// Failures returned by [`Session`] operations.
///
/// Transport problems are never returned here; they are emitted as
/// `session_error` events.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Input rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// The create or fetch call failed.
    #[error("{0}")]
    Request(String),
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        Self::Request(err.message())
    }
}

impl From<AutoTriggerError> for SessionError {
    fn from(err: AutoTriggerError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Arguments for [`Session::create`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateSessionInput {
    /// What the agent should accomplish.
    pub goal: String,
    /// Optional starting page.
    pub url: Option<String>,
    /// Recurring schedule; with `start_now == false` the session is only
    /// registered and no transport is opened.
    pub with_auto_trigger: Option<AutoTrigger>,
    pub connect_strategy: ConnectStrategy,
    /// When set, an auto-trigger `end_at` earlier than this instant is
    /// rejected before the create call.
    pub not_before: Option<DateTime<Utc>>,
}

impl CreateSessionInput {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_auto_trigger(mut self, trigger: AutoTrigger) -> Self {
        self.with_auto_trigger = Some(trigger);
        self
    }

    pub fn with_connect_strategy(mut self, strategy: ConnectStrategy) -> Self {
        self.connect_strategy = strategy;
        self
    }

    /// Rejects an auto-trigger whose `end_at` lies before `now`.
    pub fn reject_end_at_before(mut self, now: DateTime<Utc>) -> Self {
        self.not_before = Some(now);
        self
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.goal.trim().is_empty() {
            return Err(SessionError::Validation("goal is required".to_string()));
        }
        match (&self.with_auto_trigger, self.not_before) {
            (Some(trigger), Some(now)) => trigger.validate_at(now)?,
            (Some(trigger), None) => trigger.validate()?,
            (None, _) => {}
        }
        Ok(())
    }

    fn defers_start(&self) -> bool {
        self.with_auto_trigger
            .as_ref()
            .map_or(false, |trigger| !trigger.start_now)
    }

    fn to_request(&self) -> CreateSessionRequest {
        CreateSessionRequest {
            goal: self.goal.clone(),
            url: self.url.clone(),
            auto_trigger: self.with_auto_trigger.clone(),
        }
    }
}

/// One remote agent session.
///
/// Cloning is cheap; clones share state, listeners, and the transport.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: SessionApiClient,
    core: Mutex<SessionCore>,
    listeners: Arc<Listeners>,
}

#[derive(Default)]
struct SessionCore {
    session_id: Option<String>,
    state: SessionState,
    strategy: Option<ConnectStrategy>,
    transport: Option<Arc<dyn Transport>>,
    /// Generation of the current transport; events tagged with an older
    /// epoch are dropped.
    epoch: u64,
    auto_ended: bool,
}

impl SessionCore {
    fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

impl Session {
    pub fn new(api: SessionApiClient) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                core: Mutex::new(SessionCore::default()),
                listeners: Arc::new(Listeners::default()),
            }),
        }
    }

    /// Creates the session server-side and, unless the start is deferred to an
    /// auto-trigger, opens the realtime transport.
    ///
    /// Returns the `data` object of the create response.
    pub async fn create(&self, input: CreateSessionInput) -> Result<Value, SessionError> {
        input.validate()?;
        {
            let mut core = self.inner.core();
            if core.state != SessionState::Unstarted {
                return Err(SessionError::Validation(
                    "session has already been started".to_string(),
                ));
            }
            core.advance(SessionState::Creating);
        }

        let deferred = input.defers_start();
        debug!(
            event = "session_create_started",
            strategy = %input.connect_strategy,
            deferred,
        );

        let data = match self.inner.api.create_session(&input.to_request()).await {
            Ok(data) => data,
            Err(err) => {
                warn!(event = "session_create_failed", error = %err);
                self.inner.core().advance(SessionState::Errored);
                return Err(err.into());
            }
        };
        let session_id = data
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if deferred {
            {
                let mut core = self.inner.core();
                ensure_still_creating(&core)?;
                core.session_id = session_id;
                core.advance(SessionState::AwaitingTrigger);
            }
            info!(event = "session_awaiting_trigger");
            self.inner.listeners.emit(&SessionEvent::Created(data.clone()));
            return Ok(data);
        }

        let Some(session_id) = session_id else {
            self.inner.core().advance(SessionState::Errored);
            return Err(SessionError::Request(
                "create response did not include a sessionId".to_string(),
            ));
        };

        {
            let mut core = self.inner.core();
            ensure_still_creating(&core)?;
            core.session_id = Some(session_id.clone());
        }

        info!(event = "session_created", session_id = %session_id);
        self.inner
            .listeners
            .emit(&SessionEvent::Created(json!({ "sessionId": session_id })));
        self.inner
            .attach(&session_id, input.connect_strategy, |_| Ok(()))?;
        Ok(data)
    }

    /// Attaches to an existing session without creating one.
    ///
    /// Calling this on a session that already has a transport replaces it;
    /// events from the old transport are no longer delivered.
    pub async fn connect(
        &self,
        session_id: &str,
        strategy: ConnectStrategy,
    ) -> Result<(), SessionError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SessionError::Validation(
                "Session ID is required".to_string(),
            ));
        }

        self.inner.attach(session_id, strategy, |core| {
            if core.state == SessionState::Creating {
                return Err(SessionError::Validation(
                    "session is still being created".to_string(),
                ));
            }
            match core.session_id.as_deref() {
                Some(existing) if existing != session_id => Err(SessionError::Validation(
                    format!("session is bound to {existing}; cannot attach to {session_id}"),
                )),
                _ => Ok(()),
            }
        })
    }

    /// Fetches the current server-side snapshot of the session.
    pub async fn get_session_data(&self) -> Result<Value, SessionError> {
        let session_id = self
            .session_id()
            .ok_or_else(|| SessionError::Validation("Session ID is required".to_string()))?;
        Ok(self.inner.api.get_session(&session_id).await?)
    }

    /// Answers a pending `admin_permission_request`. A no-op without a
    /// transport.
    pub fn handle_permission_request(&self, granted: bool) {
        if let Some(transport) = self.inner.transport("handle_permission_request") {
            transport.handle_permission_request(granted);
        }
    }

    /// Answers a pending `request_user_input`. A no-op without a transport.
    pub fn handle_input(&self, input: &str) {
        if let Some(transport) = self.inner.transport("handle_input") {
            transport.handle_input(input);
        }
    }

    /// Closes the transport with code 1000.
    ///
    /// `reason` defaults to `"Ending session from client"`. Calling `end`
    /// again while ending or after the session ended does nothing.
    pub fn end(&self, reason: Option<&str>) {
        self.inner.end(reason.unwrap_or(DEFAULT_END_REASON));
    }

    /// Registers `handler` for events named `name`.
    pub fn on<F>(&self, name: SessionEventName, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(Some(name), Arc::new(handler))
    }

    /// Registers `handler` for every event.
    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(None, Arc::new(handler))
    }

    /// Returns a receiver of every event emitted from now on. Dropping the
    /// receiver unregisters it.
    pub fn events(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.inner.listeners.channel()
    }

    pub fn state(&self) -> SessionState {
        self.inner.core().state
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.core().session_id.clone()
    }

    /// Strategy of the current (or last) transport.
    pub fn strategy(&self) -> Option<ConnectStrategy> {
        self.inner.core().strategy
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core();
        f.debug_struct("Session")
            .field("session_id", &core.session_id)
            .field("state", &core.state)
            .field("strategy", &core.strategy)
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

/// A `connect` may have bound the session while the create call was in
/// flight; the create result must not overwrite it.
fn ensure_still_creating(core: &SessionCore) -> Result<(), SessionError> {
    if core.state != SessionState::Creating || core.session_id.is_some() {
        return Err(SessionError::Validation(
            "session was attached while it was being created".to_string(),
        ));
    }
    Ok(())
}

impl SessionInner {
    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self, operation: &'static str) -> Option<Arc<dyn Transport>> {
        let transport = self.core().transport.clone();
        if transport.is_none() {
            debug!(event = "session_control_ignored", operation, reason = "no transport");
        }
        transport
    }

    /// Installs a fresh transport under a new epoch and closes the old one.
    ///
    /// `admit` runs under the same lock as the bind, so concurrent callers
    /// cannot both pass it.
    fn attach<F>(
        self: &Arc<Self>,
        session_id: &str,
        strategy: ConnectStrategy,
        admit: F,
    ) -> Result<(), SessionError>
    where
        F: FnOnce(&SessionCore) -> Result<(), SessionError>,
    {
        let previous = {
            let mut core = self.core();
            if let Err(err) = admit(&core) {
                debug!(event = "session_attach_rejected", session_id, error = %err);
                return Err(err);
            }
            core.epoch += 1;
            core.session_id = Some(session_id.to_string());
            core.strategy = Some(strategy);
            core.state = SessionState::Connecting;
            core.auto_ended = false;

            let context =
                TransportContext::new(session_id, self.api.clone(), self.sink(core.epoch));
            core.transport.replace(transport::open(strategy, context))
        };

        info!(
            event = "session_transport_opened",
            session_id,
            strategy = %strategy,
            replaced = previous.is_some(),
        );
        if let Some(previous) = previous {
            previous.close(NORMAL_CLOSURE, REPLACED_REASON);
        }
        Ok(())
    }

    fn sink(self: &Arc<Self>, epoch: u64) -> EventSink {
        let session = Arc::downgrade(self);
        EventSink::new(move |event| {
            if let Some(session) = session.upgrade() {
                session.dispatch(epoch, event);
            }
        })
    }

    /// Applies a transport event to the lifecycle, then notifies listeners.
    fn dispatch(&self, epoch: u64, event: SessionEvent) {
        let (auto_end, retired) = {
            let mut core = self.core();
            if core.epoch != epoch {
                debug!(
                    event = "session_stale_event_dropped",
                    event_name = %event.name(),
                    epoch,
                    current_epoch = core.epoch,
                );
                return;
            }

            match &event {
                SessionEvent::Connected { .. } => {
                    core.advance(SessionState::Connected);
                }
                SessionEvent::Message(_) => {
                    core.advance(SessionState::Active);
                }
                SessionEvent::Disconnected { code, .. } => {
                    let next = if core.state == SessionState::Ending || *code == NORMAL_CLOSURE {
                        SessionState::Ended
                    } else {
                        SessionState::Errored
                    };
                    core.advance(next);
                }
                SessionEvent::Created(_) | SessionEvent::Error { .. } => {}
            }

            let completed = event.as_message().map_or(false, |message| message.is_complete());
            let auto_end = completed && !core.auto_ended && !core.state.is_terminal();
            if auto_end {
                core.auto_ended = true;
            }

            let retired = if core.state.is_terminal() {
                core.epoch += 1;
                core.transport.take()
            } else {
                None
            };
            (auto_end, retired)
        };

        self.listeners.emit(&event);

        if auto_end {
            self.end(COMPLETED_END_REASON);
        }
        drop(retired);
    }

    fn end(&self, reason: &str) {
        let (transport, session_id) = {
            let mut core = self.core();
            if matches!(
                core.state,
                SessionState::Ending | SessionState::Ended | SessionState::Errored
            ) {
                debug!(event = "session_end_ignored", state = ?core.state);
                return;
            }
            let Some(transport) = core.transport.clone() else {
                debug!(event = "session_end_ignored", reason = "no transport");
                return;
            };
            core.advance(SessionState::Ending);
            (transport, core.session_id.clone().unwrap_or_default())
        };

        info!(event = "session_ending", session_id = %session_id, reason);
        transport.close(NORMAL_CLOSURE, reason);
    }
}
