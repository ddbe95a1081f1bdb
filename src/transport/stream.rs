//! SSE transport with HTTP egress.
//!
//! Agent events arrive on a long-lived `text/event-stream` subscription that
//! is reopened with backoff whenever it drops. A refused subscription (a
//! client error status or a non-SSE content type) is not retried; it ends the
//! transport with `session_disconnected` code 1006. Control messages travel
//! on separate `POST` requests to the egress endpoint.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::api::{realtime_endpoint, ApiError};
use crate::events::SessionEvent;
use crate::proto::{CanonicalEvent, EgressMessage, EventKind, ResourceGrant};
use crate::transport::sse::{SseDecoder, SseEvent};
use crate::transport::{
    ConnectStrategy, Transport, TransportContext, TransportError, ABNORMAL_CLOSURE,
};

const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// SSE-backed [`Transport`].
#[derive(Debug)]
pub struct StreamTransport {
    context: TransportContext,
    runtime: Handle,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl StreamTransport {
    /// Spawns the subscription worker and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(context: TransportContext) -> Self {
        let runtime = Handle::current();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        runtime.spawn(subscription_worker(context.clone(), shutdown_rx));

        Self {
            context,
            runtime,
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }

    fn post_grant(&self, grant: ResourceGrant, failure: &'static str) {
        let context = self.context.clone();
        self.runtime.spawn(async move {
            let message = EgressMessage::ExternalResourceGranted(grant);
            if let Err(err) = context.api.send_egress(&context.session_id, &message).await {
                warn!(
                    event = "stream_egress_failed",
                    session_id = %context.session_id,
                    error = %err,
                );
                context.emit_error(format!("{failure}: {}", err.message()));
            }
        });
    }
}

impl Transport for StreamTransport {
    fn strategy(&self) -> ConnectStrategy {
        ConnectStrategy::Stream
    }

    fn handle_permission_request(&self, granted: bool) {
        self.post_grant(
            ResourceGrant::permission(granted),
            "Error granting permission",
        );
    }

    fn handle_input(&self, input: &str) {
        self.post_grant(ResourceGrant::input(input), "Error handling input");
    }

    fn close(&self, code: u16, reason: &str) {
        let shutdown = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(shutdown) = shutdown else {
            return;
        };
        let _ = shutdown.send(());

        debug!(
            event = "stream_closed",
            session_id = %self.context.session_id,
            code,
        );
        self.context.sink.emit(SessionEvent::Disconnected {
            session_id: self.context.session_id.clone(),
            code,
            reason: reason.to_string(),
        });
    }
}

/// Resume point carried across reconnects.
#[derive(Debug, Default)]
struct Cursor {
    last_event_id: Option<String>,
    retry_hint: Option<Duration>,
    attempt: usize,
}

async fn subscription_worker(context: TransportContext, mut shutdown: oneshot::Receiver<()>) {
    let policy = context.api.config().reconnect.clone();
    let mut cursor = Cursor::default();

    loop {
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => return,
            outcome = run_subscription(&context, &mut cursor) => outcome,
        };

        let err = match outcome {
            Ok(()) => TransportError::StreamEnded,
            Err(err) => err,
        };
        if err.is_terminal() {
            warn!(
                event = "stream_subscription_rejected",
                session_id = %context.session_id,
                error = %err,
            );
            context.emit_error(&err);
            context.sink.emit(SessionEvent::Disconnected {
                session_id: context.session_id.clone(),
                code: ABNORMAL_CLOSURE,
                reason: err.to_string(),
            });
            return;
        }
        warn!(
            event = "stream_subscription_dropped",
            session_id = %context.session_id,
            error = %err,
        );
        context.emit_error(&err);

        cursor.attempt += 1;
        let delay = policy.delay_for_attempt(cursor.attempt, cursor.retry_hint);
        debug!(
            event = "stream_reconnect_scheduled",
            session_id = %context.session_id,
            attempt = cursor.attempt,
            delay_ms = delay.as_millis() as u64,
        );

        tokio::select! {
            biased;
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_subscription(
    context: &TransportContext,
    cursor: &mut Cursor,
) -> Result<(), TransportError> {
    let api_key = context.api.api_key();
    let url = realtime_endpoint(
        &context.api.config().sse_url,
        &context.session_id,
        api_key,
    )?;

    let mut request = context
        .api
        .http()
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header("x-api-key", api_key.expose_secret());
    if let Some(last_event_id) = cursor.last_event_id.as_deref() {
        request = request.header(LAST_EVENT_ID_HEADER, last_event_id);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        if !rejection_is_final(status) {
            return Err(TransportError::HttpStatus(status));
        }
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Rejected(ApiError::HttpStatus { status, body }));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_event_stream(content_type) {
        return Err(TransportError::UnexpectedContentType(content_type.to_string()));
    }

    cursor.attempt = 0;
    context.sink.emit(SessionEvent::Connected {
        session_id: context.session_id.clone(),
    });

    let mut decoder = SseDecoder::new();
    let mut body = Box::pin(response.bytes_stream());
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for event in decoder.feed(&chunk) {
            dispatch_event(context, cursor, event);
        }
    }
    if let Some(event) = decoder.finish() {
        dispatch_event(context, cursor, event);
    }

    Ok(())
}

/// Client errors other than timeouts and rate limits will not change on retry.
fn rejection_is_final(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
}

fn dispatch_event(context: &TransportContext, cursor: &mut Cursor, event: SseEvent) {
    if event.id.is_some() {
        cursor.last_event_id = event.id;
    }
    if event.retry.is_some() {
        cursor.retry_hint = event.retry;
    }

    let Some(name) = event.event.as_deref() else {
        return;
    };
    let Some(kind) = EventKind::from_wire(name) else {
        debug!(
            event = "stream_event_ignored",
            session_id = %context.session_id,
            event_name = name,
        );
        return;
    };

    match serde_json::from_str::<Value>(&event.data) {
        Ok(data) => context
            .sink
            .emit(SessionEvent::Message(CanonicalEvent::new(kind, data))),
        Err(err) => context.emit_error(format!("Error parsing event data: {err}")),
    }
}
