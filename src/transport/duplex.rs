//! Websocket transport.
//!
//! A background worker owns the socket. Inbound text frames are already in
//! canonical `{event, data}` shape; outbound control frames are queued on an
//! unbounded channel, so calls made before the socket opens are delivered
//! once it does.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use crate::api::realtime_endpoint;
use crate::events::SessionEvent;
use crate::proto::{CanonicalEvent, ClientFrame, ResourceGrant};
use crate::transport::{
    ConnectStrategy, Transport, TransportContext, TransportError, ABNORMAL_CLOSURE,
    NORMAL_CLOSURE,
};

const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug)]
enum DuplexCommand {
    Send(ClientFrame),
    Close { code: u16, reason: String },
}

/// Websocket-backed [`Transport`].
#[derive(Debug)]
pub struct DuplexTransport {
    context: TransportContext,
    commands: mpsc::UnboundedSender<DuplexCommand>,
    closing: AtomicBool,
}

impl DuplexTransport {
    /// Spawns the socket worker and returns immediately.
    pub fn connect(context: TransportContext) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(duplex_worker(context.clone(), command_rx));

        Self {
            context,
            commands,
            closing: AtomicBool::new(false),
        }
    }

    fn send_frame(&self, frame: ClientFrame) {
        if self.closing.load(Ordering::SeqCst) {
            self.context
                .emit_error("websocket is closing; control frame not sent");
            return;
        }
        if self.commands.send(DuplexCommand::Send(frame)).is_err() {
            self.context
                .emit_error("websocket is closed; control frame not sent");
        }
    }
}

impl Transport for DuplexTransport {
    fn strategy(&self) -> ConnectStrategy {
        ConnectStrategy::Duplex
    }

    fn handle_permission_request(&self, granted: bool) {
        self.send_frame(ClientFrame::ExternalResourceGranted(
            ResourceGrant::permission(granted),
        ));
    }

    fn handle_input(&self, input: &str) {
        self.send_frame(ClientFrame::ExternalResourceGranted(ResourceGrant::input(
            input,
        )));
    }

    fn close(&self, code: u16, reason: &str) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let command = DuplexCommand::Close {
            code,
            reason: reason.to_string(),
        };
        if self.commands.send(command).is_err() {
            debug!(
                event = "duplex_close_ignored",
                session_id = %self.context.session_id,
            );
        }
    }
}

/// Close handshake result reported as `session_disconnected`.
struct Closed {
    code: u16,
    reason: String,
}

async fn duplex_worker(
    context: TransportContext,
    mut commands: mpsc::UnboundedReceiver<DuplexCommand>,
) {
    let closed = match run_socket(&context, &mut commands).await {
        Ok(closed) => closed,
        Err(err) => {
            warn!(
                event = "duplex_connection_failed",
                session_id = %context.session_id,
                error = %err,
            );
            context.emit_error(&err);
            Closed {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            }
        }
    };

    debug!(
        event = "duplex_disconnected",
        session_id = %context.session_id,
        code = closed.code,
    );
    context.sink.emit(SessionEvent::Disconnected {
        session_id: context.session_id.clone(),
        code: closed.code,
        reason: closed.reason,
    });
}

async fn run_socket(
    context: &TransportContext,
    commands: &mut mpsc::UnboundedReceiver<DuplexCommand>,
) -> Result<Closed, TransportError> {
    let api_key = context.api.api_key();
    let url = realtime_endpoint(
        &context.api.config().socket_url,
        &context.session_id,
        api_key,
    )?;
    let mut request = url.as_str().into_client_request()?;
    let api_key_header = api_key.expose_secret().parse()?;
    request.headers_mut().insert("x-api-key", api_key_header);

    let (mut socket, _) = connect_async(request).await?;
    context.sink.emit(SessionEvent::Connected {
        session_id: context.session_id.clone(),
    });

    let mut requested_close: Option<Closed> = None;

    loop {
        tokio::select! {
            maybe_command = commands.recv(), if requested_close.is_none() => {
                match maybe_command {
                    Some(DuplexCommand::Send(frame)) => {
                        let text = frame.to_text()?;
                        socket.send(Message::Text(text)).await?;
                    }
                    Some(DuplexCommand::Close { code, reason }) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::Owned(reason.clone()),
                        };
                        if socket.close(Some(frame)).await.is_err() {
                            return Ok(Closed { code, reason });
                        }
                        requested_close = Some(Closed { code, reason });
                    }
                    None => {
                        let _ = socket.close(None).await;
                        return Ok(Closed {
                            code: NORMAL_CLOSURE,
                            reason: String::new(),
                        });
                    }
                }
            }
            maybe_inbound = socket.next() => {
                match maybe_inbound {
                    Some(Ok(Message::Text(text))) => forward_frame(context, &text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => forward_frame(context, &text),
                        Err(err) => context.emit_error(format!("malformed frame: {err}")),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        socket.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(requested) = requested_close {
                            return Ok(requested);
                        }
                        return Ok(match frame {
                            Some(frame) => Closed {
                                code: u16::from(frame.code),
                                reason: frame.reason.into_owned(),
                            },
                            None => Closed {
                                code: NO_STATUS_RECEIVED,
                                reason: String::new(),
                            },
                        });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))
                        if requested_close.is_some() =>
                    {
                        return Ok(requested_close.unwrap_or(Closed {
                            code: NORMAL_CLOSURE,
                            reason: String::new(),
                        }));
                    }
                    Some(Err(err)) => return Err(err.into()),
                    None => {
                        return Ok(requested_close.unwrap_or(Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                        }));
                    }
                }
            }
        }
    }
}

/// Decodes one inbound frame. Malformed JSON and unknown event kinds are
/// reported as `session_error`; the connection stays up.
fn forward_frame(context: &TransportContext, text: &str) {
    match CanonicalEvent::from_text(text) {
        Ok(event) => context.sink.emit(SessionEvent::Message(event)),
        Err(err) => {
            debug!(
                event = "duplex_frame_rejected",
                session_id = %context.session_id,
                error = %err,
            );
            context.emit_error(TransportError::MalformedFrame(err));
        }
    }
}
