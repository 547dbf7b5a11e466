//! Client sessions.
//!
//! A [`Session`] is one authenticated connection. It registers with the
//! hub, spawns a write loop that owns the socket sink, and runs the read
//! loop on the calling task until either side ends:
//!
//! - read loop: inbound frames, control messages, read deadline, abuse limits
//! - write loop: outbound queue, heartbeat pings, token expiry
//!
//! The two halves never share state. Replies that must stay ordered with
//! other traffic (`pong`) go through the hub; errors and close frames the
//! read loop needs out immediately go over a small control queue.

mod frame;
mod state;
mod writer;

pub use frame::{CloseReason, Frame};
pub use state::{InvalidTransition, SessionState};

use crate::config::HubConfig;
use crate::events::outbound_channel;
use crate::hub::{ConnectionHandle, ConnectionId, HubError, HubHandle};
use cvewire_sdk::objects::{ClientMessage, Envelope, ErrorCode, Identity, WsCloseCode};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use writer::{WriteEnd, Writer};

/// Grace period for the write loop to flush its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const CONTROL_BUFFER: usize = 8;

const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Per-session limits, captured from [`HubConfig`] when the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub send_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    pub read_deadline: Duration,
    pub token_expiry_warning: Duration,
    pub max_message_size: usize,
    pub max_malformed_messages: u32,
}

impl From<&HubConfig> for SessionConfig {
    fn from(config: &HubConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity,
            heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT),
            read_deadline: config.read_deadline,
            token_expiry_warning: config.token_expiry_warning,
            max_message_size: config.max_message_size,
            max_malformed_messages: config.max_malformed_messages,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The hub refused the connection; the client was sent an `error`
    /// envelope and a close frame.
    #[error("registration refused: {0}")]
    Registration(#[from] HubError),
}

/// Why a registered session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The client sent a close frame.
    ClientClosed,
    /// The inbound stream ended without a close frame.
    Disconnected,
    ReadError,
    ReadTimeout,
    MessageTooLarge,
    TooManyMalformed,
    TokenExpired,
    /// The hub dropped the connection (unregister, eviction or shutdown).
    Unregistered,
    WriteFailed,
}

impl From<WriteEnd> for CloseCause {
    fn from(end: WriteEnd) -> Self {
        match end {
            WriteEnd::QueueClosed => CloseCause::Unregistered,
            WriteEnd::TokenExpired => CloseCause::TokenExpired,
            // Only the read loop requests close frames, and it reports its
            // own cause first.
            WriteEnd::CloseSent => CloseCause::ClientClosed,
            WriteEnd::Failed => CloseCause::WriteFailed,
        }
    }
}

pub struct Session {
    id: ConnectionId,
    identity: Identity,
    hub: HubHandle,
    config: SessionConfig,
    state: SessionState,
}

impl Session {
    pub fn new(identity: Identity, hub: HubHandle, config: SessionConfig) -> Self {
        Self {
            id: ConnectionId::new(),
            identity,
            hub,
            config,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        match self.state.transition(next) {
            Ok(state) => {
                debug!(connection_id = %self.id, from = ?self.state, to = ?state, "Session state changed");
                self.state = state;
            }
            Err(e) => warn!(connection_id = %self.id, error = %e, "Ignoring session transition"),
        }
    }

    /// Drive the session to completion over a split socket.
    pub async fn run<S, R, E>(mut self, mut sink: S, mut stream: R) -> Result<CloseCause, SessionError>
    where
        S: Sink<Frame> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        let (outbound_tx, outbound_rx) = outbound_channel(self.config.send_queue_capacity);
        let handle = ConnectionHandle::new(self.id, &self.identity, outbound_tx);

        if let Err(e) = self.hub.register(handle).await {
            info!(
                connection_id = %self.id,
                user_id = %self.identity.user_id,
                error = %e,
                "Session registration refused"
            );
            let close_code = match e {
                HubError::ConnectionLimitExceeded { .. } => WsCloseCode::MAX_CONNECTIONS,
                _ => WsCloseCode::INTERNAL_ERROR,
            };
            if let Ok(text) = Envelope::error(e.error_code(), e.to_string()).to_json() {
                let _ = sink.send(Frame::Text(text)).await;
            }
            let _ = sink.send(Frame::close(close_code, e.to_string())).await;
            self.transition(SessionState::Closed);
            return Err(SessionError::Registration(e));
        }
        self.transition(SessionState::Registered);

        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let mut writer = tokio::spawn(
            Writer {
                sink,
                outbound_rx,
                control_rx,
                hub: self.hub.clone(),
                id: self.id,
                expires_at: self.identity.expires_at,
                heartbeat_interval: self.config.heartbeat_interval,
                token_expiry_warning: self.config.token_expiry_warning,
            }
            .run(),
        );

        let mut writer_end = None;
        let cause = tokio::select! {
            biased;
            cause = self.read_loop(&mut stream, &control_tx) => cause,
            end = &mut writer => {
                let end = end.unwrap_or(WriteEnd::Failed);
                writer_end = Some(end);
                CloseCause::from(end)
            }
        };

        self.transition(SessionState::Closing);
        if let Err(e) = self.hub.unregister(self.id).await {
            debug!(connection_id = %self.id, error = %e, "Unregister on close failed");
        }
        drop(control_tx);

        if writer_end.is_none() {
            match timeout(CLOSE_TIMEOUT, &mut writer).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(connection_id = %self.id, "Write loop did not finish in time, aborting");
                    writer.abort();
                }
            }
        }

        self.transition(SessionState::Closed);
        info!(
            connection_id = %self.id,
            user_id = %self.identity.user_id,
            cause = ?cause,
            "Session closed"
        );
        Ok(cause)
    }

    async fn read_loop<R, E>(&self, stream: &mut R, control_tx: &mpsc::Sender<Frame>) -> CloseCause
    where
        R: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        let mut malformed: u32 = 0;

        loop {
            let frame = match timeout(self.config.read_deadline, stream.next()).await {
                Err(_) => {
                    info!(connection_id = %self.id, "Read deadline exceeded");
                    self.close(control_tx, WsCloseCode::READ_TIMEOUT, "read timeout")
                        .await;
                    return CloseCause::ReadTimeout;
                }
                Ok(None) => return CloseCause::Disconnected,
                Ok(Some(Err(e))) => {
                    debug!(connection_id = %self.id, error = %e, "Socket read failed");
                    return CloseCause::ReadError;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            let text = match frame {
                Frame::Text(text) => text,
                Frame::Close(_) => return CloseCause::ClientClosed,
                // Still counts as activity for the read deadline.
                Frame::Ping(_) | Frame::Pong(_) => continue,
                Frame::Binary(_) => {
                    if self
                        .reject_malformed(control_tx, &mut malformed, "binary frames are not supported")
                        .await
                    {
                        return CloseCause::TooManyMalformed;
                    }
                    continue;
                }
            };

            if text.len() > self.config.max_message_size {
                warn!(
                    connection_id = %self.id,
                    size = text.len(),
                    limit = self.config.max_message_size,
                    "Client message too large"
                );
                let message = format!(
                    "message of {} bytes exceeds the {} byte limit",
                    text.len(),
                    self.config.max_message_size
                );
                self.send_error(control_tx, ErrorCode::MessageTooLarge, message)
                    .await;
                self.close(control_tx, WsCloseCode::MESSAGE_TOO_BIG, "message too large")
                    .await;
                return CloseCause::MessageTooLarge;
            }

            match ClientMessage::parse(&text) {
                Ok(message) => self.dispatch(message).await,
                Err(e) => {
                    if self
                        .reject_malformed(control_tx, &mut malformed, &e.to_string())
                        .await
                    {
                        return CloseCause::TooManyMalformed;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, message: ClientMessage) {
        let result = match message {
            ClientMessage::Subscribe { channel } => {
                self.hub.subscribe(self.id, channel).await.map(|_| ())
            }
            ClientMessage::Unsubscribe { channel } => {
                self.hub.unsubscribe(self.id, channel).await.map(|_| ())
            }
            ClientMessage::Ping => self.hub.send_to_connection(self.id, &Envelope::pong()).await,
        };
        // Refusals were already reported to the client by the hub.
        if let Err(e) = result {
            debug!(connection_id = %self.id, error = %e, "Control message refused");
        }
    }

    /// Report a malformed message. Returns `true` once the client has used
    /// up its allowance and the session must close.
    async fn reject_malformed(
        &self,
        control_tx: &mpsc::Sender<Frame>,
        malformed: &mut u32,
        reason: &str,
    ) -> bool {
        *malformed += 1;
        debug!(connection_id = %self.id, count = *malformed, reason, "Malformed client message");
        self.send_error(control_tx, ErrorCode::InvalidMessage, reason)
            .await;

        if *malformed > self.config.max_malformed_messages {
            warn!(connection_id = %self.id, count = *malformed, "Too many malformed messages");
            self.close(
                control_tx,
                WsCloseCode::POLICY_VIOLATION,
                "too many malformed messages",
            )
            .await;
            return true;
        }
        false
    }

    async fn send_error(
        &self,
        control_tx: &mpsc::Sender<Frame>,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        match Envelope::error(code, message).to_json() {
            Ok(text) => {
                let _ = control_tx.send(Frame::Text(text)).await;
            }
            Err(e) => warn!(connection_id = %self.id, error = %e, "Failed to encode error envelope"),
        }
    }

    async fn close(&self, control_tx: &mpsc::Sender<Frame>, code: u16, reason: &str) {
        let _ = control_tx.send(Frame::close(code, reason)).await;
    }
}
