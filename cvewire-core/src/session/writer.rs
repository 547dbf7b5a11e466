//! The write half of a session: the only task that touches the socket sink.

use super::frame::Frame;
use crate::events::OutboundReceiver;
use crate::hub::{ConnectionId, HubHandle};
use bytes::Bytes;
use cvewire_sdk::objects::{Envelope, MessageType, TokenExpiringPayload, WsCloseCode};
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

/// Why the write loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WriteEnd {
    /// The hub closed the outbound queue.
    QueueClosed,
    /// A close frame requested by the read loop was sent.
    CloseSent,
    TokenExpired,
    Failed,
}

pub(super) struct Writer<S> {
    pub sink: S,
    pub outbound_rx: OutboundReceiver,
    /// Frames the read loop must get out immediately (errors, close).
    pub control_rx: mpsc::Receiver<Frame>,
    pub hub: HubHandle,
    pub id: ConnectionId,
    pub expires_at: OffsetDateTime,
    pub heartbeat_interval: Duration,
    pub token_expiry_warning: Duration,
}

impl<S> Writer<S>
where
    S: Sink<Frame> + Unpin,
    S::Error: Display,
{
    pub async fn run(mut self) -> WriteEnd {
        let end = match self.pump().await {
            Ok(end) => end,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Socket write failed");
                WriteEnd::Failed
            }
        };

        if end != WriteEnd::QueueClosed {
            // The hub may still hold the connection; ask it to let go.
            if let Err(e) = self.hub.unregister(self.id).await {
                debug!(connection_id = %self.id, error = %e, "Unregister after write loop exit failed");
            }
        }
        debug!(connection_id = %self.id, end = ?end, "Write loop finished");
        end
    }

    async fn pump(&mut self) -> Result<WriteEnd, S::Error> {
        let now = Instant::now();
        let remaining: Duration = (self.expires_at - OffsetDateTime::now_utc())
            .try_into()
            .unwrap_or(Duration::ZERO);
        let expiry = now + remaining;
        let warning = expiry
            .checked_sub(self.token_expiry_warning)
            .map_or(now, |at| at.max(now));

        let expiry_timer = sleep_until(expiry);
        let warning_timer = sleep_until(warning);
        tokio::pin!(expiry_timer, warning_timer);
        let mut warned = false;
        let mut control_open = true;

        let mut heartbeat = interval_at(now + self.heartbeat_interval, self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut expiry_timer => {
                    info!(connection_id = %self.id, "Identity token expired, closing connection");
                    self.sink
                        .send(Frame::close(WsCloseCode::TOKEN_EXPIRED, "token expired"))
                        .await?;
                    return Ok(WriteEnd::TokenExpired);
                }

                frame = self.control_rx.recv(), if control_open => match frame {
                    Some(frame) => {
                        let closing = matches!(frame, Frame::Close(_));
                        self.sink.send(frame).await?;
                        if closing {
                            return Ok(WriteEnd::CloseSent);
                        }
                    }
                    None => control_open = false,
                },

                message = self.outbound_rx.recv() => match message {
                    Some(text) => self.sink.send(Frame::Text(text.to_string())).await?,
                    None => {
                        self.sink
                            .send(Frame::close(WsCloseCode::NORMAL, "connection closed"))
                            .await?;
                        return Ok(WriteEnd::QueueClosed);
                    }
                },

                _ = &mut warning_timer, if !warned => {
                    warned = true;
                    let expires_in = expiry.saturating_duration_since(Instant::now());
                    let payload = TokenExpiringPayload {
                        expires_at: self.expires_at,
                        expires_in: i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX),
                    };
                    match Envelope::with_payload(MessageType::TokenExpiring, &payload)
                        .and_then(|envelope| envelope.to_json())
                    {
                        Ok(text) => self.sink.send(Frame::Text(text)).await?,
                        Err(e) => warn!(connection_id = %self.id, error = %e, "Failed to encode token_expiring"),
                    }
                }

                _ = heartbeat.tick() => {
                    self.sink.send(Frame::Ping(Bytes::new())).await?;
                }
            }
        }
    }
}
