//! Server-to-client envelope and its typed payloads.
//!
//! Every frame the hub pushes over `GET /ws` is a JSON [`Envelope`]:
//!
//! ```json
//! {"type":"subscribed","id":"0190...","timestamp":"2026-10-19T08:00:00Z","payload":{"channel":"articles:all"}}
//! ```
//!
//! The payload is opaque to the hub; the `type` field tells the client how
//! to interpret it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Envelope `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "subscribed")]
    Subscribed,
    #[serde(rename = "unsubscribed")]
    Unsubscribed,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "token_expiring")]
    TokenExpiring,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "article.new")]
    ArticleNew,
    #[serde(rename = "article.updated")]
    ArticleUpdated,
    #[serde(rename = "alert.match")]
    AlertMatch,
    #[serde(rename = "system.announcement")]
    SystemAnnouncement,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Connected => "connected",
            MessageType::Subscribed => "subscribed",
            MessageType::Unsubscribed => "unsubscribed",
            MessageType::Pong => "pong",
            MessageType::TokenExpiring => "token_expiring",
            MessageType::Error => "error",
            MessageType::ArticleNew => "article.new",
            MessageType::ArticleUpdated => "article.updated",
            MessageType::AlertMatch => "alert.match",
            MessageType::SystemAnnouncement => "system.announcement",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed-shape wire message `{type, id, timestamp, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Correlation id (UUIDv7, so ids sort by creation time).
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: MessageType, payload: serde_json::Value) -> Self {
        Self {
            kind,
            id: Uuid::now_v7(),
            timestamp: OffsetDateTime::now_utc(),
            payload,
        }
    }

    /// Build an envelope from any serializable payload.
    pub fn with_payload<T: Serialize>(
        kind: MessageType,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// `error{code, message}` envelope addressed to a single client.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(
            MessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, serde_json::json!({}))
    }

    /// Decode the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Machine-readable error codes carried by `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The user already holds the maximum number of live connections.
    MaxConnections,
    InvalidChannel,
    /// The connection already holds the maximum number of channels.
    SubscriptionLimit,
    /// The client message could not be parsed.
    InvalidMessage,
    MessageTooLarge,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

/// Payload of `connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Payload of `subscribed` and `unsubscribed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPayload {
    pub channel: String,
}

/// Payload of `token_expiring`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExpiringPayload {
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Seconds left until the token expires.
    pub expires_in: i64,
}

/// Well-known WebSocket close codes used by the hub.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure (hub closed the connection's queue).
    pub const NORMAL: u16 = 1000;

    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// The client sent too many malformed messages.
    pub const POLICY_VIOLATION: u16 = 1008;

    /// A client frame exceeded the configured size limit.
    pub const MESSAGE_TOO_BIG: u16 = 1009;

    /// An unexpected server-side error prevented the connection from
    /// continuing.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The authenticated token reached its expiry instant.
    pub const TOKEN_EXPIRED: u16 = 4001;

    /// The peer stopped answering within the read deadline.
    pub const READ_TIMEOUT: u16 = 4002;

    /// The user already holds the maximum number of live connections.
    pub const MAX_CONNECTIONS: u16 = 4008;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(
            MessageType::ArticleNew,
            serde_json::json!({ "title": "hello" }),
        );
        let value: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "article.new");
        assert_eq!(value["payload"]["title"], "hello");
        assert!(value["id"].is_string());
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_error_envelope_payload() {
        let envelope = Envelope::error(ErrorCode::MaxConnections, "too many connections");
        assert_eq!(envelope.kind, MessageType::Error);

        let payload: ErrorPayload = envelope.payload_as().unwrap();
        assert_eq!(payload.code, ErrorCode::MaxConnections);
        assert_eq!(payload.message, "too many connections");
        assert_eq!(envelope.payload["code"], "max_connections");
    }

    #[test]
    fn test_message_type_names_match_serde() {
        for kind in [
            MessageType::Connected,
            MessageType::TokenExpiring,
            MessageType::AlertMatch,
            MessageType::SystemAnnouncement,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
