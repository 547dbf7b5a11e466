//! Client-to-server control messages.
//!
//! Clients send the same `{type, id, payload}` shape the server uses:
//!
//! ```json
//! {"type":"subscribe","payload":{"channel":"articles:critical"}}
//! {"type":"unsubscribe","payload":{"channel":"articles:critical"}}
//! {"type":"ping"}
//! ```
//!
//! `id` is optional, may be any JSON value and is ignored by the hub. The channel is carried as a raw
//! string so the hub can answer an unparseable name with `invalid_channel`
//! instead of `invalid_message`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Ping,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientMessageError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("message type {0} requires a payload.channel string")]
    MissingChannel(&'static str),
}

#[derive(Debug, Serialize, Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<RawChannelPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawChannelPayload {
    #[serde(default)]
    channel: Option<String>,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ClientMessageError> {
        let raw: RawClientMessage = serde_json::from_str(text)?;
        let channel = raw.payload.and_then(|p| p.channel);
        match raw.kind.as_str() {
            "subscribe" => channel
                .map(|channel| ClientMessage::Subscribe { channel })
                .ok_or(ClientMessageError::MissingChannel("subscribe")),
            "unsubscribe" => channel
                .map(|channel| ClientMessage::Unsubscribe { channel })
                .ok_or(ClientMessageError::MissingChannel("unsubscribe")),
            "ping" => Ok(ClientMessage::Ping),
            other => Err(ClientMessageError::UnknownType(other.to_owned())),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let (kind, channel) = match self {
            ClientMessage::Subscribe { channel } => ("subscribe", Some(channel.clone())),
            ClientMessage::Unsubscribe { channel } => ("unsubscribe", Some(channel.clone())),
            ClientMessage::Ping => ("ping", None),
        };
        serde_json::to_string(&RawClientMessage {
            kind: kind.to_owned(),
            id: Some(serde_json::Value::String(Uuid::now_v7().to_string())),
            payload: channel.map(|channel| RawChannelPayload {
                channel: Some(channel),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe","payload":{"channel":"system"}}"#)
                .unwrap(),
            ClientMessage::Subscribe {
                channel: "system".into()
            }
        );
        assert_eq!(
            ClientMessage::parse(
                r#"{"type":"unsubscribe","id":"0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b","payload":{"channel":"articles:all"}}"#
            )
            .unwrap(),
            ClientMessage::Unsubscribe {
                channel: "articles:all".into()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
    }

    #[test]
    fn test_correlation_id_may_be_any_json_value() {
        for text in [
            r#"{"type":"ping","id":"req-1"}"#,
            r#"{"type":"ping","id":42}"#,
            r#"{"type":"ping","id":null}"#,
        ] {
            assert_eq!(ClientMessage::parse(text).unwrap(), ClientMessage::Ping);
        }
        assert_eq!(
            ClientMessage::parse(
                r#"{"type":"subscribe","id":{"seq":3},"payload":{"channel":"system"}}"#
            )
            .unwrap(),
            ClientMessage::Subscribe {
                channel: "system".into()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ClientMessageError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#),
            Err(ClientMessageError::MissingChannel("subscribe"))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"publish","payload":{"channel":"system"}}"#),
            Err(ClientMessageError::UnknownType(t)) if t == "publish"
        ));
    }

    #[test]
    fn test_to_json_is_parseable() {
        let msg = ClientMessage::Subscribe {
            channel: "articles:vendor:cisco".into(),
        };
        assert_eq!(ClientMessage::parse(&msg.to_json().unwrap()).unwrap(), msg);
    }
}
