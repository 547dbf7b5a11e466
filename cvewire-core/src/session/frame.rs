use bytes::Bytes;

/// A transport-neutral WebSocket frame.
///
/// The server maps its socket type onto this so sessions can be driven by
/// any `Sink`/`Stream` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl Frame {
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close(Some(CloseReason {
            code,
            reason: reason.into(),
        }))
    }

    /// Close code carried by a close frame, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Frame::Close(Some(reason)) => Some(reason.code),
            _ => None,
        }
    }
}
