//! WebSocket client for `GET /ws`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::{ClientMessage, Envelope};
use crate::signature::TOKEN_QUERY_PARAM;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live hub session seen from the client side.
///
/// Protocol pings are answered by `tungstenite` automatically while
/// [`next_envelope`](HubClient::next_envelope) is being polled.
pub struct HubClient {
    write: SplitSink<Socket, Message>,
    read: SplitStream<Socket>,
}

impl HubClient {
    /// Connect to `{base_url}/ws?token={token}`.
    ///
    /// `base_url` uses the `ws` or `wss` scheme. A rejected upgrade
    /// surfaces as [`ClientError::WebSocket`] carrying the HTTP response.
    pub async fn connect(base_url: &Url, token: &str) -> Result<Self, ClientError> {
        let mut url = base_url.join("/ws")?;
        url.set_query(Some(&format!(
            "{TOKEN_QUERY_PARAM}={}",
            urlencoding::encode(token)
        )));

        let (socket, _response) = connect_async(url.as_str()).await?;
        let (write, read) = socket.split();
        Ok(Self { write, read })
    }

    pub async fn subscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        self.send(ClientMessage::Subscribe {
            channel: channel.to_owned(),
        })
        .await
    }

    pub async fn unsubscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        self.send(ClientMessage::Unsubscribe {
            channel: channel.to_owned(),
        })
        .await
    }

    /// Application-level ping; the hub answers with a `pong` envelope.
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.send(ClientMessage::Ping).await
    }

    pub async fn send(&mut self, message: ClientMessage) -> Result<(), ClientError> {
        self.write.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    /// Send a raw text frame, bypassing [`ClientMessage`] encoding.
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.write.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Wait for the next envelope.
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, ClientError> {
        while let Some(message) = self.read.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Send a close frame and drain the stream until the server closes it.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.write.send(Message::Close(None)).await?;
        while let Some(message) = self.read.next().await {
            if message.is_err() {
                break;
            }
        }
        Ok(())
    }
}
