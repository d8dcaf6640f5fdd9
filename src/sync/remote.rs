//! Listener-side client: connects to a sync server over WebSocket and exchanges
//! [`SyncEvent`]s with it. Used by the `send`/`listen` commands and by tests.

use anyhow::{anyhow, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::event::SyncEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open connection to a sync server.
pub struct RemotePeer {
    url: Url,
    ws_tx: SplitSink<WsStream, Message>,
    ws_rx: SplitStream<WsStream>,
}

/// Connect to the upgrade endpoint of a sync server, e.g. `ws://localhost:5000/ws`.
pub async fn connect_peer(url: &str) -> Result<RemotePeer> {
    let url = Url::parse(url).map_err(|e| anyhow!("invalid ws url: {e}"))?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (ws_tx, ws_rx) = ws_stream.split();

    tracing::debug!(url = %url, "Connected to sync server");

    Ok(RemotePeer { url, ws_tx, ws_rx })
}

impl RemotePeer {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn send(&mut self, event: &SyncEvent) -> Result<()> {
        let json = event.encode()?;
        self.ws_tx.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Wait for the next event from the server.
    ///
    /// Returns `None` once the connection is closed. Frames that are not sync
    /// records are skipped.
    pub async fn next_event(&mut self) -> Option<Result<SyncEvent>> {
        while let Some(msg) = self.ws_rx.next().await {
            let decoded = match msg {
                Ok(Message::Text(text)) => SyncEvent::decode(text.as_str()),
                Ok(Message::Binary(bin)) => SyncEvent::decode_slice(&bin),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            };
            match decoded {
                Ok(event) => return Some(Ok(event)),
                Err(e) => tracing::debug!(error = %e, "Skipping non-sync frame"),
            }
        }
        None
    }

    /// Send a close frame and drop the connection.
    pub async fn close(mut self) -> Result<()> {
        self.ws_tx.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_invalid_url() {
        let err = connect_peer("not a url").await.err().unwrap();
        assert!(err.to_string().contains("invalid ws url"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(connect_peer(&format!("ws://127.0.0.1:{port}/ws")).await.is_err());
    }
}
