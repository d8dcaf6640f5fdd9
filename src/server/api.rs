use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use super::library;
use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::sync::{EventSink, HubHandle, ListenerId, SyncEvent};

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle<WsSink>,
    pub music_dir: Arc<PathBuf>,
    pub idle_timeout: Option<Duration>,
}

/// Write half of a listener's WebSocket.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

impl EventSink for WsSink {
    async fn deliver(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
        let text = event.encode()?;
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(SyncError::transport)
    }

    async fn close(mut self) {
        let _ = self.inner.close().await;
    }
}

pub fn router(config: &ServerConfig, hub: HubHandle<WsSink>) -> Router {
    let state = AppState {
        hub,
        music_dir: Arc::new(config.music_dir.clone()),
        idle_timeout: config.idle_timeout_duration(),
    };

    let listing_cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    let app = Router::new()
        .route("/", get(|| async { "Syncwave Server" }))
        .route("/health", get(|| async { Json("OK") }))
        .route("/stats", get(get_stats))
        .route("/ws", get(ws_handler))
        .route("/music", get(library::serve_track))
        .route("/music-list", get(library::list_music).layer(listing_cors));

    let app = match &config.frontend_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.with_state(state)
}

async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "WebSocket upgrade rejected");
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_listener(state, socket))
}

/// Why a listener's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Disconnected,
    Malformed,
    Transport,
    IdleTimeout,
    HubClosed,
}

async fn handle_listener(state: AppState, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();

    let id = match state.hub.register(WsSink::new(sender)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Could not register listener");
            return;
        }
    };
    tracing::debug!(listener = %id, "Listener connected");

    let reason = read_loop(&state, id, &mut receiver).await;
    tracing::debug!(listener = %id, reason = ?reason, "Listener read loop ended");

    // The hub may already have dropped this listener after a failed write;
    // deregistering again is harmless.
    let _ = state.hub.deregister(id).await;
}

async fn read_loop(
    state: &AppState,
    id: ListenerId,
    receiver: &mut SplitStream<WebSocket>,
) -> CloseReason {
    loop {
        let next = match state.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
                Ok(next) => next,
                Err(_) => return CloseReason::IdleTimeout,
            },
            None => receiver.next().await,
        };

        let decoded = match next {
            Some(Ok(Message::Text(text))) => SyncEvent::decode(text.as_str()),
            Some(Ok(Message::Binary(bin))) => SyncEvent::decode_slice(&bin),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return CloseReason::Disconnected,
            Some(Err(e)) => {
                tracing::debug!(listener = %id, error = %e, "Read failed");
                return CloseReason::Transport;
            }
        };

        let event = match decoded {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(listener = %id, error = %e, "Dropping listener");
                return CloseReason::Malformed;
            }
        };

        tracing::debug!(listener = %id, event = %event, "Event received");
        if state.hub.submit(Some(id), event).await.is_err() {
            return CloseReason::HubClosed;
        }
    }
}

async fn get_stats(State(state): State<AppState>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
