#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use syncwave::server::WsSink;
use syncwave::sync::remote::{connect_peer, RemotePeer};
use syncwave::sync::HubHandle;
use syncwave::{ListenerId, ServerConfig, SyncEvent, SyncServer};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: HubHandle<WsSink>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(music_dir: &Path) -> Self {
        Self::start_with(ServerConfig::default().music_dir(music_dir)).await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        let config = config.bind("127.0.0.1:0".parse().unwrap());
        let server = SyncServer::bind(config).await.expect("bind");
        let addr = server.local_addr().unwrap();
        let hub = server.hub().clone();

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = server
                .run_until(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            hub,
            shutdown: Some(tx),
            task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connect a listener and wait until the hub has registered it.
    pub async fn join(&self) -> (RemotePeer, ListenerId) {
        let before = self.hub.listeners().await.unwrap();
        let peer = connect_peer(&self.ws_url()).await.expect("ws connect");

        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let now = self.hub.listeners().await.unwrap();
            if let Some(id) = now.iter().copied().find(|id| !before.contains(id)) {
                return (peer, id);
            }
            assert!(Instant::now() < deadline, "listener never registered");
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until `id` is no longer registered.
    pub async fn wait_gone(&self, id: ListenerId) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while self.hub.listeners().await.unwrap().contains(&id) {
            assert!(Instant::now() < deadline, "listener {id} never removed");
            sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

pub async fn recv(peer: &mut RemotePeer) -> SyncEvent {
    timeout(Duration::from_secs(3), peer.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("connection closed")
        .expect("bad event")
}

/// Assert nothing arrives within a short window.
pub async fn assert_silent(peer: &mut RemotePeer) {
    if let Ok(Some(Ok(event))) = timeout(Duration::from_millis(200), peer.next_event()).await {
        panic!("unexpected event {event}");
    }
}
