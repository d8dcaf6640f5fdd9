pub mod api;
pub mod library;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::sync::{Hub, HubHandle};

pub use api::WsSink;

/// A bound sync server with its hub already running.
pub struct SyncServer {
    config: ServerConfig,
    listener: TcpListener,
    hub: HubHandle<WsSink>,
}

impl SyncServer {
    /// Bind the listening socket and start the broadcast hub.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let hub = Hub::spawn(config.hub.clone());

        Ok(Self {
            config,
            listener,
            hub,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn hub(&self) -> &HubHandle<WsSink> {
        &self.hub
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until the process exits.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let app = api::router(&self.config, self.hub);

        tracing::info!(
            addr = %addr,
            music_dir = %self.config.music_dir.display(),
            "Sync server listening"
        );

        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Sync server stopped");
        Ok(())
    }
}

pub async fn start(config: ServerConfig) -> Result<()> {
    SyncServer::bind(config).await?.run().await
}
