//! # Syncwave - Synchronized Listening Server
//!
//! Lets several people listen to the same track at the same position. Every
//! play, pause or seek one listener performs is broadcast to everyone else over
//! WebSocket, in one global order.
//!
//! ## Features
//!
//! - **Single-owner hub**: one task owns the listener set, so fan-out never
//!   races with connects and disconnects
//! - **Explicit backpressure**: bounded, dropping or unbounded inbound queue
//! - **Exactly-once cleanup**: a dead listener is closed once, whichever side
//!   notices first
//! - **Music library**: stream a track (with range requests) or list them all
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use syncwave::{ServerConfig, SyncServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default().port(5000).music_dir("./music/");
//!     SyncServer::bind(config).await?.run().await
//! }
//! ```
//!
//! Wire format, both directions:
//!
//! ```json
//! { "type": "seek", "time": 42.5, "file": "track.mp3" }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod sync;

// Re-export main types for library consumers
pub use config::ServerConfig;
pub use error::SyncError;
pub use server::SyncServer;
pub use sync::{EventSink, Hub, HubConfig, HubHandle, ListenerId, QueuePolicy, SyncEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
