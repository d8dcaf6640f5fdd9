//! Server configuration
//!
//! Defaults match the classic deployment: listen on port 5000 on every
//! interface and serve music from `./music/`. A TOML file can override any
//! field; omitted fields keep their default.
//!
//! ```toml
//! bind_addr = "127.0.0.1:5000"
//! music_dir = "/srv/music"
//! idle_timeout_ms = 300000
//!
//! [hub]
//! echo_to_sender = false
//! write_timeout_ms = 2000
//!
//! [hub.queue]
//! policy = "drop_newest"
//! capacity = 256
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::HubConfig;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MUSIC_DIR: &str = "./music/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Storage root for the music endpoints
    pub music_dir: PathBuf,

    /// Optional directory of static frontend files served on unmatched paths
    pub frontend_dir: Option<PathBuf>,

    /// Disconnect a listener that sends nothing for this long, in milliseconds
    /// (None = never)
    pub idle_timeout_ms: Option<u64>,

    /// Broadcast hub settings
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            music_dir: PathBuf::from(DEFAULT_MUSIC_DIR),
            frontend_dir: None,
            idle_timeout_ms: None,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Keep the bind IP, change the port.
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn music_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.music_dir = dir.into();
        self
    }

    pub fn frontend_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.frontend_dir = Some(dir.into());
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    pub fn idle_timeout_duration(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::QueuePolicy;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 5000);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.music_dir, PathBuf::from("./music/"));
        assert!(config.frontend_dir.is_none());
        assert!(config.idle_timeout_duration().is_none());
        assert!(config.hub.echo_to_sender);
        assert_eq!(config.hub.queue, QueuePolicy::Block { capacity: 1024 });
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .port(9090)
            .music_dir("/srv/music")
            .frontend_dir("web")
            .idle_timeout(Duration::from_secs(30))
            .hub(HubConfig::default().echo_to_sender(false));

        assert_eq!(config.bind_addr, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
        assert_eq!(config.music_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.frontend_dir, Some(PathBuf::from("web")));
        assert_eq!(config.idle_timeout_duration(), Some(Duration::from_secs(30)));
        assert!(!config.hub.echo_to_sender);
    }

    #[test]
    fn test_huge_timeouts_saturate() {
        let config = ServerConfig::default()
            .idle_timeout(Duration::MAX)
            .hub(HubConfig::default().write_timeout(Duration::MAX));

        assert_eq!(config.idle_timeout_ms, Some(u64::MAX));
        assert_eq!(config.hub.write_timeout_ms, Some(u64::MAX));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml(
            r#"
            music_dir = "/data/tracks"

            [hub]
            write_timeout_ms = 1500

            [hub.queue]
            policy = "drop_newest"
            capacity = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.music_dir, PathBuf::from("/data/tracks"));
        assert!(config.hub.echo_to_sender);
        assert_eq!(
            config.hub.write_timeout_duration(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.hub.queue, QueuePolicy::DropNewest { capacity: 64 });
    }

    #[test]
    fn test_from_toml_unbounded_queue() {
        let config = ServerConfig::from_toml("[hub.queue]\npolicy = \"unbounded\"\n").unwrap();
        assert_eq!(config.hub.queue, QueuePolicy::Unbounded);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(ServerConfig::from_toml("bind_addr = \"not an address\"").is_err());
        assert!(ServerConfig::from_toml("[hub.queue]\npolicy = \"sometimes\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncwave.toml");
        std::fs::write(&path, "bind_addr = \"127.0.0.1:7000\"\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());

        let missing = ServerConfig::load(&dir.path().join("missing.toml"));
        assert!(missing.unwrap_err().to_string().contains("failed to read config"));
    }
}
