//! Error types for the synchronization core
//!
//! Transport and codec failures are per-listener: the hub recovers from them by
//! dropping the offending listener. Only [`SyncError::HubClosed`] means the
//! shared hub itself is gone.

use std::fmt;
use std::time::Duration;

/// Boxed error from the underlying socket implementation.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum SyncError {
    /// Inbound frame was not a valid sync record
    Decode(serde_json::Error),
    /// Outbound event could not be serialized
    Encode(serde_json::Error),
    /// Read or write on a listener stream failed
    Transport(TransportError),
    /// A write did not complete within the configured limit
    WriteTimeout(Duration),
    /// The hub task has stopped; nothing can be submitted any more
    HubClosed,
}

impl SyncError {
    pub fn transport(err: impl Into<TransportError>) -> Self {
        SyncError::Transport(err.into())
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Decode(e) => write!(f, "malformed sync message: {}", e),
            SyncError::Encode(e) => write!(f, "failed to encode sync message: {}", e),
            SyncError::Transport(e) => write!(f, "listener transport error: {}", e),
            SyncError::WriteTimeout(limit) => {
                write!(f, "listener write timed out after {:?}", limit)
            }
            SyncError::HubClosed => write!(f, "broadcast hub is closed"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Decode(e) | SyncError::Encode(e) => Some(e),
            SyncError::Transport(e) => Some(e.as_ref()),
            SyncError::WriteTimeout(_) | SyncError::HubClosed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SyncError::transport(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "peer went away",
        ));
        assert_eq!(err.to_string(), "listener transport error: peer went away");

        let err = SyncError::WriteTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "listener write timed out after 250ms");
    }

    #[test]
    fn test_source() {
        use std::error::Error as _;

        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(SyncError::Decode(decode).source().is_some());
        assert!(SyncError::HubClosed.source().is_none());
    }
}
