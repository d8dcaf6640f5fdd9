use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SyncError;

/// A playback-state change shared between listeners.
///
/// Wire form is `{ "type": string, "time": number, "file": string }`. Missing
/// or `null` fields decode to their zero value and unknown fields are ignored.
/// Browsers serialize a NaN playback time as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncEvent {
    /// Action tag (play, pause, seek, ...). Forwarded verbatim.
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    /// Playback offset in seconds.
    #[serde(rename = "time", deserialize_with = "null_as_default")]
    pub position: f64,
    /// File the action applies to.
    #[serde(deserialize_with = "null_as_default")]
    pub file: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SyncEvent {
    pub fn new(kind: impl Into<String>, position: f64, file: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            position,
            file: file.into(),
        }
    }

    pub fn play(position: f64, file: impl Into<String>) -> Self {
        Self::new("play", position, file)
    }

    pub fn pause(position: f64, file: impl Into<String>) -> Self {
        Self::new("pause", position, file)
    }

    pub fn seek(position: f64, file: impl Into<String>) -> Self {
        Self::new("seek", position, file)
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(SyncError::Decode)
    }

    /// Decode a binary frame carrying the same JSON record.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Decode)
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Encode)
    }
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {:.3}s ({})", self.kind, self.position, self.file)
    }
}
