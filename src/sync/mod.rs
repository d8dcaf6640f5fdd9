//! Real-time playback synchronization
//!
//! Listeners push [`SyncEvent`]s into a single [`Hub`], which fans each event
//! out to every registered listener in the order the events were received.

pub mod event;
pub mod hub;
pub mod registry;
pub mod remote;

pub use event::SyncEvent;
pub use hub::{EventSink, Hub, HubConfig, HubHandle, HubStats, QueuePolicy, Submission};
pub use registry::{ListenerId, Registry};
