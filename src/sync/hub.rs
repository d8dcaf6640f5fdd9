//! Broadcast hub
//!
//! A single task owns the [`Registry`] and drains one shared command queue.
//! Registration, deregistration and events all travel through that queue, so
//! the listener set is only ever mutated from one place and every event is
//! fanned out to completion before the next one starts.
//!
//! ```text
//!  [read loop #1] ──┐
//!  [read loop #2] ──┼──► mpsc queue ──► hub task ──► sink #1, sink #2, ...
//!  [read loop #3] ──┘                    (owns Registry)
//! ```
//!
//! A listener can be discovered dead from two directions: its read loop ends,
//! or a fan-out write to it fails. Both paths end in [`Hub::drop_listener`],
//! which is a no-op for ids that are already gone.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::event::SyncEvent;
use super::registry::{ListenerId, Registry};
use crate::error::SyncError;

/// Write half of a listener connection, as seen by the hub.
pub trait EventSink: Send + 'static {
    /// Write one event to the listener.
    fn deliver(
        &mut self,
        event: &SyncEvent,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Close the underlying stream. Called at most once, after which the sink
    /// is dropped.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Bound and overflow behavior of the hub's inbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// No bound; submitters never wait
    Unbounded,
    /// Submitters wait for space when `capacity` events are queued
    Block { capacity: usize },
    /// Events submitted while the queue is full are discarded
    DropNewest { capacity: usize },
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy::Block { capacity: 1024 }
    }
}

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Inbound queue policy
    pub queue: QueuePolicy,

    /// Deliver events back to the listener that sent them
    pub echo_to_sender: bool,

    /// Upper bound on a single fan-out write, in milliseconds (None = wait forever)
    pub write_timeout_ms: Option<u64>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue: QueuePolicy::default(),
            echo_to_sender: true,
            write_timeout_ms: None,
        }
    }
}

impl HubConfig {
    pub fn queue(mut self, policy: QueuePolicy) -> Self {
        self.queue = policy;
        self
    }

    pub fn echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn write_timeout_duration(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

/// Hub counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Listeners currently registered
    pub listeners: usize,
    /// Events fanned out so far
    pub events_processed: u64,
    /// Successful per-listener writes
    pub deliveries: u64,
    /// Writes that failed and cost the listener its registration
    pub failed_deliveries: u64,
    /// Events discarded by [`QueuePolicy::DropNewest`]
    pub dropped_events: u64,
}

/// Outcome of [`HubHandle::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    Dropped,
}

enum HubCommand<S> {
    Register {
        id: ListenerId,
        sink: S,
    },
    Deregister {
        id: ListenerId,
    },
    Broadcast {
        origin: Option<ListenerId>,
        event: SyncEvent,
    },
    Listeners {
        reply: oneshot::Sender<Vec<ListenerId>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

enum Outbox<S> {
    Bounded(mpsc::Sender<HubCommand<S>>),
    Unbounded(mpsc::UnboundedSender<HubCommand<S>>),
}

impl<S> Clone for Outbox<S> {
    fn clone(&self) -> Self {
        match self {
            Outbox::Bounded(tx) => Outbox::Bounded(tx.clone()),
            Outbox::Unbounded(tx) => Outbox::Unbounded(tx.clone()),
        }
    }
}

impl<S> Outbox<S> {
    /// Enqueue, waiting for space if the queue is bounded and full.
    async fn send(&self, command: HubCommand<S>) -> Result<(), SyncError> {
        match self {
            Outbox::Bounded(tx) => tx.send(command).await.map_err(|_| SyncError::HubClosed),
            Outbox::Unbounded(tx) => tx.send(command).map_err(|_| SyncError::HubClosed),
        }
    }

    /// Enqueue without waiting; `Ok(false)` means the queue was full.
    fn try_send(&self, command: HubCommand<S>) -> Result<bool, SyncError> {
        match self {
            Outbox::Bounded(tx) => match tx.try_send(command) {
                Ok(()) => Ok(true),
                Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(SyncError::HubClosed),
            },
            Outbox::Unbounded(tx) => tx
                .send(command)
                .map(|_| true)
                .map_err(|_| SyncError::HubClosed),
        }
    }
}

enum Inbox<S> {
    Bounded(mpsc::Receiver<HubCommand<S>>),
    Unbounded(mpsc::UnboundedReceiver<HubCommand<S>>),
}

impl<S> Inbox<S> {
    async fn recv(&mut self) -> Option<HubCommand<S>> {
        match self {
            Inbox::Bounded(rx) => rx.recv().await,
            Inbox::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Cloneable front door to a running hub.
///
/// The hub task exits once every handle has been dropped.
pub struct HubHandle<S> {
    tx: Outbox<S>,
    policy: QueuePolicy,
    next_id: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl<S> Clone for HubHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            policy: self.policy,
            next_id: Arc::clone(&self.next_id),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<S: EventSink> HubHandle<S> {
    /// Register a new listener and return the id allocated for it.
    ///
    /// The registration is queued ahead of anything the caller submits
    /// afterwards, so a listener never misses its own first event.
    pub async fn register(&self, sink: S) -> Result<ListenerId, SyncError> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tx.send(HubCommand::Register { id, sink }).await?;
        Ok(id)
    }

    /// Ask the hub to close and forget a listener. Safe to call for ids that
    /// are already gone.
    pub async fn deregister(&self, id: ListenerId) -> Result<(), SyncError> {
        self.tx.send(HubCommand::Deregister { id }).await
    }

    /// Queue an event for fan-out. `origin` is the listener it came from,
    /// if any.
    pub async fn submit(
        &self,
        origin: Option<ListenerId>,
        event: SyncEvent,
    ) -> Result<Submission, SyncError> {
        let command = HubCommand::Broadcast { origin, event };

        if let QueuePolicy::DropNewest { .. } = self.policy {
            if self.tx.try_send(command)? {
                return Ok(Submission::Queued);
            }
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(origin = ?origin, "Hub queue full, event dropped");
            return Ok(Submission::Dropped);
        }

        self.tx.send(command).await?;
        Ok(Submission::Queued)
    }

    /// Ids registered at the moment the hub handles this request.
    pub async fn listeners(&self) -> Result<Vec<ListenerId>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(HubCommand::Listeners { reply }).await?;
        rx.await.map_err(|_| SyncError::HubClosed)
    }

    pub async fn stats(&self) -> Result<HubStats, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(HubCommand::Stats { reply }).await?;
        rx.await.map_err(|_| SyncError::HubClosed)
    }
}

/// The hub task state.
pub struct Hub<S> {
    registry: Registry<S>,
    inbox: Inbox<S>,
    config: HubConfig,
    stats: HubStats,
    dropped: Arc<AtomicU64>,
}

impl<S: EventSink> Hub<S> {
    /// Create a hub and its first handle without starting it.
    pub fn new(config: HubConfig) -> (Self, HubHandle<S>) {
        let (tx, inbox) = match config.queue {
            QueuePolicy::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Outbox::Unbounded(tx), Inbox::Unbounded(rx))
            }
            QueuePolicy::Block { capacity } | QueuePolicy::DropNewest { capacity } => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (Outbox::Bounded(tx), Inbox::Bounded(rx))
            }
        };
        let dropped = Arc::new(AtomicU64::new(0));

        let handle = HubHandle {
            tx,
            policy: config.queue,
            next_id: Arc::new(AtomicU64::new(1)),
            dropped: Arc::clone(&dropped),
        };
        let hub = Self {
            registry: Registry::new(),
            inbox,
            config,
            stats: HubStats::default(),
            dropped,
        };

        (hub, handle)
    }

    /// Start the hub on the current runtime.
    pub fn spawn(config: HubConfig) -> HubHandle<S> {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Process commands until every handle is gone.
    pub async fn run(mut self) {
        tracing::debug!(
            queue = ?self.config.queue,
            echo = self.config.echo_to_sender,
            "Hub started"
        );

        while let Some(command) = self.inbox.recv().await {
            match command {
                HubCommand::Register { id, sink } => self.add_listener(id, sink),
                HubCommand::Deregister { id } => self.drop_listener(id).await,
                HubCommand::Broadcast { origin, event } => self.fan_out(origin, &event).await,
                HubCommand::Listeners { reply } => {
                    let _ = reply.send(self.registry.snapshot());
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(self.current_stats());
                }
            }
        }

        let remaining: Vec<(ListenerId, S)> = self.registry.drain().collect();
        let closed = remaining.len();
        for (id, sink) in remaining {
            self.close_sink(id, sink).await;
        }
        tracing::debug!(closed, "Hub stopped");
    }

    fn add_listener(&mut self, id: ListenerId, sink: S) {
        if self.registry.register(id, sink) {
            tracing::info!(
                listener = %id,
                listeners = self.registry.len(),
                "Listener registered"
            );
        } else {
            tracing::warn!(listener = %id, "Duplicate registration ignored");
        }
    }

    async fn drop_listener(&mut self, id: ListenerId) {
        match self.registry.deregister(id) {
            Some(sink) => {
                self.close_sink(id, sink).await;
                tracing::info!(
                    listener = %id,
                    listeners = self.registry.len(),
                    "Listener removed"
                );
            }
            None => tracing::debug!(listener = %id, "Listener already removed"),
        }
    }

    /// A peer that stopped reading never acknowledges the close handshake
    /// either, so closing is held to the write timeout too.
    async fn close_sink(&mut self, id: ListenerId, sink: S) {
        match self.config.write_timeout_duration() {
            Some(limit) => {
                if tokio::time::timeout(limit, sink.close()).await.is_err() {
                    tracing::debug!(listener = %id, "Close timed out, dropping stream");
                }
            }
            None => sink.close().await,
        }
    }

    async fn fan_out(&mut self, origin: Option<ListenerId>, event: &SyncEvent) {
        self.stats.events_processed += 1;
        let write_timeout = self.config.write_timeout_duration();

        for id in self.registry.snapshot() {
            if !self.config.echo_to_sender && origin == Some(id) {
                continue;
            }
            let Some(sink) = self.registry.get_mut(id) else {
                continue;
            };

            let result = match write_timeout {
                Some(limit) => tokio::time::timeout(limit, sink.deliver(event))
                    .await
                    .unwrap_or(Err(SyncError::WriteTimeout(limit))),
                None => sink.deliver(event).await,
            };

            match result {
                Ok(()) => self.stats.deliveries += 1,
                Err(e) => {
                    self.stats.failed_deliveries += 1;
                    tracing::warn!(listener = %id, error = %e, "Delivery failed");
                    self.drop_listener(id).await;
                }
            }
        }

        tracing::trace!(
            origin = ?origin,
            kind = %event.kind,
            position = event.position,
            file = %event.file,
            "Event fanned out"
        );
    }

    fn current_stats(&self) -> HubStats {
        HubStats {
            listeners: self.registry.len(),
            dropped_events: self.dropped.load(Ordering::Relaxed),
            ..self.stats.clone()
        }
    }
}
