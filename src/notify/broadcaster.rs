//! Notifier implementations

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::events::{DashboardEvent, WsMessage};

/// Receives announcements of new records. Must never block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: DashboardEvent);
}

/// Used when real-time updates are disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: DashboardEvent) {}
}

/// Fans events out to WebSocket clients over a broadcast channel
pub struct BroadcastNotifier {
    tx: broadcast::Sender<WsMessage>,
    sequence_counter: AtomicU64,
}

impl BroadcastNotifier {
    /// Slow clients lag and miss events beyond `capacity`
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sequence_counter: AtomicU64::new(0),
        }
    }

    pub fn current_sequence_id(&self) -> u64 {
        self.sequence_counter.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: DashboardEvent) {
        let seq = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let msg = WsMessage {
            event,
            sequence_id: seq,
            timestamp: chrono::Utc::now().timestamp(),
        };
        // No receivers connected
        let _ = self.tx.send(msg);
    }
}
