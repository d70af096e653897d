use indexmap::IndexMap;
use tracing::debug;

/// Reward amounts keyed by server-issued event identifier.
///
/// Entries are credited provisionally when recorded and finalized exactly once
/// when consumed; consuming an unknown identifier is always safe and returns 0.
#[derive(Debug, Clone, Default)]
pub struct RewardLedger {
    pending: IndexMap<String, i64>,
}

impl RewardLedger {
    /// Record (or overwrite) a pending credit for `event_id`.
    pub fn record_pending(&mut self, event_id: &str, amount: i64) {
        if let Some(previous) = self.pending.insert(event_id.to_string(), amount) {
            debug!(event_id, previous, amount, "pending reward overwritten");
        }
    }

    /// Remove and return the pending credit for `event_id`, or 0 when absent.
    pub fn consume(&mut self, event_id: &str) -> i64 {
        self.pending.shift_remove(event_id).unwrap_or(0)
    }

    /// Drain every pending entry in insertion order.
    pub fn drain_pending(&mut self) -> Vec<(String, i64)> {
        self.pending.drain(..).collect()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no credits are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
