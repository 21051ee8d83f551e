use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lamport logical clock shared between the command path and the
/// broadcast listener.
///
/// Clones share the same counter. Both operations are single atomic
/// read-modify-write steps, so a merge from the listener can never be lost
/// against a concurrent tick from a request.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    value: Arc<AtomicU64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance for an outbound message and return the value to attach.
    pub fn tick(&self) -> u64 {
        self.update(|local| local.saturating_add(1))
    }

    /// Fold in a peer's clock: `local = max(local, received) + 1`.
    pub fn merge(&self, received: u64) -> u64 {
        self.update(|local| local.max(received).saturating_add(1))
    }

    /// Merge a clock value as read off the wire. Negative values carry no
    /// ordering information beyond our own, so they count as zero.
    pub fn merge_wire(&self, received: i64) -> u64 {
        self.merge(u64::try_from(received).unwrap_or(0))
    }

    /// Current value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    fn update(&self, f: impl Fn(u64) -> u64) -> u64 {
        let prev = match self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(f(v)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        f(prev)
    }
}
