//! Delayed-add, immediate-clear error accumulation.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::kinds::ErrorKind;

/// Hysteresis filter between raw detections and active errors.
///
/// A reported condition sits pending until it has persisted for its delay;
/// only then does it become active and visible to recovery. Clearing is
/// immediate and also wipes the pending timer, so a condition that flaps
/// must persist for its full delay again. Flapping hardware therefore never
/// triggers recovery, while a real fault always does.
#[derive(Debug, Default)]
pub struct ErrorSet {
    pending: HashMap<ErrorKind, Instant>,
    active: BTreeSet<ErrorKind>,
}

impl ErrorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a condition observed at `now`.
    ///
    /// Zero delay activates immediately. Re-reporting an already active
    /// kind is a no-op.
    pub fn report(&mut self, kind: ErrorKind, delay: Duration, now: Instant) {
        if self.active.contains(&kind) {
            return;
        }
        let first_seen = *self.pending.entry(kind).or_insert(now);
        if now.duration_since(first_seen) >= delay {
            self.pending.remove(&kind);
            self.active.insert(kind);
        }
    }

    /// Reports a critical condition: the entire set collapses to this kind.
    pub fn report_critical(&mut self, kind: ErrorKind) {
        self.pending.clear();
        self.active.clear();
        self.active.insert(kind);
    }

    /// Clears one condition, pending and active alike.
    pub fn clear(&mut self, kind: ErrorKind) {
        self.pending.remove(&kind);
        self.active.remove(&kind);
    }

    /// Clears every condition not in `observed` this cycle.
    pub fn retain(&mut self, observed: &[ErrorKind]) {
        self.pending.retain(|kind, _| observed.contains(kind));
        self.active.retain(|kind| observed.contains(kind));
    }

    /// Active errors in priority order.
    #[must_use]
    pub fn active(&self) -> Vec<ErrorKind> {
        self.active.iter().copied().collect()
    }

    /// Highest-priority active error.
    #[must_use]
    pub fn top(&self) -> Option<ErrorKind> {
        self.active.iter().next().copied()
    }

    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.active.is_empty()
    }
}
