//! Single-slot command cell.

use std::sync::Mutex;

/// Holds at most one pending command between control-loop ticks.
///
/// A newly submitted command replaces whatever was waiting; the overwritten
/// command is returned to the caller so the replacement can be logged.
/// Last-write-wins is deliberate: operators expect the most recent order to
/// stand, and the loop executes at most one command per tick anyway.
#[derive(Debug, Default)]
pub struct CommandSlot<C> {
    inner: Mutex<Option<C>>,
}

impl<C> CommandSlot<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Queues a command, returning the one it displaced, if any.
    pub fn submit(&self, command: C) -> Option<C> {
        let mut slot = match self.inner.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.replace(command)
    }

    /// Removes the pending command for execution.
    pub fn take(&self) -> Option<C> {
        let mut slot = match self.inner.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }
}
