//! Slot → poll-timer table.
//!
//! Each slot holds at most one live [`PollHandle`]. Installing a handle for a
//! slot first cancels whatever occupies it. Handles are removed by id, so a
//! poll that outlives its slot (because a newer one replaced it) never
//! clears its successor.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::task::Slot;

/// An active repeating poll occupying one slot.
#[derive(Debug, Clone)]
pub struct PollHandle {
    id: u64,
    token: CancellationToken,
}

impl PollHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[derive(Default)]
pub struct TimerTable {
    cells: Mutex<[Option<PollHandle>; 5]>,
    next_id: AtomicU64,
}

impl TimerTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_cells<R>(&self, f: impl FnOnce(&mut [Option<PollHandle>; 5]) -> R) -> R {
        // The cells stay consistent across a panic (plain Option swaps), so a
        // poisoned lock is safe to reuse.
        let mut cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut cells)
    }

    /// Install a new handle for `slot`, cancelling the previous occupant.
    ///
    /// The handle's token is a child of `parent`: cancelling the parent
    /// (the upload cycle) cancels every poll of that cycle.
    pub fn install(self: &Arc<Self>, slot: Slot, parent: &CancellationToken) -> TimerGuard {
        let handle = PollHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            token: parent.child_token(),
        };

        let previous = self.with_cells(|cells| cells[slot.index()].replace(handle.clone()));
        if let Some(previous) = previous {
            tracing::debug!(slot = %slot, handle = previous.id, "Cancelling superseded poll timer");
            previous.cancel();
        }

        tracing::debug!(slot = %slot, handle = handle.id, "Poll timer started");
        TimerGuard {
            table: Arc::clone(self),
            slot,
            handle,
        }
    }

    /// Cancel and clear the handle occupying `slot`, if any.
    pub fn cancel(&self, slot: Slot) -> bool {
        match self.with_cells(|cells| cells[slot.index()].take()) {
            Some(handle) => {
                tracing::debug!(slot = %slot, handle = handle.id, "Clearing poll timer");
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for slot in Slot::ALL {
            self.cancel(slot);
        }
    }

    /// Clear `slot` only if it still holds the handle `id`.
    fn clear_if(&self, slot: Slot, id: u64) -> bool {
        self.with_cells(|cells| {
            let cell = &mut cells[slot.index()];
            if cell.as_ref().is_some_and(|h| h.id == id) {
                *cell = None;
                true
            } else {
                false
            }
        })
    }

    pub fn handle(&self, slot: Slot) -> Option<PollHandle> {
        self.with_cells(|cells| cells[slot.index()].clone())
    }

    pub fn is_active(&self, slot: Slot) -> bool {
        self.handle(slot).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.with_cells(|cells| cells.iter().filter(|c| c.is_some()).count())
    }
}

/// Owns one installed handle; cancels and clears it on drop.
pub struct TimerGuard {
    table: Arc<TimerTable>,
    slot: Slot,
    handle: PollHandle,
}

impl TimerGuard {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn id(&self) -> u64 {
        self.handle.id
    }

    pub fn token(&self) -> CancellationToken {
        self.handle.token()
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.handle.cancel();
        if self.table.clear_if(self.slot, self.handle.id) {
            tracing::debug!(slot = %self.slot, handle = self.handle.id, "Poll timer cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_drop_clears_cell() {
        let table = TimerTable::new();
        let cycle = CancellationToken::new();

        let guard = table.install(Slot::Walls, &cycle);
        assert!(table.is_active(Slot::Walls));
        assert_eq!(table.active_count(), 1);
        let token = guard.token();

        drop(guard);
        assert!(!table.is_active(Slot::Walls));
        assert!(token.is_cancelled());
        assert!(!cycle.is_cancelled());
    }

    #[test]
    fn install_cancels_previous_occupant() {
        let table = TimerTable::new();
        let cycle = CancellationToken::new();

        let first = table.install(Slot::Icons, &cycle);
        let second = table.install(Slot::Icons, &cycle);

        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());
        assert_eq!(table.handle(Slot::Icons).map(|h| h.id()), Some(second.id()));

        // The stale guard must not clear its successor.
        drop(first);
        assert!(table.is_active(Slot::Icons));

        drop(second);
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn cancel_all_clears_every_slot() {
        let table = TimerTable::new();
        let cycle = CancellationToken::new();
        let guards: Vec<TimerGuard> = Slot::ALL.iter().map(|&s| table.install(s, &cycle)).collect();
        assert_eq!(table.active_count(), 5);

        table.cancel_all();
        assert_eq!(table.active_count(), 0);
        assert!(guards.iter().all(|g| g.token().is_cancelled()));
    }

    #[test]
    fn cancelling_cycle_cancels_handles() {
        let table = TimerTable::new();
        let cycle = CancellationToken::new();
        let guard = table.install(Slot::Statistics, &cycle);

        cycle.cancel();
        assert!(guard.token().is_cancelled());
        // Still occupying the cell until the poll observes the cancellation.
        assert!(table.is_active(Slot::Statistics));
    }

    #[test]
    fn cancel_empty_slot_is_noop() {
        let table = TimerTable::new();
        assert!(!table.cancel(Slot::Background));
    }

    #[test]
    fn handle_ids_increase() {
        let table = TimerTable::new();
        let cycle = CancellationToken::new();
        let a = table.install(Slot::Walls, &cycle);
        let b = table.install(Slot::Spaces, &cycle);
        assert!(b.id() > a.id());
    }
}
