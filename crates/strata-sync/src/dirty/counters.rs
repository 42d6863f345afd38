//! O(1) dirty state counters for the change tracker.

use super::DirtyBits;

/// Tracks counts of dirty prims by category for O(1) queries.
///
/// Updated incrementally whenever a prim's bits change.
#[derive(Debug, Clone, Default)]
pub struct DirtyCounters {
    /// Prims with a topology change pending.
    topology_dirty: u32,
    /// Prims with any primvar (points included) pending.
    primvar_dirty: u32,
    /// Prims with any bit at all.
    any_dirty: u32,
}

impl DirtyCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a prim's bits going from `old` to `new`.
    pub fn on_change(&mut self, old: DirtyBits, new: DirtyBits) {
        fn step(counter: &mut u32, was: bool, is: bool) {
            match (was, is) {
                (false, true) => *counter += 1,
                (true, false) => *counter = counter.saturating_sub(1),
                _ => {}
            }
        }
        step(&mut self.any_dirty, !old.is_empty(), !new.is_empty());
        step(
            &mut self.topology_dirty,
            old.is_topology_dirty(),
            new.is_topology_dirty(),
        );
        step(
            &mut self.primvar_dirty,
            old.is_any_primvar_dirty(),
            new.is_any_primvar_dirty(),
        );
    }

    #[inline]
    pub fn has_any_dirty(&self) -> bool {
        self.any_dirty > 0
    }

    pub fn summary(&self) -> DirtySummary {
        DirtySummary {
            topology_dirty: self.topology_dirty,
            primvar_dirty: self.primvar_dirty,
            any_dirty: self.any_dirty,
        }
    }
}

/// Snapshot of [`DirtyCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtySummary {
    pub topology_dirty: u32,
    pub primvar_dirty: u32,
    pub any_dirty: u32,
}
