use strata_core::alloc::HashMap;
use strata_scene::PrimId;

use super::{DirtyBits, DirtyCounters, DirtySummary};

/// Orchestration-side record of which prims need syncing.
///
/// The scene marks bits as edits arrive. A sync pass reads them, hands them
/// to the prim, and stores back whatever the prim left uncleared.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    bits: HashMap<PrimId, DirtyBits>,
    counters: DirtyCounters,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a prim with its initial bits.
    pub fn insert(&mut self, id: PrimId, initial: DirtyBits) {
        let old = self.bits.insert(id, initial).unwrap_or_default();
        self.counters.on_change(old, initial);
    }

    pub fn remove(&mut self, id: &PrimId) -> Option<DirtyBits> {
        let old = self.bits.remove(id)?;
        self.counters.on_change(old, DirtyBits::CLEAN);
        Some(old)
    }

    pub fn contains(&self, id: &PrimId) -> bool {
        self.bits.contains_key(id)
    }

    /// OR `bits` into the prim's bits. Unknown prims are ignored.
    pub fn mark_dirty(&mut self, id: &PrimId, bits: DirtyBits) {
        let Some(current) = self.bits.get_mut(id) else {
            tracing::warn!(prim = %id, "mark_dirty on untracked prim");
            return;
        };
        let old = *current;
        *current |= bits;
        self.counters.on_change(old, *current);
    }

    /// Replace the prim's bits with what a sync left uncleared.
    pub fn mark_clean(&mut self, id: &PrimId, remaining: DirtyBits) {
        if let Some(current) = self.bits.get_mut(id) {
            let old = *current;
            *current = remaining;
            self.counters.on_change(old, remaining);
        }
    }

    pub fn dirty_bits(&self, id: &PrimId) -> DirtyBits {
        self.bits.get(id).copied().unwrap_or_default()
    }

    /// Prims with any bit set, in id order.
    pub fn dirty_prims(&self) -> Vec<PrimId> {
        if !self.counters.has_any_dirty() {
            return Vec::new();
        }
        let mut prims: Vec<PrimId> = self
            .bits
            .iter()
            .filter(|(_, bits)| !bits.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        prims.sort();
        prims
    }

    pub fn summary(&self) -> DirtySummary {
        self.counters.summary()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_clean() {
        let mut tracker = ChangeTracker::new();
        let id = PrimId::new("/mesh");
        tracker.insert(id.clone(), DirtyBits::INITIAL_MESH);
        assert_eq!(tracker.dirty_prims(), vec![id.clone()]);
        assert_eq!(tracker.summary().topology_dirty, 1);

        tracker.mark_clean(&id, DirtyBits::CLEAN);
        assert!(tracker.dirty_prims().is_empty());
        assert_eq!(tracker.summary().any_dirty, 0);
    }

    #[test]
    fn test_mark_dirty_accumulates() {
        let mut tracker = ChangeTracker::new();
        let id = PrimId::new("/mesh");
        tracker.insert(id.clone(), DirtyBits::CLEAN);
        tracker.mark_dirty(&id, DirtyBits::POINTS);
        tracker.mark_dirty(&id, DirtyBits::TRANSFORM);
        assert_eq!(tracker.dirty_bits(&id), DirtyBits::POINTS | DirtyBits::TRANSFORM);
        assert_eq!(tracker.summary().any_dirty, 1);
        assert_eq!(tracker.summary().primvar_dirty, 1);
    }

    #[test]
    fn test_clean_prims_not_listed() {
        let mut tracker = ChangeTracker::new();
        tracker.insert(PrimId::new("/a"), DirtyBits::CLEAN);
        tracker.insert(PrimId::new("/b"), DirtyBits::CLEAN);
        assert!(tracker.dirty_prims().is_empty());

        tracker.mark_dirty(&PrimId::new("/b"), DirtyBits::VISIBILITY);
        assert_eq!(tracker.dirty_prims(), vec![PrimId::new("/b")]);
    }

    #[test]
    fn test_remove_updates_counters() {
        let mut tracker = ChangeTracker::new();
        let id = PrimId::new("/mesh");
        tracker.insert(id.clone(), DirtyBits::TOPOLOGY);
        assert_eq!(tracker.remove(&id), Some(DirtyBits::TOPOLOGY));
        assert!(!tracker.contains(&id));
        assert_eq!(tracker.summary().topology_dirty, 0);
    }
}
