//! Single-flight, per-key instance table.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use strata_core::alloc::HashMap;

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Content-addressed table where the first caller for a key builds the
/// value and everyone else reuses it.
///
/// The table lock is only held long enough to find or create the key's slot.
/// Each slot has its own mutex, held by the returned [`RegistryInstance`], so
/// callers racing on the same key are serialized while unrelated keys
/// proceed in parallel. Entries are never evicted.
pub struct InstanceRegistry<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for InstanceRegistry<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Hash + Eq, V: Clone> InstanceRegistry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `key`, blocking while another caller holds it.
    pub fn register(&self, key: K) -> RegistryInstance<V> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key).or_default().clone()
        };
        RegistryInstance {
            guard: slot.lock_arc(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Exclusive claim on one registry key.
///
/// Dropping it releases the key. If the holder was the first instance and
/// dropped it without calling [`RegistryInstance::set_value`], the next
/// caller becomes the builder instead.
pub struct RegistryInstance<V> {
    guard: ArcMutexGuard<RawMutex, Option<V>>,
}

impl<V: Clone> RegistryInstance<V> {
    /// True if no value has been published for this key yet, so the holder
    /// is responsible for building it.
    pub fn is_first_instance(&self) -> bool {
        self.guard.is_none()
    }

    pub fn set_value(&mut self, value: V) {
        *self.guard = Some(value);
    }

    pub fn value(&self) -> Option<V> {
        self.guard.clone()
    }
}
