//! Content-addressed resource registry.
//!
//! Deduplicates topology, triangulations and index ranges across prims by
//! structural hash, with at most one builder per key, and queues buffer
//! uploads until [`ResourceRegistry::commit`].

mod buffer;
mod instance;

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use strata_core::profiling::{profile_function, profile_scope};

use crate::topology::{CurveTopology, MeshTopology, TopologyId, Triangulation};

pub use buffer::{BufferRange, BufferRole, BufferSource, BufferSpec};
pub use instance::{InstanceRegistry, RegistryInstance};

/// Which index buffer of a topology a range holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexVariant {
    /// Triangulated mesh faces.
    Triangles,
    /// Refined or points curve indices.
    Indices,
    /// Hull curve indices.
    HullIndices,
}

/// Key the resources derived from a topology are registered under.
///
/// A topology whose hash collided with different content gets
/// [`ResourceKey::Private`]: its triangulation and index ranges are built
/// for the caller alone and never enter the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Shared(TopologyId),
    Private,
}

impl ResourceKey {
    /// Fold a variant flag into a shared key. Private keys stay private.
    pub fn combine(self, flag: bool) -> Self {
        match self {
            ResourceKey::Shared(id) => ResourceKey::Shared(id.combine(flag)),
            ResourceKey::Private => ResourceKey::Private,
        }
    }

    pub fn is_private(self) -> bool {
        self == ResourceKey::Private
    }
}

/// A topology returned by the registry with the key for its derived
/// resources.
#[derive(Debug)]
pub struct SharedTopology<V> {
    pub topology: Arc<V>,
    pub key: ResourceKey,
}

/// Snapshot of registry activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub topology_builds: usize,
    pub triangulation_builds: usize,
    pub index_range_builds: usize,
    pub hash_collisions: usize,
    pub ranges_allocated: usize,
    pub sources_committed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    topology_builds: AtomicUsize,
    triangulation_builds: AtomicUsize,
    index_range_builds: AtomicUsize,
    hash_collisions: AtomicUsize,
    ranges_allocated: AtomicUsize,
    sources_committed: AtomicUsize,
}

struct PendingUpload {
    range: Arc<BufferRange>,
    sources: Vec<BufferSource>,
}

/// Shared cache of derived resources.
///
/// One registry serves every sync worker. It has no global state: create it,
/// hand an `Arc` to the engine, and drop it on teardown.
pub struct ResourceRegistry {
    verify: bool,
    mesh_topologies: InstanceRegistry<TopologyId, Arc<MeshTopology>>,
    curve_topologies: InstanceRegistry<TopologyId, Arc<CurveTopology>>,
    triangulations: InstanceRegistry<TopologyId, Arc<Triangulation>>,
    index_ranges: InstanceRegistry<(TopologyId, IndexVariant), Arc<BufferRange>>,
    pending: Mutex<Vec<PendingUpload>>,
    next_range_id: AtomicU64,
    counters: Counters,
}

impl ResourceRegistry {
    /// `verify` enables the equality re-check on every hash hit.
    pub fn new(verify: bool) -> Self {
        Self {
            verify,
            mesh_topologies: InstanceRegistry::new(),
            curve_topologies: InstanceRegistry::new(),
            triangulations: InstanceRegistry::new(),
            index_ranges: InstanceRegistry::new(),
            pending: Mutex::new(Vec::new()),
            next_range_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    pub fn register_mesh_topology(&self, id: TopologyId) -> RegistryInstance<Arc<MeshTopology>> {
        self.mesh_topologies.register(id)
    }

    pub fn register_curve_topology(&self, id: TopologyId) -> RegistryInstance<Arc<CurveTopology>> {
        self.curve_topologies.register(id)
    }

    pub fn register_triangulation(&self, id: TopologyId) -> RegistryInstance<Arc<Triangulation>> {
        self.triangulations.register(id)
    }

    pub fn register_index_range(
        &self,
        id: TopologyId,
        variant: IndexVariant,
    ) -> RegistryInstance<Arc<BufferRange>> {
        self.index_ranges.register((id, variant))
    }

    /// Share `candidate` under `id`.
    ///
    /// The first caller publishes its candidate. Later callers get the
    /// published value, unless verification is on and the two differ: that
    /// is a hash collision, which is logged and answered with the caller's
    /// own candidate under a private key, so neither the topology nor
    /// anything derived from it is aliased.
    fn share<V: PartialEq + Debug>(
        &self,
        table: &InstanceRegistry<TopologyId, Arc<V>>,
        id: TopologyId,
        candidate: V,
        what: &'static str,
    ) -> SharedTopology<V> {
        let mut instance = table.register(id);
        match instance.value() {
            Some(shared) => {
                if self.verify && *shared != candidate {
                    self.counters.hash_collisions.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(%id, "Hash collision between distinct {} values", what);
                    return SharedTopology {
                        topology: Arc::new(candidate),
                        key: ResourceKey::Private,
                    };
                }
                SharedTopology {
                    topology: shared,
                    key: ResourceKey::Shared(id),
                }
            }
            None => {
                let value = Arc::new(candidate);
                instance.set_value(value.clone());
                self.counters.topology_builds.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%id, "Registered new {}", what);
                SharedTopology {
                    topology: value,
                    key: ResourceKey::Shared(id),
                }
            }
        }
    }

    pub fn share_mesh_topology(&self, id: TopologyId, topology: MeshTopology) -> SharedTopology<MeshTopology> {
        self.share(&self.mesh_topologies, id, topology, "mesh topology")
    }

    pub fn share_curve_topology(
        &self,
        id: TopologyId,
        topology: CurveTopology,
    ) -> SharedTopology<CurveTopology> {
        self.share(&self.curve_topologies, id, topology, "curve topology")
    }

    /// Triangulation of `topology`. Shared keys are built by the first
    /// caller; private keys are built every time.
    pub fn triangulation(&self, key: ResourceKey, topology: &MeshTopology) -> Arc<Triangulation> {
        let mut instance = match key {
            ResourceKey::Shared(id) => {
                let instance = self.register_triangulation(id);
                if let Some(shared) = instance.value() {
                    return shared;
                }
                Some(instance)
            }
            ResourceKey::Private => None,
        };
        let triangulation = Arc::new(topology.triangulate());
        if let Some(instance) = &mut instance {
            instance.set_value(triangulation.clone());
        }
        self.counters
            .triangulation_builds
            .fetch_add(1, Ordering::Relaxed);
        triangulation
    }

    /// Index range for `(key, variant)`.
    ///
    /// `build` returns the sources to upload; the range is allocated from
    /// their specs and queued. For a shared key it runs only for the first
    /// caller.
    pub fn index_range(
        &self,
        key: ResourceKey,
        variant: IndexVariant,
        build: impl FnOnce() -> Vec<BufferSource>,
    ) -> Arc<BufferRange> {
        let mut instance = match key {
            ResourceKey::Shared(id) => {
                let instance = self.register_index_range(id, variant);
                if let Some(shared) = instance.value() {
                    return shared;
                }
                Some(instance)
            }
            ResourceKey::Private => None,
        };
        let sources = build();
        let mut specs = Vec::new();
        for source in &sources {
            source.add_buffer_specs(&mut specs);
        }
        let range = self.allocate_buffer_range(BufferRole::Topology, specs);
        self.add_sources(&range, sources);
        if let Some(instance) = &mut instance {
            instance.set_value(range.clone());
        }
        self.counters
            .index_range_builds
            .fetch_add(1, Ordering::Relaxed);
        range
    }

    pub fn allocate_buffer_range(&self, role: BufferRole, specs: Vec<BufferSpec>) -> Arc<BufferRange> {
        let id = self.next_range_id.fetch_add(1, Ordering::Relaxed);
        self.counters.ranges_allocated.fetch_add(1, Ordering::Relaxed);
        Arc::new(BufferRange::new(id, role, specs))
    }

    /// Queue `sources` for upload into `range` on the next commit.
    pub fn add_sources(&self, range: &Arc<BufferRange>, sources: Vec<BufferSource>) {
        if sources.is_empty() {
            return;
        }
        self.pending.lock().push(PendingUpload {
            range: range.clone(),
            sources,
        });
    }

    pub fn pending_sources(&self) -> usize {
        self.pending.lock().iter().map(|p| p.sources.len()).sum()
    }

    /// Resolve and write every queued source, in queue order.
    ///
    /// Returns the number of sources written.
    pub fn commit(&self) -> usize {
        profile_function!();
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut written = 0;
        for upload in pending {
            profile_scope!("commit_range");
            for source in upload.sources {
                let name = source.name().to_string();
                if upload.range.write(&name, source.resolve()) {
                    written += 1;
                }
            }
        }
        self.counters
            .sources_committed
            .fetch_add(written, Ordering::Relaxed);
        if written > 0 {
            tracing::debug!(written, "Committed buffer sources");
        }
        written
    }

    pub fn stats(&self) -> RegistryStats {
        let c = &self.counters;
        RegistryStats {
            topology_builds: c.topology_builds.load(Ordering::Relaxed),
            triangulation_builds: c.triangulation_builds.load(Ordering::Relaxed),
            index_range_builds: c.index_range_builds.load(Ordering::Relaxed),
            hash_collisions: c.hash_collisions.load(Ordering::Relaxed),
            ranges_allocated: c.ranges_allocated.load(Ordering::Relaxed),
            sources_committed: c.sources_committed.load(Ordering::Relaxed),
        }
    }
}
