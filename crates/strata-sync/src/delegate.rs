//! The render delegate: owns the prims, the shared registry and the backend,
//! and exposes the sync / finalize API to the orchestration layer.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rayon::prelude::*;
use strata_core::alloc::HashMap;
use strata_core::config::SyncConfig;
use strata_core::math::Mat4;
use strata_core::profiling::{self, profile_function, profile_scope};
use strata_scene::{PrimId, SceneDelegate};

use crate::backend::{ArenaBackend, BackendStats, GeometryBackend, GeometryHandle, SceneHandle};
use crate::curves::BasisCurves;
use crate::dirty::{ChangeTracker, DirtyBits};
use crate::error::{SyncError, SyncResult};
use crate::instance::InstanceContext;
use crate::mesh::{Mesh, PrototypeContext};
use crate::registry::ResourceRegistry;
use crate::repr::{ReprDesc, ReprTable};
use crate::sampler::SampleValue;

/// Shared collaborators handed to a prim for one sync call.
pub struct SyncContext<'a, B: GeometryBackend> {
    pub scene: &'a dyn SceneDelegate,
    pub registry: &'a ResourceRegistry,
    pub backend: &'a Mutex<B>,
    /// Top-level scene that instances attach to.
    pub root: SceneHandle,
    pub config: &'a SyncConfig,
}

/// A synchronized prim.
pub enum Prim {
    Mesh(Mesh),
    Curves(BasisCurves),
}

impl Prim {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Prim::Mesh(_) => "mesh",
            Prim::Curves(_) => "basis curves",
        }
    }

    pub fn initial_dirty_bits(&self) -> DirtyBits {
        match self {
            Prim::Mesh(_) => Mesh::initial_dirty_bits(),
            Prim::Curves(_) => BasisCurves::initial_dirty_bits(),
        }
    }
}

/// A ray hit as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Instance geometry in the top-level scene.
    pub instance: GeometryHandle,
    /// Prototype geometry inside the instanced scene.
    pub geometry: GeometryHandle,
    pub element: u32,
    pub u: f32,
    pub v: f32,
    pub front_facing: bool,
}

/// A hit mapped back to the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHit {
    pub prim: PrimId,
    pub instance_index: usize,
    pub object_to_world: Mat4,
    /// Whether the prim's cull state keeps this hit.
    pub accepted: bool,
}

/// Synchronization engine for one backend.
///
/// Configure every representation before the first sync. Prims may be
/// synced from several threads at once; backend edits are serialized
/// behind an internal lock.
pub struct RenderDelegate<B: GeometryBackend = ArenaBackend> {
    config: SyncConfig,
    registry: Arc<ResourceRegistry>,
    mesh_reprs: ReprTable,
    curves_reprs: ReprTable,
    backend: Mutex<B>,
    root: SceneHandle,
    prims: RwLock<HashMap<PrimId, Arc<Mutex<Prim>>>>,
}

impl RenderDelegate<ArenaBackend> {
    /// Delegate over the in-process arena backend.
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        let backend = ArenaBackend::new(config.max_vertex_attribute_slots);
        Self::with_backend(config, backend)
    }
}

impl<B: GeometryBackend> RenderDelegate<B> {
    pub fn with_backend(config: SyncConfig, mut backend: B) -> SyncResult<Self> {
        let root = backend.create_scene()?;
        tracing::info!(
            safe_mode = config.verify_topology_hashes,
            refined_curves = config.force_refined_curves,
            "Created render delegate"
        );
        Ok(Self {
            registry: Arc::new(ResourceRegistry::new(config.verify_topology_hashes)),
            mesh_reprs: ReprTable::new(),
            curves_reprs: ReprTable::with_forced_refinement(config.force_refined_curves),
            backend: Mutex::new(backend),
            root,
            prims: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn root_scene(&self) -> SceneHandle {
        self.root
    }

    pub fn configure_mesh_repr(&mut self, name: &str, descs: impl IntoIterator<Item = ReprDesc>) {
        self.mesh_reprs.configure(name, descs);
    }

    pub fn configure_curves_repr(&mut self, name: &str, descs: impl IntoIterator<Item = ReprDesc>) {
        self.curves_reprs.configure(name, descs);
    }

    pub fn mesh_reprs(&self) -> &ReprTable {
        &self.mesh_reprs
    }

    pub fn curves_reprs(&self) -> &ReprTable {
        &self.curves_reprs
    }

    fn insert(&self, id: PrimId, prim: Prim) -> DirtyBits {
        let bits = prim.initial_dirty_bits();
        tracing::debug!(prim = %id, kind = prim.kind_name(), "Inserted prim");
        let previous = self.prims.write().insert(id.clone(), Arc::new(Mutex::new(prim)));
        if let Some(previous) = previous {
            tracing::warn!(prim = %id, "Replacing an existing prim");
            self.finalize_prim(&mut previous.lock());
        }
        bits
    }

    /// Track a new mesh. Returns the bits its first sync needs.
    pub fn insert_mesh(&self, id: impl Into<PrimId>) -> DirtyBits {
        let id = id.into();
        self.insert(id.clone(), Prim::Mesh(Mesh::new(id)))
    }

    /// Track new basis curves. Returns the bits their first sync needs.
    pub fn insert_curves(&self, id: impl Into<PrimId>) -> DirtyBits {
        let id = id.into();
        self.insert(id.clone(), Prim::Curves(BasisCurves::new(id)))
    }

    /// Finalize and forget a prim.
    pub fn remove_prim(&self, id: &PrimId) -> SyncResult<()> {
        let prim = self
            .prims
            .write()
            .remove(id)
            .ok_or_else(|| SyncError::UnknownPrim { id: id.clone() })?;
        self.finalize_prim(&mut prim.lock());
        Ok(())
    }

    pub fn prim_ids(&self) -> Vec<PrimId> {
        let mut ids: Vec<PrimId> = self.prims.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn prim(&self, id: &PrimId) -> SyncResult<Arc<Mutex<Prim>>> {
        self.prims
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPrim { id: id.clone() })
    }

    /// Bits the first sync of `id` must be given.
    pub fn initial_dirty_bits(&self, id: &PrimId) -> SyncResult<DirtyBits> {
        Ok(self.prim(id)?.lock().initial_dirty_bits())
    }

    /// Sync one prim for representation `repr`, returning the bits it left
    /// dirty.
    pub fn sync(
        &self,
        scene: &dyn SceneDelegate,
        id: &PrimId,
        bits: DirtyBits,
        repr: &str,
    ) -> SyncResult<DirtyBits> {
        profile_function!();
        let prim = self.prim(id)?;
        let mut prim = prim.lock();
        let ctx = SyncContext {
            scene,
            registry: &self.registry,
            backend: &self.backend,
            root: self.root,
            config: &self.config,
        };
        let remaining = match &mut *prim {
            Prim::Mesh(mesh) => {
                let descs = self.mesh_reprs.find(repr)?;
                mesh.sync(&ctx, bits, descs)
            }
            Prim::Curves(curves) => {
                let descs = self.curves_reprs.find(repr)?;
                curves.sync(&ctx, bits, repr, descs, self.curves_reprs.force_refined())
            }
        };
        tracing::trace!(prim = %id, ?bits, ?remaining, "Synced prim");
        Ok(remaining)
    }

    /// Release every backend object of `id`. Idempotent.
    pub fn finalize(&self, id: &PrimId) -> SyncResult<()> {
        let prim = self.prim(id)?;
        self.finalize_prim(&mut prim.lock());
        Ok(())
    }

    fn finalize_prim(&self, prim: &mut Prim) {
        match prim {
            Prim::Mesh(mesh) => {
                let mut backend = self.backend.lock();
                mesh.finalize(&mut *backend, self.root);
            }
            Prim::Curves(curves) => curves.finalize(),
        }
    }

    /// Upload queued buffer sources and commit the top-level scene. Returns
    /// the number of sources written.
    pub fn commit(&self) -> SyncResult<usize> {
        profile_function!();
        let written = self.registry.commit();
        self.backend.lock().commit_scene(self.root)?;
        Ok(written)
    }

    /// Sync every dirty prim in `tracker` in parallel, then commit once.
    ///
    /// Bits each prim leaves dirty are written back to the tracker. The first
    /// error is returned after every other prim has been synced.
    pub fn sync_all(
        &self,
        scene: &dyn SceneDelegate,
        tracker: &mut ChangeTracker,
        repr: &str,
    ) -> SyncResult<usize> {
        profile_function!();
        let work: Vec<(PrimId, DirtyBits)> = tracker
            .dirty_prims()
            .into_iter()
            .map(|id| {
                let bits = tracker.dirty_bits(&id);
                (id, bits)
            })
            .collect();

        let results: Vec<(PrimId, SyncResult<DirtyBits>)> = {
            profile_scope!("parallel_sync");
            work.into_par_iter()
                .map(|(id, bits)| {
                    let result = self.sync(scene, &id, bits, repr);
                    (id, result)
                })
                .collect()
        };

        let synced = results.len();
        let mut first_error = None;
        for (id, result) in results {
            match result {
                Ok(remaining) => tracker.mark_clean(&id, remaining),
                Err(err) => {
                    tracing::error!(prim = %id, %err, "Sync failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        self.commit()?;
        profiling::new_frame();
        match first_error {
            Some(err) => Err(err),
            None => Ok(synced),
        }
    }

    /// Map a backend hit back to its prim and instance.
    pub fn resolve_hit(&self, hit: &Hit) -> Option<ResolvedHit> {
        let backend = self.backend.lock();
        let instance = backend
            .user_data(hit.instance)
            .ok()??
            .downcast::<InstanceContext>()
            .ok()?;
        let prototype = backend
            .user_data(hit.geometry)
            .ok()??
            .downcast::<PrototypeContext>()
            .ok()?;
        if prototype.prim != instance.prim {
            tracing::warn!(
                instance = %instance.prim,
                prototype = %prototype.prim,
                "Hit instance and prototype belong to different prims"
            );
            return None;
        }
        let accepted = backend
            .accepts_hit(hit.geometry, hit.front_facing)
            .unwrap_or(false);
        Some(ResolvedHit {
            prim: instance.prim.clone(),
            instance_index: instance.instance_index,
            object_to_world: instance.object_to_world(),
            accepted,
        })
    }

    /// Sample primvar `name` of the prim that was hit.
    pub fn sample_hit(&self, hit: &Hit, name: &str) -> Option<SampleValue> {
        let backend = self.backend.lock();
        let prototype = backend
            .user_data(hit.geometry)
            .ok()??
            .downcast::<PrototypeContext>()
            .ok()?;
        let samplers = prototype.samplers.read();
        samplers.sample(name, hit.element, hit.u, hit.v, &*backend)
    }

    /// Exclusive access to the backend, for inspection.
    pub fn backend(&self) -> MutexGuard<'_, B> {
        self.backend.lock()
    }

    pub fn backend_stats(&self) -> BackendStats {
        self.backend.lock().stats()
    }

    pub fn with_mesh<R>(&self, id: &PrimId, f: impl FnOnce(&Mesh) -> R) -> SyncResult<R> {
        let prim = self.prim(id)?;
        let prim = prim.lock();
        match &*prim {
            Prim::Mesh(mesh) => Ok(f(mesh)),
            _ => Err(SyncError::WrongPrimType {
                id: id.clone(),
                expected: "mesh",
            }),
        }
    }

    pub fn with_curves<R>(&self, id: &PrimId, f: impl FnOnce(&BasisCurves) -> R) -> SyncResult<R> {
        let prim = self.prim(id)?;
        let prim = prim.lock();
        match &*prim {
            Prim::Curves(curves) => Ok(f(curves)),
            _ => Err(SyncError::WrongPrimType {
                id: id.clone(),
                expected: "basis curves",
            }),
        }
    }
}

impl<B: GeometryBackend> Drop for RenderDelegate<B> {
    fn drop(&mut self) {
        let prims: Vec<Arc<Mutex<Prim>>> = self.prims.write().drain().map(|(_, p)| p).collect();
        for prim in prims {
            self.finalize_prim(&mut prim.lock());
        }
        if let Err(err) = self.backend.get_mut().release_scene(self.root) {
            tracing::error!(%err, "Failed to release root scene");
        }
    }
}
