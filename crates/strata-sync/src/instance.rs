//! Instance manager.
//!
//! Mirrors an externally computed transform array as backend instance
//! geometries that all reference one prototype scene.

use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::math::Mat4;
use strata_core::profiling::profile_function;
use strata_scene::PrimId;

use crate::backend::{
    BackendResult, GeometryBackend, GeometryHandle, GeometryKind, SceneHandle, UserData,
};

/// User context attached to each instance geometry.
#[derive(Debug)]
pub struct InstanceContext {
    pub prim: PrimId,
    pub instance_index: usize,
    object_to_world: RwLock<Mat4>,
}

impl InstanceContext {
    fn new(prim: PrimId, instance_index: usize) -> Self {
        Self {
            prim,
            instance_index,
            object_to_world: RwLock::new(Mat4::IDENTITY),
        }
    }

    pub fn object_to_world(&self) -> Mat4 {
        *self.object_to_world.read()
    }
}

#[derive(Debug)]
struct InstanceSlot {
    handle: GeometryHandle,
    transform: Mat4,
    context: Arc<InstanceContext>,
}

/// What one [`InstanceSet::reconcile`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub destroyed: usize,
    pub committed: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.created > 0 || self.destroyed > 0 || self.committed > 0
    }
}

/// Ordered instance handles of one prim.
#[derive(Debug, Default)]
pub struct InstanceSet {
    slots: Vec<InstanceSlot>,
}

impl InstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn handles(&self) -> Vec<GeometryHandle> {
        self.slots.iter().map(|slot| slot.handle).collect()
    }

    pub fn context(&self, index: usize) -> Option<&Arc<InstanceContext>> {
        self.slots.get(index).map(|slot| &slot.context)
    }

    /// Resize the set to `instance_transforms.len()` and bring every
    /// transform up to date.
    ///
    /// Each instance ends up at `instance_transform * local`. Only handles
    /// that are new or whose transform moved are committed, unless
    /// `prototype_changed` is set, in which case all of them are.
    #[allow(clippy::too_many_arguments)]
    pub fn reconcile(
        &mut self,
        backend: &mut dyn GeometryBackend,
        root: SceneHandle,
        prototype: SceneHandle,
        prim: &PrimId,
        instance_transforms: &[Mat4],
        local: Mat4,
        prototype_changed: bool,
    ) -> BackendResult<ReconcileReport> {
        profile_function!();
        let mut report = ReconcileReport::default();
        let target = instance_transforms.len();

        while self.slots.len() > target {
            if let Some(slot) = self.slots.pop() {
                release_slot(backend, root, slot);
                report.destroyed += 1;
            }
        }

        let first_new = self.slots.len();
        while self.slots.len() < target {
            let index = self.slots.len();
            let handle = backend.create_geometry(GeometryKind::Instance)?;
            let context = Arc::new(InstanceContext::new(prim.clone(), index));
            let setup = backend
                .set_instanced_scene(handle, prototype)
                .and_then(|_| backend.set_user_data(handle, Some(context.clone() as UserData)))
                .and_then(|_| backend.attach(root, handle));
            if let Err(err) = setup {
                if let Err(release) = backend.release_geometry(handle) {
                    tracing::error!(%prim, %release, "Failed to release unfinished instance");
                }
                return Err(err);
            }
            self.slots.push(InstanceSlot {
                handle,
                transform: Mat4::IDENTITY,
                context,
            });
            report.created += 1;
        }

        for (index, (slot, instance)) in self.slots.iter_mut().zip(instance_transforms).enumerate() {
            let world = *instance * local;
            let moved = slot.transform != world;
            if moved || index >= first_new {
                backend.set_transform(slot.handle, world)?;
                slot.transform = world;
                *slot.context.object_to_world.write() = world;
            }
            if moved || index >= first_new || prototype_changed {
                backend.commit_geometry(slot.handle)?;
                report.committed += 1;
            }
        }

        if report.changed() {
            tracing::trace!(
                prim = %prim,
                instances = self.slots.len(),
                created = report.created,
                destroyed = report.destroyed,
                "Reconciled instances"
            );
        }
        Ok(report)
    }

    /// Release every instance. Safe to call on an empty set.
    pub fn clear(&mut self, backend: &mut dyn GeometryBackend, root: SceneHandle) {
        for slot in self.slots.drain(..).rev() {
            release_slot(backend, root, slot);
        }
    }
}

// Context first, then the geometry.
fn release_slot(backend: &mut dyn GeometryBackend, root: SceneHandle, slot: InstanceSlot) {
    let result = backend
        .set_user_data(slot.handle, None)
        .and_then(|_| backend.detach(root, slot.handle))
        .and_then(|_| backend.release_geometry(slot.handle));
    if let Err(err) = result {
        tracing::error!(handle = %slot.handle, %err, "Failed to release instance");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ArenaBackend;
    use strata_core::math::Vec3;

    fn setup() -> (ArenaBackend, SceneHandle, SceneHandle) {
        let mut backend = ArenaBackend::new(4);
        let root = backend.create_scene().unwrap();
        let prototype = backend.create_scene().unwrap();
        (backend, root, prototype)
    }

    fn offsets(n: usize) -> Vec<Mat4> {
        (0..n)
            .map(|i| Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn test_grow_and_shrink() {
        let (mut backend, root, prototype) = setup();
        let prim = PrimId::new("/a");
        let mut set = InstanceSet::new();

        let report = set
            .reconcile(&mut backend, root, prototype, &prim, &offsets(3), Mat4::IDENTITY, false)
            .unwrap();
        assert_eq!(report.created, 3);
        assert_eq!(report.committed, 3);
        assert_eq!(backend.scene_geometries(root).unwrap().len(), 3);

        let report = set
            .reconcile(&mut backend, root, prototype, &prim, &offsets(1), Mat4::IDENTITY, false)
            .unwrap();
        assert_eq!(report.destroyed, 2);
        assert_eq!(report.committed, 0);
        assert_eq!(set.len(), 1);
        assert_eq!(backend.stats().live_geometries, 1);
    }

    #[test]
    fn test_only_moved_instances_commit() {
        let (mut backend, root, prototype) = setup();
        let prim = PrimId::new("/a");
        let mut set = InstanceSet::new();
        let mut xforms = offsets(3);
        set.reconcile(&mut backend, root, prototype, &prim, &xforms, Mat4::IDENTITY, false)
            .unwrap();

        xforms[1] = Mat4::from_translation(Vec3::Y);
        let report = set
            .reconcile(&mut backend, root, prototype, &prim, &xforms, Mat4::IDENTITY, false)
            .unwrap();
        assert_eq!(report.committed, 1);
        assert_eq!(set.context(1).unwrap().object_to_world(), xforms[1]);

        let report = set
            .reconcile(&mut backend, root, prototype, &prim, &xforms, Mat4::IDENTITY, true)
            .unwrap();
        assert_eq!(report.committed, 3);
    }

    #[test]
    fn test_local_transform_applied_first() {
        let (mut backend, root, prototype) = setup();
        let prim = PrimId::new("/a");
        let mut set = InstanceSet::new();
        let local = Mat4::from_scale(Vec3::splat(2.0));
        let instance = Mat4::from_translation(Vec3::X);
        set.reconcile(&mut backend, root, prototype, &prim, &[instance], local, false)
            .unwrap();
        let world = set.context(0).unwrap().object_to_world();
        assert_eq!(world.transform_point3(Vec3::ONE), Vec3::new(3.0, 2.0, 2.0));
    }

    #[test]
    fn test_failed_setup_releases_instance() {
        let (mut backend, root, prototype) = setup();
        backend.release_scene(prototype).unwrap();
        let prim = PrimId::new("/a");
        let mut set = InstanceSet::new();
        let result = set.reconcile(&mut backend, root, prototype, &prim, &offsets(2), Mat4::IDENTITY, false);
        assert!(result.is_err());
        assert!(set.is_empty());
        let stats = backend.stats();
        assert_eq!(stats.geometries_created, 1);
        assert_eq!(stats.geometries_released, 1);
        assert_eq!(stats.live_geometries, 0);
    }

    #[test]
    fn test_clear_releases_everything() {
        let (mut backend, root, prototype) = setup();
        let prim = PrimId::new("/a");
        let mut set = InstanceSet::new();
        set.reconcile(&mut backend, root, prototype, &prim, &offsets(2), Mat4::IDENTITY, false)
            .unwrap();
        set.clear(&mut backend, root);
        set.clear(&mut backend, root);
        assert!(set.is_empty());
        assert_eq!(backend.stats().live_geometries, 0);
    }
}
