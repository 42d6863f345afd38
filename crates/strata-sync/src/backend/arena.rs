use strata_core::alloc::SparseSet;
use strata_core::math::{Aabb, Mat4, Vec3};
use strata_core::profiling::profile_function;

use super::{
    BackendError, BackendResult, BackendStats, BoundaryMode, GeometryBackend, GeometryHandle,
    GeometryKind, HitFilter, SceneHandle, SubdivisionDesc, UserData,
};

struct SceneObject {
    geometries: Vec<GeometryHandle>,
    committed: bool,
    bounds: Aabb,
}

struct VertexAttribute {
    components: usize,
    data: Vec<f32>,
}

struct GeometryObject {
    kind: GeometryKind,
    scene: Option<SceneHandle>,
    enabled: bool,
    committed: bool,
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    subdivision: SubdivisionDesc,
    boundary: BoundaryMode,
    tessellation_rate: f32,
    attributes: Vec<Option<VertexAttribute>>,
    instanced_scene: Option<SceneHandle>,
    transform: Mat4,
    user_data: Option<UserData>,
    hit_filter: Option<HitFilter>,
}

impl GeometryObject {
    fn new(kind: GeometryKind, slots: u16) -> Self {
        Self {
            kind,
            scene: None,
            enabled: true,
            committed: false,
            vertices: Vec::new(),
            triangles: Vec::new(),
            subdivision: SubdivisionDesc::default(),
            boundary: BoundaryMode::default(),
            tessellation_rate: 1.0,
            attributes: (0..slots).map(|_| None).collect(),
            instanced_scene: None,
            transform: Mat4::IDENTITY,
            user_data: None,
            hit_filter: None,
        }
    }

    /// Vertex ids of `element`, as a triangle or an authored face.
    fn element_vertices(&self, element: u32) -> BackendResult<Vec<u32>> {
        match self.kind {
            GeometryKind::Triangles => self
                .triangles
                .get(element as usize)
                .map(|tri| tri.to_vec())
                .ok_or(BackendError::ElementOutOfRange { element }),
            GeometryKind::Subdivision => {
                let counts = &self.subdivision.face_vertex_counts;
                let count = *counts
                    .get(element as usize)
                    .ok_or(BackendError::ElementOutOfRange { element })?
                    as usize;
                let start: usize = counts[..element as usize].iter().map(|c| *c as usize).sum();
                self.subdivision
                    .face_vertex_indices
                    .get(start..start + count)
                    .map(<[u32]>::to_vec)
                    .ok_or(BackendError::ElementOutOfRange { element })
            }
            GeometryKind::Instance => Err(BackendError::WrongKind {
                expected: "surface geometry",
            }),
        }
    }
}

enum Object {
    Scene(SceneObject),
    Geometry(GeometryObject),
}

/// In-process backend that keeps every object in a generational arena.
///
/// It performs no ray tracing. It stores what it is given, evaluates vertex
/// attributes with bilinear (quads), barycentric (triangles) or averaged
/// (other polygons) weights over the coarse faces, and counts everything so
/// tests can audit object lifetimes.
pub struct ArenaBackend {
    objects: SparseSet<Object>,
    max_slots: u16,
    geometry_budget: Option<usize>,
    stats: BackendStats,
}

impl ArenaBackend {
    pub fn new(max_vertex_attribute_slots: u16) -> Self {
        Self {
            objects: SparseSet::new(),
            max_slots: max_vertex_attribute_slots,
            geometry_budget: None,
            stats: BackendStats::default(),
        }
    }

    /// Refuse to create geometry once `budget` geometries are alive.
    pub fn with_geometry_budget(mut self, budget: usize) -> Self {
        self.geometry_budget = Some(budget);
        self
    }

    pub fn set_geometry_budget(&mut self, budget: Option<usize>) {
        self.geometry_budget = budget;
    }

    fn lookup_error(&self, slot: strata_core::alloc::IndexSlot) -> BackendError {
        if self.objects.is_stale(slot) {
            BackendError::StaleHandle
        } else {
            BackendError::InvalidHandle
        }
    }

    fn scene(&self, handle: SceneHandle) -> BackendResult<&SceneObject> {
        match self.objects.get(handle.0) {
            Some(Object::Scene(scene)) => Ok(scene),
            Some(Object::Geometry(_)) => Err(BackendError::WrongKind { expected: "scene" }),
            None => Err(self.lookup_error(handle.0)),
        }
    }

    fn scene_mut(&mut self, handle: SceneHandle) -> BackendResult<&mut SceneObject> {
        let err = self.lookup_error(handle.0);
        match self.objects.get_mut(handle.0) {
            Some(Object::Scene(scene)) => Ok(scene),
            Some(Object::Geometry(_)) => Err(BackendError::WrongKind { expected: "scene" }),
            None => Err(err),
        }
    }

    fn geometry(&self, handle: GeometryHandle) -> BackendResult<&GeometryObject> {
        match self.objects.get(handle.0) {
            Some(Object::Geometry(geometry)) => Ok(geometry),
            Some(Object::Scene(_)) => Err(BackendError::WrongKind { expected: "geometry" }),
            None => Err(self.lookup_error(handle.0)),
        }
    }

    fn geometry_mut(&mut self, handle: GeometryHandle) -> BackendResult<&mut GeometryObject> {
        let err = self.lookup_error(handle.0);
        match self.objects.get_mut(handle.0) {
            Some(Object::Geometry(geometry)) => Ok(geometry),
            Some(Object::Scene(_)) => Err(BackendError::WrongKind { expected: "geometry" }),
            None => Err(err),
        }
    }

    /// Invalidate the geometry's commit and that of the scene holding it.
    fn touch(&mut self, handle: GeometryHandle) -> BackendResult<&mut GeometryObject> {
        let scene = self.geometry(handle)?.scene;
        if let Some(scene) = scene.and_then(|s| self.scene_mut(s).ok()) {
            scene.committed = false;
        }
        let geometry = self.geometry_mut(handle)?;
        geometry.committed = false;
        Ok(geometry)
    }

    fn live_counts(&self) -> (usize, usize) {
        self.objects
            .iter()
            .fold((0, 0), |(scenes, geometries), (_, object)| match object {
                Object::Scene(_) => (scenes + 1, geometries),
                Object::Geometry(_) => (scenes, geometries + 1),
            })
    }

    /// Whether `geometry` is committed and unchanged since.
    pub fn is_committed(&self, geometry: GeometryHandle) -> BackendResult<bool> {
        Ok(self.geometry(geometry)?.committed)
    }

    pub fn is_scene_committed(&self, scene: SceneHandle) -> BackendResult<bool> {
        Ok(self.scene(scene)?.committed)
    }

    pub fn scene_geometries(&self, scene: SceneHandle) -> BackendResult<Vec<GeometryHandle>> {
        Ok(self.scene(scene)?.geometries.clone())
    }

    pub fn tessellation_rate(&self, geometry: GeometryHandle) -> BackendResult<f32> {
        Ok(self.geometry(geometry)?.tessellation_rate)
    }

    pub fn boundary_mode(&self, geometry: GeometryHandle) -> BackendResult<BoundaryMode> {
        Ok(self.geometry(geometry)?.boundary)
    }

    pub fn subdivision(&self, geometry: GeometryHandle) -> BackendResult<SubdivisionDesc> {
        Ok(self.geometry(geometry)?.subdivision.clone())
    }

    pub fn transform(&self, geometry: GeometryHandle) -> BackendResult<Mat4> {
        Ok(self.geometry(geometry)?.transform)
    }
}

impl GeometryBackend for ArenaBackend {
    fn create_scene(&mut self) -> BackendResult<SceneHandle> {
        self.stats.scenes_created += 1;
        Ok(SceneHandle(self.objects.push(Object::Scene(SceneObject {
            geometries: Vec::new(),
            committed: false,
            bounds: Aabb::EMPTY,
        }))))
    }

    fn release_scene(&mut self, scene: SceneHandle) -> BackendResult<()> {
        let geometries = std::mem::take(&mut self.scene_mut(scene)?.geometries);
        for handle in geometries {
            if let Ok(geometry) = self.geometry_mut(handle) {
                geometry.scene = None;
            }
        }
        self.objects.remove(scene.0);
        self.stats.scenes_released += 1;
        Ok(())
    }

    fn create_geometry(&mut self, kind: GeometryKind) -> BackendResult<GeometryHandle> {
        if let Some(budget) = self.geometry_budget {
            let (_, live) = self.live_counts();
            if live >= budget {
                return Err(BackendError::CreationFailed(format!(
                    "geometry budget of {} exhausted",
                    budget
                )));
            }
        }
        self.stats.geometries_created += 1;
        let object = GeometryObject::new(kind, self.max_slots);
        Ok(GeometryHandle(self.objects.push(Object::Geometry(object))))
    }

    fn release_geometry(&mut self, geometry: GeometryHandle) -> BackendResult<()> {
        if let Some(scene) = self.geometry(geometry)?.scene {
            self.detach(scene, geometry)?;
        }
        self.objects.remove(geometry.0);
        self.stats.geometries_released += 1;
        Ok(())
    }

    fn attach(&mut self, scene: SceneHandle, geometry: GeometryHandle) -> BackendResult<()> {
        if let Some(previous) = self.geometry(geometry)?.scene {
            self.detach(previous, geometry)?;
        }
        let target = self.scene_mut(scene)?;
        target.geometries.push(geometry);
        target.committed = false;
        self.geometry_mut(geometry)?.scene = Some(scene);
        Ok(())
    }

    fn detach(&mut self, scene: SceneHandle, geometry: GeometryHandle) -> BackendResult<()> {
        let target = self.scene_mut(scene)?;
        target.geometries.retain(|g| *g != geometry);
        target.committed = false;
        let object = self.geometry_mut(geometry)?;
        if object.scene == Some(scene) {
            object.scene = None;
        }
        Ok(())
    }

    fn set_vertices(&mut self, geometry: GeometryHandle, points: &[Vec3]) -> BackendResult<()> {
        self.touch(geometry)?.vertices = points.to_vec();
        self.stats.vertex_uploads += 1;
        Ok(())
    }

    fn set_triangles(&mut self, geometry: GeometryHandle, indices: &[[u32; 3]]) -> BackendResult<()> {
        let object = self.touch(geometry)?;
        if object.kind != GeometryKind::Triangles {
            return Err(BackendError::WrongKind { expected: "triangle geometry" });
        }
        object.triangles = indices.to_vec();
        self.stats.index_uploads += 1;
        Ok(())
    }

    fn set_subdivision(&mut self, geometry: GeometryHandle, desc: &SubdivisionDesc) -> BackendResult<()> {
        let object = self.touch(geometry)?;
        if object.kind != GeometryKind::Subdivision {
            return Err(BackendError::WrongKind { expected: "subdivision geometry" });
        }
        object.subdivision = desc.clone();
        self.stats.index_uploads += 1;
        Ok(())
    }

    fn set_boundary_mode(&mut self, geometry: GeometryHandle, mode: BoundaryMode) -> BackendResult<()> {
        self.touch(geometry)?.boundary = mode;
        Ok(())
    }

    fn set_tessellation_rate(&mut self, geometry: GeometryHandle, rate: f32) -> BackendResult<()> {
        self.touch(geometry)?.tessellation_rate = rate;
        Ok(())
    }

    fn set_vertex_attribute(
        &mut self,
        geometry: GeometryHandle,
        slot: u32,
        components: usize,
        data: &[f32],
    ) -> BackendResult<()> {
        let object = self.touch(geometry)?;
        let entry = object
            .attributes
            .get_mut(slot as usize)
            .ok_or(BackendError::SlotOutOfRange { slot })?;
        *entry = Some(VertexAttribute {
            components,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn clear_vertex_attribute(&mut self, geometry: GeometryHandle, slot: u32) -> BackendResult<()> {
        let object = self.geometry_mut(geometry)?;
        let entry = object
            .attributes
            .get_mut(slot as usize)
            .ok_or(BackendError::SlotOutOfRange { slot })?;
        *entry = None;
        Ok(())
    }

    fn interpolate(
        &self,
        geometry: GeometryHandle,
        slot: u32,
        element: u32,
        u: f32,
        v: f32,
        out: &mut [f32],
    ) -> BackendResult<()> {
        profile_function!();
        let object = self.geometry(geometry)?;
        let attribute = object
            .attributes
            .get(slot as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::SlotOutOfRange { slot })?;
        let verts = object.element_vertices(element)?;

        let weights: Vec<f32> = match verts.len() {
            3 => vec![1.0 - u - v, u, v],
            4 => vec![(1.0 - u) * (1.0 - v), u * (1.0 - v), u * v, (1.0 - u) * v],
            n => vec![1.0 / n as f32; n],
        };

        let n = attribute.components.min(out.len());
        out[..n].fill(0.0);
        for (vertex, weight) in verts.iter().zip(weights) {
            let base = *vertex as usize * attribute.components;
            let values = attribute
                .data
                .get(base..base + attribute.components)
                .ok_or(BackendError::ElementOutOfRange { element })?;
            for (o, x) in out[..n].iter_mut().zip(values) {
                *o += weight * x;
            }
        }
        Ok(())
    }

    fn max_vertex_attribute_slots(&self) -> u16 {
        self.max_slots
    }

    fn set_enabled(&mut self, geometry: GeometryHandle, enabled: bool) -> BackendResult<()> {
        self.touch(geometry)?.enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self, geometry: GeometryHandle) -> BackendResult<bool> {
        Ok(self.geometry(geometry)?.enabled)
    }

    fn set_user_data(&mut self, geometry: GeometryHandle, data: Option<UserData>) -> BackendResult<()> {
        self.geometry_mut(geometry)?.user_data = data;
        Ok(())
    }

    fn user_data(&self, geometry: GeometryHandle) -> BackendResult<Option<UserData>> {
        Ok(self.geometry(geometry)?.user_data.clone())
    }

    fn set_hit_filter(&mut self, geometry: GeometryHandle, filter: Option<HitFilter>) -> BackendResult<()> {
        self.geometry_mut(geometry)?.hit_filter = filter;
        Ok(())
    }

    fn accepts_hit(&self, geometry: GeometryHandle, front_facing: bool) -> BackendResult<bool> {
        Ok(self
            .geometry(geometry)?
            .hit_filter
            .as_ref()
            .is_none_or(|filter| filter(front_facing)))
    }

    fn set_instanced_scene(&mut self, instance: GeometryHandle, scene: SceneHandle) -> BackendResult<()> {
        self.scene(scene)?;
        let object = self.touch(instance)?;
        if object.kind != GeometryKind::Instance {
            return Err(BackendError::WrongKind { expected: "instance" });
        }
        object.instanced_scene = Some(scene);
        Ok(())
    }

    fn set_transform(&mut self, instance: GeometryHandle, transform: Mat4) -> BackendResult<()> {
        let object = self.geometry_mut(instance)?;
        if object.kind != GeometryKind::Instance {
            return Err(BackendError::WrongKind { expected: "instance" });
        }
        if object.transform != transform {
            object.transform = transform;
            self.touch(instance)?;
        }
        Ok(())
    }

    fn commit_geometry(&mut self, geometry: GeometryHandle) -> BackendResult<()> {
        self.geometry_mut(geometry)?.committed = true;
        self.stats.geometry_commits += 1;
        Ok(())
    }

    fn commit_scene(&mut self, scene: SceneHandle) -> BackendResult<()> {
        profile_function!();
        let mut bounds = Aabb::EMPTY;
        for handle in self.scene(scene)?.geometries.clone() {
            let Ok(object) = self.geometry(handle) else {
                continue;
            };
            if !object.enabled {
                continue;
            }
            let object_bounds = match object.kind {
                GeometryKind::Instance => object
                    .instanced_scene
                    .and_then(|s| self.scene(s).ok())
                    .map_or(Aabb::EMPTY, |s| s.bounds.transformed(&object.transform)),
                _ => Aabb::from_points(&object.vertices),
            };
            bounds = bounds.union(object_bounds);
        }
        let target = self.scene_mut(scene)?;
        target.bounds = bounds;
        target.committed = true;
        self.stats.scene_commits += 1;
        Ok(())
    }

    fn scene_bounds(&self, scene: SceneHandle) -> BackendResult<Aabb> {
        Ok(self.scene(scene)?.bounds)
    }

    fn stats(&self) -> BackendStats {
        let (live_scenes, live_geometries) = self.live_counts();
        BackendStats {
            live_scenes,
            live_geometries,
            ..self.stats
        }
    }
}
