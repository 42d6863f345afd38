//! Mesh prim: pulls scene data, shares topology through the registry and
//! owns the backend prototype geometry, its samplers and its instances.

pub mod builder;
mod context;

use std::sync::Arc;

use strata_core::alloc::HashSet;
use strata_core::math::{Mat4, Vec3};
use strata_core::profiling::{profile_function, profile_scope};
use strata_scene::{
    CullStyle, Interpolation, PrimId, SubdivScheme, SubdivTags, Value,
};

use crate::backend::{
    BackendResult, GeometryBackend, GeometryHandle, GeometryKind, SceneHandle, UserData,
};
use crate::delegate::SyncContext;
use crate::dirty::DirtyBits;
use crate::instance::InstanceSet;
use crate::primvar::{self, PrimvarMap, PrimvarRanges, PrimvarSource, PulledPrimvar};
use crate::registry::{BufferRange, BufferSource, IndexVariant, ResourceKey};
use crate::repr::{GeomStyle, ReprDesc};
use crate::sampler::SamplerTarget;
use crate::topology::{Adjacency, MeshTopology, TopologyId, Triangulation};

pub use context::PrototypeContext;

/// How the prototype geometry was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryMode {
    /// Fan-triangulated coarse mesh.
    Triangulated,
    /// Subdivision surface tessellated by the backend.
    Tessellated,
}

/// Build state of the prototype geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    #[default]
    Empty,
    Built(GeometryMode),
}

/// Synchronized state of one mesh.
pub struct Mesh {
    id: PrimId,
    topology: Option<Arc<MeshTopology>>,
    topology_id: Option<TopologyId>,
    resource_key: Option<ResourceKey>,
    refine_level: i32,
    flat_shading: bool,
    subdiv_tags: SubdivTags,
    local_transform: Mat4,
    visible: bool,
    cull_style: CullStyle,
    double_sided: bool,

    points: Arc<[Vec3]>,
    primvars: PrimvarMap,
    removed_primvars: Vec<String>,
    ranges: PrimvarRanges,
    triangulation: Option<Arc<Triangulation>>,
    index_range: Option<Arc<BufferRange>>,

    adjacency: Adjacency,
    adjacency_valid: bool,
    normals_valid: bool,
    smooth_normals: Option<Arc<[Vec3]>>,

    state: BuildState,
    prototype_scene: Option<SceneHandle>,
    geometry: Option<GeometryHandle>,
    context: Option<Arc<PrototypeContext>>,
    instances: InstanceSet,
}

impl Mesh {
    pub fn new(id: PrimId) -> Self {
        Self {
            id,
            topology: None,
            topology_id: None,
            resource_key: None,
            refine_level: 0,
            flat_shading: false,
            subdiv_tags: SubdivTags::default(),
            local_transform: Mat4::IDENTITY,
            visible: true,
            cull_style: CullStyle::default(),
            double_sided: false,
            points: Arc::from([]),
            primvars: PrimvarMap::default(),
            removed_primvars: Vec::new(),
            ranges: PrimvarRanges::default(),
            triangulation: None,
            index_range: None,
            adjacency: Adjacency::default(),
            adjacency_valid: false,
            normals_valid: false,
            smooth_normals: None,
            state: BuildState::Empty,
            prototype_scene: None,
            geometry: None,
            context: None,
            instances: InstanceSet::new(),
        }
    }

    /// Every bit the first sync needs.
    pub fn initial_dirty_bits() -> DirtyBits {
        DirtyBits::INITIAL_MESH
    }

    pub fn id(&self) -> &PrimId {
        &self.id
    }

    pub fn topology(&self) -> Option<&Arc<MeshTopology>> {
        self.topology.as_ref()
    }

    pub fn topology_id(&self) -> Option<TopologyId> {
        self.topology_id
    }

    /// Registry key of the derived resources; private after a hash
    /// collision.
    pub fn resource_key(&self) -> Option<ResourceKey> {
        self.resource_key
    }

    pub fn triangulation(&self) -> Option<&Arc<Triangulation>> {
        self.triangulation.as_ref()
    }

    /// Shared triangle index range, in triangulated mode.
    pub fn index_range(&self) -> Option<&Arc<BufferRange>> {
        self.index_range.as_ref()
    }

    pub fn primvar_range(&self, interpolation: Interpolation) -> Option<&Arc<BufferRange>> {
        self.ranges.get(interpolation)
    }

    pub fn primvar(&self, name: &str) -> Option<&PrimvarSource> {
        self.primvars.get(name)
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        self.geometry
    }

    pub fn prototype_scene(&self) -> Option<SceneHandle> {
        self.prototype_scene
    }

    pub fn context(&self) -> Option<&Arc<PrototypeContext>> {
        self.context.as_ref()
    }

    pub fn instances(&self) -> &InstanceSet {
        &self.instances
    }

    pub fn instance_handles(&self) -> Vec<GeometryHandle> {
        self.instances.handles()
    }

    pub fn adjacency_valid(&self) -> bool {
        self.adjacency_valid
    }

    pub fn normals_valid(&self) -> bool {
        self.normals_valid
    }

    pub fn smooth_normals(&self) -> Option<&[Vec3]> {
        self.smooth_normals.as_deref()
    }

    /// Bring the mesh up to date with the scene for the first valid
    /// descriptor in `descs`.
    ///
    /// Returns the bits left dirty. On a backend build failure the scene bits
    /// stay set so the next sync retries.
    pub fn sync<B: GeometryBackend>(
        &mut self,
        ctx: &SyncContext<'_, B>,
        bits: DirtyBits,
        descs: &[ReprDesc],
    ) -> DirtyBits {
        profile_function!();
        let bits = bits - DirtyBits::INIT_REPR;
        let Some(desc) = descs.iter().copied().find(ReprDesc::is_valid) else {
            tracing::debug!(prim = %self.id, "No drawable descriptor");
            return bits;
        };
        let scene = ctx.scene;
        let id = self.id.clone();

        let mut refine_changed = false;
        if bits.contains(DirtyBits::DISPLAY_STYLE) {
            let style = scene.display_style(&id);
            refine_changed = style.refine_level != self.refine_level;
            self.refine_level = style.refine_level;
            self.flat_shading = style.flat_shading;
        }
        let mut tags_changed = false;
        if bits.contains(DirtyBits::SUBDIV_TAGS) && self.refine_level > 0 {
            let tags = scene.subdiv_tags(&id);
            tags_changed = tags != self.subdiv_tags;
            self.subdiv_tags = tags;
        }
        let topology_dirty = bits.is_topology_dirty();
        if topology_dirty || refine_changed || tags_changed || self.topology.is_none() {
            self.update_topology(ctx, topology_dirty);
        }
        if bits.contains(DirtyBits::TRANSFORM) {
            self.local_transform = scene.transform(&id);
        }
        if bits.contains(DirtyBits::VISIBILITY) {
            self.visible = scene.visible(&id);
        }
        if bits.contains(DirtyBits::CULL_STYLE) {
            self.cull_style = scene.cull_style(&id);
        }
        if bits.contains(DirtyBits::DOUBLE_SIDED) {
            self.double_sided = scene.double_sided(&id);
        }
        let points_changed = self.update_primvars(ctx, bits);

        let Some((topology, key)) = self.topology.clone().zip(self.resource_key) else {
            return bits;
        };

        let scheme = topology.scheme();
        let do_refine = desc.geom_style == GeomStyle::Refined
            && scheme != SubdivScheme::None
            && self.refine_level > 0;
        let mode = if do_refine {
            GeometryMode::Tessellated
        } else {
            GeometryMode::Triangulated
        };
        let authored_normals = self.primvars.contains_key("normals");
        let smooth = !desc.flat_shading
            && !self.flat_shading
            && !matches!(scheme, SubdivScheme::None | SubdivScheme::Bilinear)
            && !authored_normals;

        let new_mesh = topology_dirty || self.state != BuildState::Built(mode);
        let mut triangles_changed = false;
        match mode {
            GeometryMode::Triangulated => {
                if new_mesh || self.triangulation.is_none() {
                    let triangulation = ctx.registry.triangulation(key, &topology);
                    self.index_range = Some(ctx.registry.index_range(
                        key,
                        IndexVariant::Triangles,
                        || {
                            vec![BufferSource::TriangleIndices {
                                triangulation: triangulation.clone(),
                            }]
                        },
                    ));
                    self.triangulation = Some(triangulation);
                    triangles_changed = true;
                }
            }
            GeometryMode::Tessellated => {
                self.triangulation = None;
                self.index_range = None;
            }
        }

        let mut guard = ctx.backend.lock();
        let backend: &mut dyn GeometryBackend = &mut *guard;

        if new_mesh {
            if let BuildState::Built(old) = self.state {
                tracing::debug!(prim = %id, ?old, new = ?mode, "Rebuilding prototype geometry");
            }
            if let Err(err) = self.build(backend, ctx.config.max_vertex_attribute_slots, mode, &topology) {
                tracing::error!(prim = %id, %err, "Failed to build prototype geometry");
                self.teardown_prototype(backend);
                return bits;
            }
            self.normals_valid = false;
        }
        let (Some(geometry), Some(proto_scene), Some(context)) =
            (self.geometry, self.prototype_scene, self.context.clone())
        else {
            return bits;
        };

        let mut geometry_changed = new_mesh;
        if triangles_changed
            && !new_mesh
            && let Some(triangulation) = &self.triangulation
        {
            report(&id, "upload triangles", backend.set_triangles(geometry, &triangulation.indices));
            geometry_changed = true;
        }
        if mode == GeometryMode::Tessellated && !new_mesh && tags_changed {
            report(
                &id,
                "update subdivision",
                backend.set_subdivision(geometry, &builder::subdivision_desc(&topology)),
            );
            geometry_changed = true;
        }
        if mode == GeometryMode::Tessellated
            && (new_mesh || bits.contains(DirtyBits::DISPLAY_STYLE))
        {
            let rate = builder::tessellation_rate(topology.refine_level());
            report(&id, "set tessellation rate", backend.set_tessellation_rate(geometry, rate));
            geometry_changed |= refine_changed;
        }
        if mode == GeometryMode::Tessellated && (new_mesh || bits.contains(DirtyBits::SUBDIV_TAGS)) {
            let rule = &topology.subdiv_tags().vertex_interpolation_rule;
            if let Some(boundary) = builder::boundary_mode(rule) {
                report(&id, "set boundary mode", backend.set_boundary_mode(geometry, boundary));
                geometry_changed |= tags_changed;
            }
        }

        let normals_recomputed = smooth && self.update_smooth_normals(ctx, &topology);
        let drop_normals = !smooth && !authored_normals;
        if drop_normals {
            self.smooth_normals = None;
            self.normals_valid = false;
        }

        {
            profile_scope!("samplers");
            let target = match (&self.triangulation, mode) {
                (Some(triangulation), GeometryMode::Triangulated) => {
                    SamplerTarget::Triangulated(triangulation)
                }
                _ => SamplerTarget::Tessellated(geometry),
            };
            let mut samplers = context.samplers.write();
            for name in self.removed_primvars.drain(..) {
                samplers.remove(&name, backend);
            }
            if normals_recomputed && let Some(normals) = &self.smooth_normals {
                samplers.add(
                    "normals",
                    Interpolation::Vertex,
                    &Value::Vec3(normals.clone()),
                    target,
                    backend,
                );
            }
            for (name, source) in self.primvars.iter() {
                if new_mesh || bits.is_primvar_dirty(name) {
                    samplers.add(name, source.interpolation, &source.value, target, backend);
                }
            }
            if drop_normals {
                samplers.remove("normals", backend);
            }
        }

        if new_mesh || points_changed {
            report(&id, "upload points", backend.set_vertices(geometry, &self.points));
            geometry_changed = true;
        }
        let mut scene_changed = geometry_changed;
        if new_mesh || bits.contains(DirtyBits::VISIBILITY) {
            report(&id, "set visibility", backend.set_enabled(geometry, self.visible));
            scene_changed = true;
        }
        if new_mesh || bits.intersects(DirtyBits::CULL_STYLE | DirtyBits::DOUBLE_SIDED) {
            context.set_cull(self.cull_style, self.double_sided);
        }
        if geometry_changed {
            report(&id, "commit geometry", backend.commit_geometry(geometry));
        }
        if scene_changed {
            report(&id, "commit prototype", backend.commit_scene(proto_scene));
        }

        if new_mesh
            || scene_changed
            || bits.contains(DirtyBits::TRANSFORM)
            || bits.is_instancing_dirty()
        {
            let transforms = match scene.instancer_id(&id) {
                Some(instancer) => scene.instancer_transforms(&instancer, &id),
                None => vec![Mat4::IDENTITY],
            };
            report(
                &id,
                "reconcile instances",
                self.instances.reconcile(
                    backend,
                    ctx.root,
                    proto_scene,
                    &id,
                    &transforms,
                    self.local_transform,
                    scene_changed,
                ),
            );
        }

        bits - DirtyBits::ALL_SCENE_DIRTY_BITS
    }

    fn update_topology<B: GeometryBackend>(&mut self, ctx: &SyncContext<'_, B>, pull: bool) {
        let desc = match (&self.topology, pull) {
            (Some(current), false) => current.desc().clone(),
            _ => ctx.scene.mesh_topology(&self.id),
        };
        let candidate =
            MeshTopology::new(desc, self.refine_level).with_subdiv_tags(self.subdiv_tags.clone());
        let topology_id = candidate.compute_hash();
        let shared = ctx.registry.share_mesh_topology(topology_id, candidate);
        if pull {
            self.adjacency_valid = false;
            self.normals_valid = false;
        }
        if self.resource_key != Some(shared.key) {
            // Derived resources belong to the old key.
            self.triangulation = None;
        }
        tracing::trace!(prim = %self.id, %topology_id, key = ?shared.key, "Updated topology");
        self.topology = Some(shared.topology);
        self.topology_id = Some(topology_id);
        self.resource_key = Some(shared.key);
    }

    /// Pull dirty primvars and queue them for upload. Returns whether the
    /// points changed.
    fn update_primvars<B: GeometryBackend>(&mut self, ctx: &SyncContext<'_, B>, bits: DirtyBits) -> bool {
        if !bits.is_any_primvar_dirty() {
            return false;
        }
        profile_function!();
        let scene = ctx.scene;
        let computed = scene.computed_primvars(&self.id);
        let computed_points = computed
            .iter()
            .any(|pv| pv.name == "points" && bits.is_primvar_dirty(&pv.name));
        let mut described: HashSet<String> =
            primvar::described_names(scene, &self.id, &Interpolation::ALL);
        described.extend(computed.iter().map(|pv| pv.name.clone()));

        let authored = primvar::pull_dirty(scene, &self.id, bits, &Interpolation::ALL)
            .into_iter()
            .filter(|pv| !(computed_points && pv.name == "points"));
        let dirty_computed = computed
            .into_iter()
            .filter(|pv| bits.is_primvar_dirty(&pv.name))
            .map(|pv| PulledPrimvar {
                name: pv.name,
                interpolation: pv.interpolation,
                value: pv.value,
            });

        let mut points_changed = false;
        let mut sources = Vec::new();
        for pv in authored.chain(dirty_computed) {
            if pv.name == "points" {
                if let Some(topology) = &self.topology {
                    primvar::check_point_count(&self.id, &pv.value, topology.num_points());
                }
                match pv.value.as_vec3() {
                    Some(points) => self.points = points.clone(),
                    None => {
                        tracing::warn!(prim = %self.id, "Points are not 3-vectors, ignoring");
                        continue;
                    }
                }
                points_changed = true;
                self.normals_valid = false;
                sources.push((Interpolation::Vertex, BufferSource::raw("points", pv.value)));
                continue;
            }
            sources.push((pv.interpolation, BufferSource::raw(pv.name.clone(), pv.value.clone())));
            self.primvars.insert(
                pv.name,
                PrimvarSource {
                    interpolation: pv.interpolation,
                    value: pv.value,
                },
            );
        }

        let stale: Vec<String> = self
            .primvars
            .keys()
            .filter(|name| !described.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            tracing::debug!(prim = %self.id, primvar = %name, "Primvar no longer authored");
            self.primvars.remove(&name);
            self.removed_primvars.push(name);
        }

        self.ranges.enqueue(ctx.registry, sources);
        points_changed
    }

    /// Rebuild adjacency and normals as their validity flags demand. Returns
    /// whether the normals were recomputed.
    fn update_smooth_normals<B: GeometryBackend>(
        &mut self,
        ctx: &SyncContext<'_, B>,
        topology: &MeshTopology,
    ) -> bool {
        if !self.adjacency_valid {
            self.adjacency = Adjacency::build(topology);
            self.adjacency_valid = true;
            self.normals_valid = false;
        }
        if self.normals_valid {
            return false;
        }
        let normals: Arc<[Vec3]> = self
            .adjacency
            .compute_smooth_normals(topology, &self.points)
            .into();
        self.ranges.enqueue(
            ctx.registry,
            vec![(
                Interpolation::Vertex,
                BufferSource::raw("normals", Value::Vec3(normals.clone())),
            )],
        );
        self.smooth_normals = Some(normals);
        self.normals_valid = true;
        true
    }

    /// Replace the prototype geometry. Construction order is scene, geometry,
    /// context, filter.
    fn build(
        &mut self,
        backend: &mut dyn GeometryBackend,
        max_slots: u16,
        mode: GeometryMode,
        topology: &MeshTopology,
    ) -> BackendResult<()> {
        profile_function!();
        self.teardown_prototype(backend);

        let scene = match self.prototype_scene {
            Some(scene) => scene,
            None => {
                let scene = backend.create_scene()?;
                self.prototype_scene = Some(scene);
                scene
            }
        };
        let kind = match mode {
            GeometryMode::Triangulated => GeometryKind::Triangles,
            GeometryMode::Tessellated => GeometryKind::Subdivision,
        };
        let geometry = backend.create_geometry(kind)?;
        let context = Arc::new(PrototypeContext::new(
            self.id.clone(),
            max_slots.min(backend.max_vertex_attribute_slots()),
            self.cull_style,
            self.double_sided,
        ));
        let populated = match (mode, &self.triangulation) {
            (GeometryMode::Triangulated, Some(triangulation)) => {
                backend.set_triangles(geometry, &triangulation.indices)
            }
            (GeometryMode::Triangulated, None) => backend.set_triangles(geometry, &[]),
            (GeometryMode::Tessellated, _) => {
                backend.set_subdivision(geometry, &builder::subdivision_desc(topology))
            }
        }
        .and_then(|_| backend.attach(scene, geometry))
        .and_then(|_| backend.set_user_data(geometry, Some(context.clone() as UserData)))
        .and_then(|_| backend.set_hit_filter(geometry, Some(context.hit_filter())));
        if let Err(err) = populated {
            report(&self.id, "release unfinished geometry", backend.release_geometry(geometry));
            return Err(err);
        }

        self.geometry = Some(geometry);
        self.context = Some(context);
        self.state = BuildState::Built(mode);
        tracing::debug!(prim = %self.id, ?mode, %geometry, "Built prototype geometry");
        Ok(())
    }

    /// Release the prototype geometry: context first, then the geometry.
    /// Keeps the prototype scene.
    fn teardown_prototype(&mut self, backend: &mut dyn GeometryBackend) {
        if let Some(geometry) = self.geometry.take() {
            if let Some(context) = self.context.take() {
                context.samplers.write().clear(backend);
            }
            let mut result = backend
                .set_user_data(geometry, None)
                .and_then(|_| backend.set_hit_filter(geometry, None));
            if let Some(scene) = self.prototype_scene {
                result = result.and_then(|_| backend.detach(scene, geometry));
            }
            report(
                &self.id,
                "release prototype geometry",
                result.and_then(|_| backend.release_geometry(geometry)),
            );
        }
        self.context = None;
        self.state = BuildState::Empty;
    }

    /// Release every backend object this mesh owns. Safe to call repeatedly
    /// and on a mesh that was never built.
    pub fn finalize(&mut self, backend: &mut dyn GeometryBackend, root: SceneHandle) {
        profile_function!();
        self.instances.clear(backend, root);
        self.teardown_prototype(backend);
        if let Some(scene) = self.prototype_scene.take() {
            report(&self.id, "release prototype scene", backend.release_scene(scene));
        }
        self.triangulation = None;
        self.index_range = None;
        self.adjacency_valid = false;
        self.normals_valid = false;
    }
}

/// Log a failed backend call as a coding error and carry on.
fn report<T>(id: &PrimId, what: &str, result: BackendResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(prim = %id, %err, "Backend call failed: {}", what);
            None
        }
    }
}
