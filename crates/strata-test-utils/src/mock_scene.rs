//! Mock implementation of SceneDelegate for testing.
//!
//! The delegate serves prims from memory and records every query so tests
//! can verify what a sync pass actually pulled.

use parking_lot::{Mutex, RwLock};
use strata_core::alloc::HashMap;
use strata_core::math::{Mat4, Vec3};
use strata_scene::{
    ComputedPrimvar, CullStyle, CurveTopologyDesc, DisplayStyle, Interpolation, MeshTopologyDesc,
    PrimId, PrimvarDescriptor, SceneDelegate, SubdivTags, Value,
};

use crate::fixtures::MockPrim;

/// Records a scene query for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateCall {
    PrimvarDescriptors {
        id: PrimId,
        interpolation: Interpolation,
    },
    Get {
        id: PrimId,
        name: String,
    },
    MeshTopology {
        id: PrimId,
    },
    CurveTopology {
        id: PrimId,
    },
    SubdivTags {
        id: PrimId,
    },
    Transform {
        id: PrimId,
    },
    Visible {
        id: PrimId,
    },
    DisplayStyle {
        id: PrimId,
    },
    CullStyle {
        id: PrimId,
    },
    DoubleSided {
        id: PrimId,
    },
    InstancerId {
        id: PrimId,
    },
    InstancerTransforms {
        instancer: PrimId,
        prototype: PrimId,
    },
    ComputedPrimvars {
        id: PrimId,
    },
}

/// In-memory scene delegate.
///
/// # Example
///
/// ```rust
/// use strata_core::math::Vec3;
/// use strata_scene::{PrimId, SceneDelegate};
/// use strata_test_utils::{fixtures, MockSceneDelegate};
///
/// let scene = MockSceneDelegate::new();
/// let id = PrimId::new("/quad");
/// scene.add_prim(id.clone(), fixtures::quad());
/// scene.set_points(&id, vec![Vec3::ONE; 4]);
///
/// assert_eq!(scene.get(&id, "points").len(), 4);
/// assert_eq!(scene.count_gets("points"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockSceneDelegate {
    prims: RwLock<HashMap<PrimId, MockPrim>>,
    instancers: RwLock<HashMap<PrimId, Vec<Mat4>>>,
    calls: Mutex<Vec<DelegateCall>>,
}

impl MockSceneDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_prim(&self, id: PrimId, prim: MockPrim) {
        self.prims.write().insert(id, prim);
    }

    pub fn remove_prim(&self, id: &PrimId) -> Option<MockPrim> {
        self.prims.write().remove(id)
    }

    /// Snapshot of a prim's authored state.
    pub fn prim(&self, id: &PrimId) -> Option<MockPrim> {
        self.prims.read().get(id).cloned()
    }

    /// Apply an arbitrary edit. Unknown ids are ignored.
    pub fn edit(&self, id: &PrimId, f: impl FnOnce(&mut MockPrim)) {
        if let Some(prim) = self.prims.write().get_mut(id) {
            f(prim);
        }
    }

    pub fn set_points(&self, id: &PrimId, points: Vec<Vec3>) {
        self.set_primvar(id, "points", Interpolation::Vertex, Value::from(points));
    }

    pub fn set_primvar(&self, id: &PrimId, name: &str, interpolation: Interpolation, value: Value) {
        self.edit(id, |prim| prim.set_primvar(name, interpolation, value));
    }

    pub fn remove_primvar(&self, id: &PrimId, name: &str) {
        self.edit(id, |prim| {
            prim.remove_primvar(name);
        });
    }

    pub fn set_mesh_topology(&self, id: &PrimId, topology: MeshTopologyDesc) {
        self.edit(id, |prim| prim.mesh_topology = topology);
    }

    pub fn set_curve_topology(&self, id: &PrimId, topology: CurveTopologyDesc) {
        self.edit(id, |prim| prim.curve_topology = topology);
    }

    pub fn set_subdiv_tags(&self, id: &PrimId, tags: SubdivTags) {
        self.edit(id, |prim| prim.subdiv_tags = tags);
    }

    pub fn set_display_style(&self, id: &PrimId, style: DisplayStyle) {
        self.edit(id, |prim| prim.display_style = style);
    }

    pub fn set_refine_level(&self, id: &PrimId, refine_level: i32) {
        self.edit(id, |prim| prim.display_style.refine_level = refine_level);
    }

    pub fn set_transform(&self, id: &PrimId, transform: Mat4) {
        self.edit(id, |prim| prim.transform = transform);
    }

    pub fn set_visible(&self, id: &PrimId, visible: bool) {
        self.edit(id, |prim| prim.visible = visible);
    }

    pub fn set_cull_style(&self, id: &PrimId, cull_style: CullStyle) {
        self.edit(id, |prim| prim.cull_style = cull_style);
    }

    pub fn set_double_sided(&self, id: &PrimId, double_sided: bool) {
        self.edit(id, |prim| prim.double_sided = double_sided);
    }

    pub fn set_computed_primvars(&self, id: &PrimId, computed: Vec<ComputedPrimvar>) {
        self.edit(id, |prim| prim.computed = computed);
    }

    pub fn set_instancer(&self, id: &PrimId, instancer: Option<PrimId>) {
        self.edit(id, |prim| prim.instancer = instancer);
    }

    /// Per-instance transforms for every prototype of `instancer`.
    pub fn set_instancer_transforms(&self, instancer: &PrimId, transforms: Vec<Mat4>) {
        self.instancers.write().insert(instancer.clone(), transforms);
    }

    fn record(&self, call: DelegateCall) {
        self.calls.lock().push(call);
    }

    fn read<T>(&self, id: &PrimId, f: impl FnOnce(&MockPrim) -> T) -> Option<T> {
        self.prims.read().get(id).map(f)
    }

    /// Returns a copy of all recorded calls.
    pub fn calls(&self) -> Vec<DelegateCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of value pulls for attribute `name`, on any prim.
    pub fn count_gets(&self, name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DelegateCall::Get { name: n, .. } if n == name))
            .count()
    }

    /// Number of mesh and curve topology pulls.
    pub fn count_topology_pulls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    DelegateCall::MeshTopology { .. } | DelegateCall::CurveTopology { .. }
                )
            })
            .count()
    }

    /// Number of calls of any kind concerning `id`.
    pub fn count_calls_for(&self, id: &PrimId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| match call {
                DelegateCall::PrimvarDescriptors { id: c, .. }
                | DelegateCall::Get { id: c, .. }
                | DelegateCall::MeshTopology { id: c }
                | DelegateCall::CurveTopology { id: c }
                | DelegateCall::SubdivTags { id: c }
                | DelegateCall::Transform { id: c }
                | DelegateCall::Visible { id: c }
                | DelegateCall::DisplayStyle { id: c }
                | DelegateCall::CullStyle { id: c }
                | DelegateCall::DoubleSided { id: c }
                | DelegateCall::InstancerId { id: c }
                | DelegateCall::ComputedPrimvars { id: c } => c == id,
                DelegateCall::InstancerTransforms { prototype, .. } => prototype == id,
            })
            .count()
    }
}

impl SceneDelegate for MockSceneDelegate {
    fn primvar_descriptors(
        &self,
        id: &PrimId,
        interpolation: Interpolation,
    ) -> Vec<PrimvarDescriptor> {
        self.record(DelegateCall::PrimvarDescriptors {
            id: id.clone(),
            interpolation,
        });
        self.read(id, |prim| {
            prim.primvars
                .iter()
                .filter(|(_, interp, _)| *interp == interpolation)
                .map(|(name, interp, _)| PrimvarDescriptor::new(name.clone(), *interp))
                .collect()
        })
        .unwrap_or_default()
    }

    fn get(&self, id: &PrimId, name: &str) -> Value {
        self.record(DelegateCall::Get {
            id: id.clone(),
            name: name.to_string(),
        });
        self.read(id, |prim| prim.primvar(name).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn mesh_topology(&self, id: &PrimId) -> MeshTopologyDesc {
        self.record(DelegateCall::MeshTopology { id: id.clone() });
        self.read(id, |prim| prim.mesh_topology.clone())
            .unwrap_or_default()
    }

    fn curve_topology(&self, id: &PrimId) -> CurveTopologyDesc {
        self.record(DelegateCall::CurveTopology { id: id.clone() });
        self.read(id, |prim| prim.curve_topology.clone())
            .unwrap_or_default()
    }

    fn subdiv_tags(&self, id: &PrimId) -> SubdivTags {
        self.record(DelegateCall::SubdivTags { id: id.clone() });
        self.read(id, |prim| prim.subdiv_tags.clone())
            .unwrap_or_default()
    }

    fn transform(&self, id: &PrimId) -> Mat4 {
        self.record(DelegateCall::Transform { id: id.clone() });
        self.read(id, |prim| prim.transform).unwrap_or(Mat4::IDENTITY)
    }

    fn visible(&self, id: &PrimId) -> bool {
        self.record(DelegateCall::Visible { id: id.clone() });
        self.read(id, |prim| prim.visible).unwrap_or(false)
    }

    fn display_style(&self, id: &PrimId) -> DisplayStyle {
        self.record(DelegateCall::DisplayStyle { id: id.clone() });
        self.read(id, |prim| prim.display_style).unwrap_or_default()
    }

    fn cull_style(&self, id: &PrimId) -> CullStyle {
        self.record(DelegateCall::CullStyle { id: id.clone() });
        self.read(id, |prim| prim.cull_style).unwrap_or_default()
    }

    fn double_sided(&self, id: &PrimId) -> bool {
        self.record(DelegateCall::DoubleSided { id: id.clone() });
        self.read(id, |prim| prim.double_sided).unwrap_or(false)
    }

    fn instancer_id(&self, id: &PrimId) -> Option<PrimId> {
        self.record(DelegateCall::InstancerId { id: id.clone() });
        self.read(id, |prim| prim.instancer.clone()).flatten()
    }

    fn instancer_transforms(&self, instancer: &PrimId, prototype: &PrimId) -> Vec<Mat4> {
        self.record(DelegateCall::InstancerTransforms {
            instancer: instancer.clone(),
            prototype: prototype.clone(),
        });
        self.instancers
            .read()
            .get(instancer)
            .cloned()
            .unwrap_or_default()
    }

    fn computed_primvars(&self, id: &PrimId) -> Vec<ComputedPrimvar> {
        self.record(DelegateCall::ComputedPrimvars { id: id.clone() });
        self.read(id, |prim| prim.computed.clone())
            .unwrap_or_default()
    }
}
