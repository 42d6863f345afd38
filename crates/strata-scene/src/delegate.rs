//! The contract through which the engine pulls scene data.

use strata_core::math::Mat4;

use crate::{
    CullStyle, CurveTopologyDesc, DisplayStyle, Interpolation, MeshTopologyDesc, PrimId,
    SubdivTags, Value,
};

/// Name and domain of one authored primvar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimvarDescriptor {
    pub name: String,
    pub interpolation: Interpolation,
}

impl PrimvarDescriptor {
    pub fn new(name: impl Into<String>, interpolation: Interpolation) -> Self {
        Self {
            name: name.into(),
            interpolation,
        }
    }
}

/// A primvar evaluated by some upstream computation (skinning, deformers).
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedPrimvar {
    pub name: String,
    pub interpolation: Interpolation,
    pub value: Value,
}

/// Scene collaborator queried during synchronization.
///
/// All values are sampled at the delegate's current time. Implementations
/// must be shareable across sync worker threads.
pub trait SceneDelegate: Send + Sync {
    /// Primvars authored on `id` in the given domain.
    fn primvar_descriptors(&self, id: &PrimId, interpolation: Interpolation)
    -> Vec<PrimvarDescriptor>;

    /// Value of attribute `name`, or [`Value::Empty`] if none is authored.
    fn get(&self, id: &PrimId, name: &str) -> Value;

    fn mesh_topology(&self, id: &PrimId) -> MeshTopologyDesc;

    fn curve_topology(&self, id: &PrimId) -> CurveTopologyDesc;

    fn subdiv_tags(&self, id: &PrimId) -> SubdivTags;

    /// Local-to-world transform of the primitive.
    fn transform(&self, id: &PrimId) -> Mat4;

    fn visible(&self, id: &PrimId) -> bool;

    fn display_style(&self, id: &PrimId) -> DisplayStyle;

    fn cull_style(&self, id: &PrimId) -> CullStyle;

    fn double_sided(&self, id: &PrimId) -> bool;

    /// Instancer driving `id`, if the primitive is instanced.
    fn instancer_id(&self, id: &PrimId) -> Option<PrimId>;

    /// Per-instance transforms the instancer computes for `prototype`.
    fn instancer_transforms(&self, instancer: &PrimId, prototype: &PrimId) -> Vec<Mat4>;

    /// Already-evaluated computed primvars for `id`.
    fn computed_primvars(&self, _id: &PrimId) -> Vec<ComputedPrimvar> {
        Vec::new()
    }
}
