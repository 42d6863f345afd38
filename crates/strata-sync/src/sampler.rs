//! Primvar samplers.
//!
//! A sampler answers "value of primvar X at `(element, u, v)`" for a hit on
//! the prim's backend geometry. Which variant is used depends on the
//! primvar's interpolation and on whether the geometry was triangulated or
//! tessellated.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_core::alloc::HashMap;
use strata_core::math::{Vec2, Vec3, Vec4};
use strata_core::profiling::profile_function;
use strata_scene::{Interpolation, Value, ValueType};

use crate::backend::{GeometryBackend, GeometryHandle};
use crate::topology::Triangulation;

/// One sampled primvar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl SampleValue {
    fn from_components(value_type: ValueType, c: [f32; 4]) -> Option<Self> {
        Some(match value_type {
            ValueType::Float => SampleValue::Float(c[0]),
            ValueType::Vec2 => SampleValue::Vec2(Vec2::new(c[0], c[1])),
            ValueType::Vec3 => SampleValue::Vec3(Vec3::new(c[0], c[1], c[2])),
            ValueType::Vec4 => SampleValue::Vec4(Vec4::from_array(c)),
            ValueType::Int => return None,
        })
    }

    /// Element `index` of `value`, unblended.
    fn element(value: &Value, index: usize) -> Option<Self> {
        match value {
            Value::Int(v) => v.get(index).map(|x| SampleValue::Int(*x)),
            _ => Self::from_components(value.value_type()?, value.float_components(index)?),
        }
    }

    /// `(1-u-v)*a + u*b + v*c` over the three elements of `value`.
    fn barycentric(value: &Value, corners: [usize; 3], u: f32, v: f32) -> Option<Self> {
        let weights = [1.0 - u - v, u, v];
        let mut out = [0.0f32; 4];
        for (corner, weight) in corners.into_iter().zip(weights) {
            let c = value.float_components(corner)?;
            for (o, x) in out.iter_mut().zip(c) {
                *o += weight * x;
            }
        }
        Self::from_components(value.value_type()?, out)
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            SampleValue::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            SampleValue::Vec3(x) => Some(*x),
            _ => None,
        }
    }
}

/// Evaluator for one primvar.
#[derive(Debug, Clone)]
pub enum PrimvarSampler {
    /// Same value everywhere.
    Constant { value: Value },
    /// One value per authored face. Triangle hits are mapped back to their
    /// source face when a triangulation is present.
    Uniform {
        value: Value,
        triangulation: Option<Arc<Triangulation>>,
    },
    /// Barycentric blend of the triangle's three point values.
    TriangleVertex {
        value: Value,
        triangulation: Arc<Triangulation>,
    },
    /// Barycentric blend of per-corner values, already triangulated so
    /// triangle `t` owns entries `3t..3t+3`.
    FaceVarying { value: Value },
    /// Interpolated by the backend from a bound vertex-attribute slot.
    /// Without a slot the sampler is inert.
    SubdivVertex {
        geometry: GeometryHandle,
        slot: Option<u32>,
        value_type: ValueType,
    },
}

impl PrimvarSampler {
    pub fn sample(
        &self,
        element: u32,
        u: f32,
        v: f32,
        backend: &dyn GeometryBackend,
    ) -> Option<SampleValue> {
        match self {
            PrimvarSampler::Constant { value } => SampleValue::element(value, 0),
            PrimvarSampler::Uniform {
                value,
                triangulation,
            } => {
                let face = match triangulation {
                    Some(triangulation) => triangulation.source_face(element)?,
                    None => element,
                };
                SampleValue::element(value, face as usize)
            }
            PrimvarSampler::TriangleVertex {
                value,
                triangulation,
            } => {
                let tri = triangulation.indices.get(element as usize)?;
                SampleValue::barycentric(value, tri.map(|i| i as usize), u, v)
            }
            PrimvarSampler::FaceVarying { value } => {
                let base = element as usize * 3;
                SampleValue::barycentric(value, [base, base + 1, base + 2], u, v)
            }
            PrimvarSampler::SubdivVertex {
                geometry,
                slot,
                value_type,
            } => {
                let slot = (*slot)?;
                let mut out = [0.0f32; 4];
                let n = value_type.components();
                backend
                    .interpolate(*geometry, slot, element, u, v, &mut out[..n])
                    .ok()?;
                SampleValue::from_components(*value_type, out)
            }
        }
    }

    /// Whether sampling can ever succeed.
    pub fn is_inert(&self) -> bool {
        matches!(self, PrimvarSampler::SubdivVertex { slot: None, .. })
    }
}

/// Hands out vertex-attribute slot ids, lowest free first.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    next: u32,
    max: u32,
    available: BTreeSet<u32>,
}

impl SlotAllocator {
    pub fn new(max: u16) -> Self {
        Self {
            next: 0,
            max: max as u32,
            available: BTreeSet::new(),
        }
    }

    /// `None` once every slot is taken.
    pub fn allocate(&mut self) -> Option<u32> {
        if let Some(slot) = self.available.pop_first() {
            return Some(slot);
        }
        if self.next >= self.max {
            return None;
        }
        self.next += 1;
        Some(self.next - 1)
    }

    pub fn free(&mut self, slot: u32) {
        if slot >= self.next || self.available.contains(&slot) {
            tracing::warn!(slot, "Freeing a vertex attribute slot that is not allocated");
            return;
        }
        if slot + 1 == self.next {
            self.next = slot;
            while self.next > 0 && self.available.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.available.insert(slot);
        }
    }

    pub fn slots_in_use(&self) -> usize {
        self.next as usize - self.available.len()
    }

    pub fn capacity(&self) -> usize {
        self.max as usize
    }
}

/// How the backend geometry that samplers bind to was built.
#[derive(Debug, Clone, Copy)]
pub enum SamplerTarget<'a> {
    Triangulated(&'a Arc<Triangulation>),
    Tessellated(GeometryHandle),
}

/// Samplers of one prim, keyed by primvar name.
#[derive(Debug)]
pub struct SamplerSet {
    samplers: HashMap<String, PrimvarSampler>,
    slots: SlotAllocator,
}

impl SamplerSet {
    pub fn new(max_slots: u16) -> Self {
        Self {
            samplers: HashMap::new(),
            slots: SlotAllocator::new(max_slots),
        }
    }

    /// Create and store a sampler for `name`, replacing any existing one.
    ///
    /// Returns `false` when no sampler could be made; the failure is logged
    /// and the rest of the set is untouched.
    pub fn add(
        &mut self,
        name: &str,
        interpolation: Interpolation,
        value: &Value,
        target: SamplerTarget<'_>,
        backend: &mut dyn GeometryBackend,
    ) -> bool {
        profile_function!();
        self.remove(name, backend);
        match self.create(name, interpolation, value, target, backend) {
            Some(sampler) => {
                self.samplers.insert(name.to_string(), sampler);
                true
            }
            None => false,
        }
    }

    fn create(
        &mut self,
        name: &str,
        interpolation: Interpolation,
        value: &Value,
        target: SamplerTarget<'_>,
        backend: &mut dyn GeometryBackend,
    ) -> Option<PrimvarSampler> {
        let value_type = value.value_type()?;
        let sampler = match (interpolation, target) {
            (Interpolation::Constant, _) => PrimvarSampler::Constant {
                value: value.clone(),
            },
            (Interpolation::Uniform, SamplerTarget::Triangulated(triangulation)) => {
                PrimvarSampler::Uniform {
                    value: value.clone(),
                    triangulation: Some(triangulation.clone()),
                }
            }
            (Interpolation::Uniform, SamplerTarget::Tessellated(_)) => PrimvarSampler::Uniform {
                value: value.clone(),
                triangulation: None,
            },
            (
                Interpolation::Vertex | Interpolation::Varying,
                SamplerTarget::Triangulated(triangulation),
            ) => PrimvarSampler::TriangleVertex {
                value: value.clone(),
                triangulation: triangulation.clone(),
            },
            (
                Interpolation::Vertex | Interpolation::Varying,
                SamplerTarget::Tessellated(geometry),
            ) => {
                if !value_type.is_float() {
                    tracing::warn!(
                        primvar = name,
                        %value_type,
                        "Only float primvars can be interpolated on subdivision surfaces"
                    );
                    return None;
                }
                let slot = self.slots.allocate();
                match slot {
                    Some(slot) => {
                        let data = flatten_floats(value);
                        if let Err(err) = backend.set_vertex_attribute(
                            geometry,
                            slot,
                            value_type.components(),
                            &data,
                        ) {
                            tracing::error!(primvar = name, %err, "Failed to bind vertex attribute");
                            self.slots.free(slot);
                            return None;
                        }
                    }
                    None => {
                        tracing::error!(
                            primvar = name,
                            capacity = self.slots.capacity(),
                            "Out of vertex attribute slots, sampler disabled"
                        );
                    }
                }
                PrimvarSampler::SubdivVertex {
                    geometry,
                    slot,
                    value_type,
                }
            }
            (Interpolation::FaceVarying, SamplerTarget::Triangulated(triangulation)) => {
                PrimvarSampler::FaceVarying {
                    value: triangulation.triangulate_face_varying(value),
                }
            }
            (Interpolation::FaceVarying, SamplerTarget::Tessellated(_)) => {
                tracing::warn!(
                    primvar = name,
                    "Face-varying primvars are not supported on subdivision surfaces"
                );
                return None;
            }
        };
        Some(sampler)
    }

    /// Drop the sampler for `name`, freeing its slot.
    pub fn remove(&mut self, name: &str, backend: &mut dyn GeometryBackend) -> bool {
        match self.samplers.remove(name) {
            Some(sampler) => {
                self.release(sampler, backend);
                true
            }
            None => false,
        }
    }

    /// Drop every sampler.
    pub fn clear(&mut self, backend: &mut dyn GeometryBackend) {
        let samplers: Vec<PrimvarSampler> = self.samplers.drain().map(|(_, s)| s).collect();
        for sampler in samplers {
            self.release(sampler, backend);
        }
    }

    fn release(&mut self, sampler: PrimvarSampler, backend: &mut dyn GeometryBackend) {
        if let PrimvarSampler::SubdivVertex {
            geometry,
            slot: Some(slot),
            ..
        } = sampler
        {
            self.slots.free(slot);
            if let Err(err) = backend.clear_vertex_attribute(geometry, slot) {
                tracing::debug!(slot, %err, "Vertex attribute already gone");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&PrimvarSampler> {
        self.samplers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.samplers.contains_key(name)
    }

    pub fn sample(
        &self,
        name: &str,
        element: u32,
        u: f32,
        v: f32,
        backend: &dyn GeometryBackend,
    ) -> Option<SampleValue> {
        self.samplers.get(name)?.sample(element, u, v, backend)
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn slots_in_use(&self) -> usize {
        self.slots.slots_in_use()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.samplers.keys().cloned().collect();
        names.sort();
        names
    }
}

fn flatten_floats(value: &Value) -> Vec<f32> {
    match value {
        Value::Float(v) => v.to_vec(),
        Value::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
        Value::Vec3(v) => bytemuck::cast_slice(v).to_vec(),
        Value::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
        Value::Int(_) | Value::Empty => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ArenaBackend, GeometryKind, SubdivisionDesc};
    use crate::topology::MeshTopology;
    use strata_scene::MeshTopologyDesc;

    fn quad_triangulation() -> Arc<Triangulation> {
        Arc::new(MeshTopology::new(MeshTopologyDesc::new(vec![4], vec![0, 1, 2, 3]), 0).triangulate())
    }

    #[test]
    fn test_slot_allocator_exhaustion() {
        let mut slots = SlotAllocator::new(2);
        assert_eq!(slots.allocate(), Some(0));
        assert_eq!(slots.allocate(), Some(1));
        assert_eq!(slots.allocate(), None);
        assert_eq!(slots.slots_in_use(), 2);
    }

    #[test]
    fn test_slot_allocator_reuses_lowest() {
        let mut slots = SlotAllocator::new(4);
        for _ in 0..4 {
            slots.allocate();
        }
        slots.free(2);
        slots.free(0);
        assert_eq!(slots.allocate(), Some(0));
        assert_eq!(slots.allocate(), Some(2));
    }

    #[test]
    fn test_slot_allocator_shrinks_and_resets() {
        let mut slots = SlotAllocator::new(4);
        for _ in 0..3 {
            slots.allocate();
        }
        slots.free(1);
        slots.free(2);
        // Freeing the top slot also trims the free slot below it.
        assert_eq!(slots.slots_in_use(), 1);
        assert_eq!(slots.allocate(), Some(1));
        slots.free(1);
        slots.free(0);
        assert_eq!(slots.slots_in_use(), 0);
        assert_eq!(slots.allocate(), Some(0));
    }

    #[test]
    fn test_slot_allocator_double_free_ignored() {
        let mut slots = SlotAllocator::new(4);
        slots.allocate();
        slots.allocate();
        slots.free(0);
        slots.free(0);
        assert_eq!(slots.slots_in_use(), 1);
    }

    #[test]
    fn test_barycentric_vertex_sample() {
        let backend = ArenaBackend::new(1);
        let sampler = PrimvarSampler::TriangleVertex {
            value: Value::from(vec![1.0f32, 2.0, 4.0]),
            triangulation: Arc::new(
                MeshTopology::new(MeshTopologyDesc::new(vec![3], vec![0, 1, 2]), 0).triangulate(),
            ),
        };
        let sample = sampler.sample(0, 0.25, 0.25, &backend).unwrap();
        // 0.5 * 1 + 0.25 * 2 + 0.25 * 4
        assert_eq!(sample, SampleValue::Float(2.0));
    }

    #[test]
    fn test_uniform_maps_through_triangulation() {
        let backend = ArenaBackend::new(1);
        let sampler = PrimvarSampler::Uniform {
            value: Value::from(vec![7i32]),
            triangulation: Some(quad_triangulation()),
        };
        assert_eq!(sampler.sample(1, 0.0, 0.0, &backend), Some(SampleValue::Int(7)));
        assert_eq!(sampler.sample(2, 0.0, 0.0, &backend), None);
    }

    #[test]
    fn test_face_varying_on_tessellated_fails_cleanly() {
        let mut backend = ArenaBackend::new(2);
        let geometry = backend.create_geometry(GeometryKind::Subdivision).unwrap();
        let mut set = SamplerSet::new(2);
        let uv = Value::from(vec![Vec2::ZERO; 4]);
        assert!(!set.add(
            "st",
            Interpolation::FaceVarying,
            &uv,
            SamplerTarget::Tessellated(geometry),
            &mut backend,
        ));
        assert!(set.add(
            "displayOpacity",
            Interpolation::Constant,
            &Value::from(vec![0.5f32]),
            SamplerTarget::Tessellated(geometry),
            &mut backend,
        ));
        assert_eq!(set.sample("st", 0, 0.0, 0.0, &backend), None);
        assert_eq!(
            set.sample("displayOpacity", 0, 0.0, 0.0, &backend),
            Some(SampleValue::Float(0.5))
        );
    }

    #[test]
    fn test_tessellated_vertex_slots() {
        let mut backend = ArenaBackend::new(1);
        let geometry = backend.create_geometry(GeometryKind::Subdivision).unwrap();
        backend
            .set_subdivision(
                geometry,
                &SubdivisionDesc {
                    face_vertex_counts: vec![4],
                    face_vertex_indices: vec![0, 1, 2, 3],
                    ..Default::default()
                },
            )
            .unwrap();
        let mut set = SamplerSet::new(1);
        let target = SamplerTarget::Tessellated(geometry);

        let color = Value::from(vec![0.0f32, 1.0, 1.0, 0.0]);
        assert!(set.add("a", Interpolation::Vertex, &color, target, &mut backend));
        assert!(set.add("b", Interpolation::Vertex, &color, target, &mut backend));
        assert!(!set.get("a").unwrap().is_inert());
        assert!(set.get("b").unwrap().is_inert());
        assert_eq!(set.sample("b", 0, 0.5, 0.5, &backend), None);
        assert_eq!(
            set.sample("a", 0, 0.5, 0.5, &backend),
            Some(SampleValue::Float(0.5))
        );

        // Integer data cannot be interpolated on a subdivision surface.
        assert!(!set.add(
            "id",
            Interpolation::Vertex,
            &Value::from(vec![1i32; 4]),
            target,
            &mut backend
        ));

        set.clear(&mut backend);
        assert_eq!(set.slots_in_use(), 0);
        assert!(set.is_empty());
    }
}
