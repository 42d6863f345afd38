//! Buffer specs, pending buffer sources and allocated buffer ranges.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use strata_core::alloc::HashMap;
use strata_core::math::Vec3;
use strata_scene::{Value, ValueType};

use crate::topology::{CurveTopology, Triangulation};

/// Name, element type and element count of one buffer resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSpec {
    pub name: String,
    pub value_type: ValueType,
    pub count: usize,
}

impl BufferSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType, count: usize) -> Self {
        Self {
            name: name.into(),
            value_type,
            count,
        }
    }

    /// Merge `other` into `specs`. A name seen twice keeps the larger count
    /// and the later type.
    pub fn merge(specs: &mut Vec<BufferSpec>, other: &[BufferSpec]) {
        for spec in other {
            match specs.iter_mut().find(|s| s.name == spec.name) {
                Some(existing) => {
                    existing.value_type = spec.value_type;
                    existing.count = existing.count.max(spec.count);
                }
                None => specs.push(spec.clone()),
            }
        }
    }
}

/// A payload waiting to be written into a [`BufferRange`].
///
/// Computed variants are resolved when the registry commits, not when they
/// are queued.
#[derive(Debug, Clone)]
pub enum BufferSource {
    /// Scene value passed through unchanged.
    Raw { name: String, value: Value },
    /// Curve widths expanded to one value per control point.
    WidthsInterpolation {
        topology: Arc<CurveTopology>,
        widths: Arc<[f32]>,
    },
    /// Curve normals expanded to one value per control point.
    NormalsInterpolation {
        topology: Arc<CurveTopology>,
        normals: Arc<[Vec3]>,
    },
    /// Curve segment or patch indices.
    CurveIndices {
        topology: Arc<CurveTopology>,
        refine: bool,
    },
    /// Triangle indices of a triangulated mesh.
    TriangleIndices { triangulation: Arc<Triangulation> },
}

impl BufferSource {
    pub fn raw(name: impl Into<String>, value: Value) -> Self {
        BufferSource::Raw {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BufferSource::Raw { name, .. } => name,
            BufferSource::WidthsInterpolation { .. } => "widths",
            BufferSource::NormalsInterpolation { .. } => "normals",
            BufferSource::CurveIndices { .. } | BufferSource::TriangleIndices { .. } => "indices",
        }
    }

    /// Append the specs this source needs to `specs`.
    pub fn add_buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        let spec = match self {
            BufferSource::Raw { name, value } => match value.value_type() {
                Some(value_type) => BufferSpec::new(name.clone(), value_type, value.len()),
                None => return,
            },
            BufferSource::WidthsInterpolation { topology, .. } => {
                BufferSpec::new("widths", ValueType::Float, topology.needed_control_points())
            }
            BufferSource::NormalsInterpolation { topology, .. } => {
                BufferSpec::new("normals", ValueType::Vec3, topology.needed_control_points())
            }
            BufferSource::CurveIndices { topology, refine } => {
                BufferSpec::new("indices", ValueType::Int, topology.index_count(*refine))
            }
            BufferSource::TriangleIndices { triangulation } => BufferSpec::new(
                "indices",
                ValueType::Int,
                triangulation.num_triangles() * 3,
            ),
        };
        BufferSpec::merge(specs, &[spec]);
    }

    /// Produce the final value.
    pub fn resolve(&self) -> Value {
        match self {
            BufferSource::Raw { value, .. } => value.clone(),
            BufferSource::WidthsInterpolation { topology, widths } => {
                Value::Float(interpolate_per_vertex(topology, widths, 1.0, "widths"))
            }
            BufferSource::NormalsInterpolation { topology, normals } => {
                Value::Vec3(interpolate_per_vertex(topology, normals, Vec3::X, "normals"))
            }
            BufferSource::CurveIndices { topology, refine } => {
                Value::Int(topology.build_indices(*refine).indices.into())
            }
            BufferSource::TriangleIndices { triangulation } => Value::Int(
                triangulation
                    .indices
                    .iter()
                    .flat_map(|tri| tri.iter().map(|i| *i as i32))
                    .collect(),
            ),
        }
    }
}

/// Expand an authored curve attribute to one value per control point.
///
/// Accepts per-vertex data as is, broadcasts a single value, and repeats
/// per-curve values along each curve. Any other length is a data error:
/// it is logged and `fallback` is used everywhere.
fn interpolate_per_vertex<T: Copy>(
    topology: &CurveTopology,
    authored: &Arc<[T]>,
    fallback: T,
    what: &str,
) -> Arc<[T]> {
    let needed = topology.needed_control_points();
    match authored.len() {
        n if n == needed => authored.clone(),
        1 => vec![authored[0]; needed].into(),
        n if n == topology.num_curves() => topology
            .desc()
            .curve_vertex_counts
            .iter()
            .zip(authored.iter())
            .flat_map(|(count, value)| std::iter::repeat_n(*value, (*count).max(0) as usize))
            .collect(),
        n => {
            tracing::warn!(
                authored = n,
                needed,
                "Curve {} count does not match topology, using defaults",
                what
            );
            vec![fallback; needed].into()
        }
    }
}

/// Which pool a range was allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Topology,
    Primvar,
}

/// An allocated region holding one resource per [`BufferSpec`].
///
/// Ranges are shared through `Arc`: index ranges between every prim with the
/// same topology, primvar ranges by a single prim.
#[derive(Debug)]
pub struct BufferRange {
    id: u64,
    role: BufferRole,
    specs: Vec<BufferSpec>,
    resources: RwLock<HashMap<String, Value>>,
    valid: AtomicBool,
    uploads: AtomicUsize,
    bytes_uploaded: AtomicUsize,
}

impl BufferRange {
    pub(crate) fn new(id: u64, role: BufferRole, specs: Vec<BufferSpec>) -> Self {
        Self {
            id,
            role,
            specs,
            resources: RwLock::new(HashMap::new()),
            valid: AtomicBool::new(true),
            uploads: AtomicUsize::new(0),
            bytes_uploaded: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    pub fn specs(&self) -> &[BufferSpec] {
        &self.specs
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the range unusable. Holders reallocate on their next sync.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Whether every spec in `specs` fits an existing resource of this range.
    pub fn can_hold(&self, specs: &[BufferSpec]) -> bool {
        specs.iter().all(|spec| {
            self.specs
                .iter()
                .any(|s| s.name == spec.name && s.value_type == spec.value_type && spec.count <= s.count)
        })
    }

    pub fn resource(&self, name: &str) -> Option<Value> {
        self.resources.read().get(name).cloned()
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.read().contains_key(name)
    }

    /// Copy resources this range has no newer data for out of `old`.
    pub(crate) fn migrate_from(&self, old: &BufferRange) {
        let old_resources = old.resources.read();
        let mut resources = self.resources.write();
        for (name, value) in old_resources.iter() {
            let fits = self.specs.iter().any(|s| {
                s.name == *name && Some(s.value_type) == value.value_type() && value.len() <= s.count
            });
            if fits && !resources.contains_key(name) {
                resources.insert(name.clone(), value.clone());
            }
        }
    }

    /// Write a resolved source. Rejects data that does not match the specs.
    pub(crate) fn write(&self, name: &str, value: Value) -> bool {
        let fits = self.specs.iter().any(|s| {
            s.name == name && Some(s.value_type) == value.value_type() && value.len() <= s.count
        });
        if !fits {
            tracing::error!(
                range = self.id,
                resource = name,
                len = value.len(),
                "Buffer source does not fit its range"
            );
            return false;
        }
        self.bytes_uploaded
            .fetch_add(value.as_bytes().len(), Ordering::Relaxed);
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.resources.write().insert(name.to_string(), value);
        true
    }

    /// Number of resource writes this range has received.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> usize {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_scene::{CurveBasis, CurveTopologyDesc, CurveType};

    fn two_curves() -> Arc<CurveTopology> {
        Arc::new(CurveTopology::new(CurveTopologyDesc::new(
            CurveType::Linear,
            CurveBasis::Bezier,
            vec![2, 3],
        )))
    }

    #[test]
    fn test_spec_merge() {
        let mut specs = vec![BufferSpec::new("points", ValueType::Vec3, 4)];
        BufferSpec::merge(
            &mut specs,
            &[
                BufferSpec::new("points", ValueType::Vec3, 8),
                BufferSpec::new("displayColor", ValueType::Vec3, 1),
            ],
        );
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].count, 8);
    }

    #[test]
    fn test_widths_broadcast() {
        let source = BufferSource::WidthsInterpolation {
            topology: two_curves(),
            widths: vec![0.5f32].into(),
        };
        assert_eq!(source.resolve(), Value::from(vec![0.5f32; 5]));
    }

    #[test]
    fn test_widths_per_curve() {
        let source = BufferSource::WidthsInterpolation {
            topology: two_curves(),
            widths: vec![1.0f32, 2.0].into(),
        };
        assert_eq!(source.resolve(), Value::from(vec![1.0f32, 1.0, 2.0, 2.0, 2.0]));
    }

    #[test]
    fn test_widths_passthrough_and_fallback() {
        let passthrough = BufferSource::WidthsInterpolation {
            topology: two_curves(),
            widths: vec![1.0f32, 2.0, 3.0, 4.0, 5.0].into(),
        };
        assert_eq!(passthrough.resolve().len(), 5);

        let mismatched = BufferSource::NormalsInterpolation {
            topology: two_curves(),
            normals: vec![Vec3::Y; 3].into(),
        };
        assert_eq!(mismatched.resolve(), Value::from(vec![Vec3::X; 5]));
    }

    #[test]
    fn test_range_write_and_capacity() {
        let range = BufferRange::new(
            1,
            BufferRole::Primvar,
            vec![BufferSpec::new("points", ValueType::Vec3, 2)],
        );
        assert!(range.can_hold(&[BufferSpec::new("points", ValueType::Vec3, 1)]));
        assert!(!range.can_hold(&[BufferSpec::new("points", ValueType::Vec3, 3)]));
        assert!(!range.can_hold(&[BufferSpec::new("uv", ValueType::Vec2, 1)]));

        assert!(range.write("points", Value::from(vec![Vec3::ZERO, Vec3::ONE])));
        assert!(!range.write("points", Value::from(vec![1.0f32])));
        assert_eq!(range.upload_count(), 1);
        assert_eq!(range.bytes_uploaded(), 24);
    }

    #[test]
    fn test_range_invalidate() {
        let range = BufferRange::new(2, BufferRole::Topology, Vec::new());
        assert!(range.is_valid());
        range.invalidate();
        assert!(!range.is_valid());
    }
}
