use std::hash::Hasher;

use strata_core::profiling::profile_function;
use strata_scene::{CurveBasis, CurveTopologyDesc, CurveType, CurveWrap};

use super::{TopologyId, hash_i32s};

/// Basis curves connectivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveTopology {
    desc: CurveTopologyDesc,
}

/// Index buffer produced for a curves draw item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveIndices {
    /// Flattened indices, `arity` per primitive.
    pub indices: Vec<i32>,
    /// 2 for line segments, 4 for cubic patches.
    pub arity: usize,
}

impl CurveTopology {
    pub fn new(desc: CurveTopologyDesc) -> Self {
        Self { desc }
    }

    pub fn compute_hash(&self) -> TopologyId {
        let mut hasher = fxhash::FxHasher64::default();
        hasher.write_u8(self.desc.curve_type as u8);
        hasher.write_u8(self.desc.basis as u8);
        hasher.write_u8(self.desc.wrap as u8);
        hash_i32s(&mut hasher, &self.desc.curve_vertex_counts);
        hash_i32s(&mut hasher, &self.desc.curve_indices);
        TopologyId(hasher.finish())
    }

    pub fn desc(&self) -> &CurveTopologyDesc {
        &self.desc
    }

    pub fn curve_type(&self) -> CurveType {
        self.desc.curve_type
    }

    pub fn basis(&self) -> CurveBasis {
        self.desc.basis
    }

    pub fn has_indices(&self) -> bool {
        !self.desc.curve_indices.is_empty()
    }

    pub fn num_curves(&self) -> usize {
        self.desc.curve_vertex_counts.len()
    }

    /// Control points the topology needs: one past the largest explicit
    /// index, otherwise the sum of the vertex counts.
    pub fn needed_control_points(&self) -> usize {
        if self.has_indices() {
            self.desc
                .curve_indices
                .iter()
                .copied()
                .max()
                .map_or(0, |max| (max.max(-1) + 1) as usize)
        } else {
            self.desc
                .curve_vertex_counts
                .iter()
                .map(|c| (*c).max(0) as usize)
                .sum()
        }
    }

    /// Whether `refine` produces cubic patches for this topology.
    fn emits_patches(&self, refine: bool) -> bool {
        refine && self.desc.curve_type == CurveType::Cubic
    }

    /// Call `f` with the local vertex numbers of every primitive of one
    /// curve of `count` vertices.
    fn for_each_primitive(&self, count: usize, refine: bool, mut f: impl FnMut(&[usize])) {
        let periodic = self.desc.wrap == CurveWrap::Periodic;
        if count < 2 {
            return;
        }
        if !self.emits_patches(refine) {
            for i in 0..count - 1 {
                f(&[i, i + 1]);
            }
            if periodic {
                f(&[count - 1, 0]);
            }
            return;
        }

        let step = match self.desc.basis {
            CurveBasis::Bezier => 3,
            _ => 1,
        };
        if periodic {
            let mut i = 0;
            while i < count {
                f(&[i, (i + 1) % count, (i + 2) % count, (i + 3) % count]);
                i += step;
            }
        } else if count >= 4 {
            let mut i = 0;
            while i + 3 < count {
                f(&[i, i + 1, i + 2, i + 3]);
                i += step;
            }
        }
    }

    /// Number of indices [`CurveTopology::build_indices`] will emit.
    pub fn index_count(&self, refine: bool) -> usize {
        let mut total = 0;
        for &count in &self.desc.curve_vertex_counts {
            self.for_each_primitive(count.max(0) as usize, refine, |prim| total += prim.len());
        }
        total
    }

    /// Build the index buffer, as line segments or, when `refine` is set on
    /// a cubic curve, as 4-point patches.
    pub fn build_indices(&self, refine: bool) -> CurveIndices {
        profile_function!();
        let arity = if self.emits_patches(refine) { 4 } else { 2 };
        let mut indices = Vec::with_capacity(self.index_count(refine));
        let mut offset = 0usize;
        for &count in &self.desc.curve_vertex_counts {
            let count = count.max(0) as usize;
            self.for_each_primitive(count, refine, |prim| {
                for local in prim {
                    let vertex = offset + local;
                    let index = if self.has_indices() {
                        self.desc.curve_indices.get(vertex).copied().unwrap_or(0)
                    } else {
                        vertex as i32
                    };
                    indices.push(index);
                }
            });
            offset += count;
        }
        CurveIndices { indices, arity }
    }
}
