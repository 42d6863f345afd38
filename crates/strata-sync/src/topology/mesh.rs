use std::hash::Hasher;

use strata_core::alloc::HashSet;
use strata_core::profiling::profile_function;
use strata_scene::{MeshTopologyDesc, SubdivScheme, SubdivTags, Value};

use super::{TopologyId, hash_f32s, hash_i32s};

/// Mesh connectivity plus the per-primitive refinement state that
/// distinguishes otherwise identical meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshTopology {
    desc: MeshTopologyDesc,
    refine_level: i32,
    subdiv_tags: SubdivTags,
}

impl MeshTopology {
    pub fn new(desc: MeshTopologyDesc, refine_level: i32) -> Self {
        Self {
            desc,
            refine_level,
            subdiv_tags: SubdivTags::default(),
        }
    }

    /// Copy of this topology at another refine level.
    pub fn with_refine_level(&self, refine_level: i32) -> Self {
        Self {
            refine_level,
            ..self.clone()
        }
    }

    /// Copy of this topology carrying `tags`.
    pub fn with_subdiv_tags(&self, subdiv_tags: SubdivTags) -> Self {
        Self {
            subdiv_tags,
            ..self.clone()
        }
    }

    pub fn compute_hash(&self) -> TopologyId {
        profile_function!();
        let mut hasher = fxhash::FxHasher64::default();
        hasher.write_u8(self.desc.scheme as u8);
        hash_i32s(&mut hasher, &self.desc.face_vertex_counts);
        hash_i32s(&mut hasher, &self.desc.face_vertex_indices);
        hash_i32s(&mut hasher, &self.desc.hole_indices);
        hasher.write_i32(self.refine_level);

        let tags = &self.subdiv_tags;
        hasher.write(tags.vertex_interpolation_rule.as_bytes());
        hash_i32s(&mut hasher, &tags.crease_indices);
        hash_i32s(&mut hasher, &tags.crease_lengths);
        hash_f32s(&mut hasher, &tags.crease_weights);
        hash_i32s(&mut hasher, &tags.corner_indices);
        hash_f32s(&mut hasher, &tags.corner_weights);
        TopologyId(hasher.finish())
    }

    pub fn desc(&self) -> &MeshTopologyDesc {
        &self.desc
    }

    pub fn scheme(&self) -> SubdivScheme {
        self.desc.scheme
    }

    pub fn refine_level(&self) -> i32 {
        self.refine_level
    }

    pub fn subdiv_tags(&self) -> &SubdivTags {
        &self.subdiv_tags
    }

    pub fn face_vertex_counts(&self) -> &[i32] {
        &self.desc.face_vertex_counts
    }

    pub fn face_vertex_indices(&self) -> &[i32] {
        &self.desc.face_vertex_indices
    }

    pub fn hole_indices(&self) -> &[i32] {
        &self.desc.hole_indices
    }

    pub fn num_faces(&self) -> usize {
        self.desc.face_vertex_counts.len()
    }

    /// Number of points the indices reference (largest index plus one).
    pub fn num_points(&self) -> usize {
        self.desc
            .face_vertex_indices
            .iter()
            .copied()
            .max()
            .map_or(0, |max| (max.max(-1) + 1) as usize)
    }

    /// Iterate `(face, first_corner, vertex_indices)` for every face whose
    /// indices are present. Stops with a warning if the counts run past the
    /// index array.
    pub(crate) fn faces(&self) -> impl Iterator<Item = (usize, usize, &[i32])> {
        let indices = &self.desc.face_vertex_indices;
        let mut offset = 0usize;
        let mut warned = false;
        self.desc
            .face_vertex_counts
            .iter()
            .enumerate()
            .map_while(move |(face, &count)| {
                let count = count.max(0) as usize;
                let start = offset;
                let end = start + count;
                if end > indices.len() {
                    if !warned {
                        tracing::warn!(
                            face,
                            indices = indices.len(),
                            "Face vertex counts exceed face vertex indices"
                        );
                        warned = true;
                    }
                    return None;
                }
                offset = end;
                Some((face, start, &indices[start..end]))
            })
    }

    /// Fan-triangulate every non-hole face.
    pub fn triangulate(&self) -> Triangulation {
        profile_function!();
        let holes: HashSet<i32> = self.desc.hole_indices.iter().copied().collect();
        let mut out = Triangulation::default();

        for (face, start, verts) in self.faces() {
            if verts.len() < 3 || holes.contains(&(face as i32)) {
                continue;
            }
            if verts.iter().any(|&v| v < 0) {
                tracing::warn!(face, "Skipping face with negative vertex index");
                out.skipped_faces += 1;
                continue;
            }
            let last = verts.len() - 2;
            for k in 1..verts.len() - 1 {
                out.indices
                    .push([verts[0] as u32, verts[k] as u32, verts[k + 1] as u32]);
                out.corners.push([
                    start as u32,
                    (start + k) as u32,
                    (start + k + 1) as u32,
                ]);
                out.primitive_params
                    .push(Triangulation::encode_param(face, k == 1, k == last));
            }
        }
        out
    }
}

/// Flat triangle form of a mesh topology.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triangulation {
    /// Point indices per triangle.
    pub indices: Vec<[u32; 3]>,
    /// Face-varying (corner) indices per triangle.
    pub corners: Vec<[u32; 3]>,
    /// Source face and fan-edge flags per triangle, see [`Triangulation::decode_face`].
    pub primitive_params: Vec<i32>,
    /// Faces dropped because their indices were unusable.
    pub skipped_faces: usize,
}

impl Triangulation {
    /// Pack the source face with flags marking the first and last fan
    /// triangle in the low two bits.
    pub fn encode_param(face: usize, first: bool, last: bool) -> i32 {
        let flags = match (first, last) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        ((face as i32) << 2) | flags
    }

    pub fn decode_face(param: i32) -> u32 {
        (param >> 2) as u32
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len()
    }

    /// Authored face that produced triangle `element`.
    pub fn source_face(&self, element: u32) -> Option<u32> {
        self.primitive_params
            .get(element as usize)
            .map(|param| Self::decode_face(*param))
    }

    /// Re-order face-varying data so triangle `t` owns entries `3t..3t+3`.
    pub fn triangulate_face_varying(&self, value: &Value) -> Value {
        profile_function!();
        value.gather(
            self.corners
                .iter()
                .flat_map(|corners| corners.iter().map(|c| *c as usize)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_and_tri() -> MeshTopology {
        MeshTopology::new(
            MeshTopologyDesc::new(vec![4, 3], vec![0, 1, 2, 3, 1, 4, 2]),
            0,
        )
    }

    #[test]
    fn test_triangulate_fan() {
        let tri = quad_and_tri().triangulate();
        assert_eq!(tri.indices, vec![[0, 1, 2], [0, 2, 3], [1, 4, 2]]);
        assert_eq!(tri.corners, vec![[0, 1, 2], [0, 2, 3], [4, 5, 6]]);
        assert_eq!(tri.source_face(0), Some(0));
        assert_eq!(tri.source_face(1), Some(0));
        assert_eq!(tri.source_face(2), Some(1));
        assert_eq!(tri.source_face(3), None);
    }

    #[test]
    fn test_triangulate_skips_holes() {
        let topology = MeshTopology::new(
            MeshTopologyDesc::new(vec![3, 3], vec![0, 1, 2, 2, 1, 3]).with_holes(vec![0]),
            0,
        );
        let tri = topology.triangulate();
        assert_eq!(tri.indices, vec![[2, 1, 3]]);
        assert_eq!(tri.source_face(0), Some(1));
    }

    #[test]
    fn test_triangulate_truncated_indices() {
        let topology = MeshTopology::new(MeshTopologyDesc::new(vec![3, 4], vec![0, 1, 2, 3]), 0);
        let tri = topology.triangulate();
        assert_eq!(tri.num_triangles(), 1);
    }

    #[test]
    fn test_hash_identity() {
        let a = quad_and_tri();
        let b = quad_and_tri();
        assert_eq!(a.compute_hash(), b.compute_hash());

        let mut desc = a.desc().clone();
        desc.face_vertex_indices[6] = 3;
        let c = MeshTopology::new(desc, 0);
        assert_ne!(a.compute_hash(), c.compute_hash());
        assert_ne!(a.compute_hash(), a.with_refine_level(2).compute_hash());
    }

    #[test]
    fn test_with_refine_level_copies() {
        let a = quad_and_tri();
        let b = a.with_refine_level(3);
        assert_eq!(a.refine_level(), 0);
        assert_eq!(b.refine_level(), 3);
        assert_eq!(a.desc(), b.desc());
    }

    #[test]
    fn test_num_points() {
        assert_eq!(quad_and_tri().num_points(), 5);
        assert_eq!(MeshTopology::new(MeshTopologyDesc::default(), 0).num_points(), 0);
    }

    #[test]
    fn test_face_varying_triangulation() {
        let tri = quad_and_tri().triangulate();
        let value = Value::from(vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = tri.triangulate_face_varying(&value);
        assert_eq!(
            out,
            Value::from(vec![0.0f32, 1.0, 2.0, 0.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        );
    }
}
