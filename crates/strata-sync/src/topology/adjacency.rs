use strata_core::alloc::HashSet;
use strata_core::math::Vec3;
use strata_core::profiling::profile_function;

use super::MeshTopology;

/// Vertex to incident-face table, used for smooth normals.
///
/// Stored CSR style: faces touching vertex `v` are
/// `faces[offsets[v]..offsets[v + 1]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency {
    offsets: Vec<u32>,
    faces: Vec<u32>,
}

impl Adjacency {
    pub fn build(topology: &MeshTopology) -> Self {
        profile_function!();
        let num_points = topology.num_points();
        let holes: HashSet<i32> = topology.hole_indices().iter().copied().collect();

        let mut counts = vec![0u32; num_points + 1];
        for (face, _, verts) in topology.faces() {
            if holes.contains(&(face as i32)) {
                continue;
            }
            for &v in verts.iter().filter(|v| **v >= 0) {
                counts[v as usize + 1] += 1;
            }
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }

        let offsets = counts.clone();
        let mut cursor = counts;
        let mut faces = vec![0u32; offsets.last().copied().unwrap_or(0) as usize];
        for (face, _, verts) in topology.faces() {
            if holes.contains(&(face as i32)) {
                continue;
            }
            for &v in verts.iter().filter(|v| **v >= 0) {
                let slot = &mut cursor[v as usize];
                faces[*slot as usize] = face as u32;
                *slot += 1;
            }
        }

        Self { offsets, faces }
    }

    pub fn num_points(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Faces incident to vertex `v`.
    pub fn faces_of(&self, v: usize) -> &[u32] {
        match (self.offsets.get(v), self.offsets.get(v + 1)) {
            (Some(&start), Some(&end)) => &self.faces[start as usize..end as usize],
            _ => &[],
        }
    }

    /// Area-weighted vertex normals for `points`.
    ///
    /// Indices outside `points` are ignored. Vertices with no usable face get
    /// a zero normal.
    pub fn compute_smooth_normals(&self, topology: &MeshTopology, points: &[Vec3]) -> Vec<Vec3> {
        profile_function!();
        let mut face_normals = vec![Vec3::ZERO; topology.num_faces()];
        for (face, _, verts) in topology.faces() {
            face_normals[face] = newell_normal(verts, points);
        }

        (0..points.len())
            .map(|v| {
                self.faces_of(v)
                    .iter()
                    .map(|face| face_normals[*face as usize])
                    .sum::<Vec3>()
                    .normalize_or_zero()
            })
            .collect()
    }
}

/// Un-normalized polygon normal; its length is twice the polygon area.
fn newell_normal(verts: &[i32], points: &[Vec3]) -> Vec3 {
    let fetch = |i: i32| usize::try_from(i).ok().and_then(|i| points.get(i)).copied();
    let mut normal = Vec3::ZERO;
    for (k, &a) in verts.iter().enumerate() {
        let b = verts[(k + 1) % verts.len()];
        let (Some(p), Some(q)) = (fetch(a), fetch(b)) else {
            return Vec3::ZERO;
        };
        normal += p.cross(q);
    }
    normal
}
