//! Conversion of mesh topology into backend build descriptions.

use strata_scene::SubdivTags;

use crate::backend::{BoundaryMode, SubdivisionDesc};
use crate::topology::MeshTopology;

/// Backend tessellation rate for a refine level.
///
/// Refine levels count recursive splits, the backend wants segments per
/// edge. A rate of 1 would be the unrefined cage, so the minimum is 2.
pub fn tessellation_rate(refine_level: i32) -> f32 {
    let level = refine_level.clamp(0, 16) as u32;
    (1u32 << level).max(2) as f32
}

/// Boundary interpolation for a vertex interpolation rule.
///
/// `None` for an empty rule; unknown rules are warned about and ignored.
pub fn boundary_mode(rule: &str) -> Option<BoundaryMode> {
    match rule {
        "none" => Some(BoundaryMode::NoBoundary),
        "edgeOnly" => Some(BoundaryMode::SmoothBoundary),
        "edgeAndCorner" => Some(BoundaryMode::PinCorners),
        "" => None,
        other => {
            tracing::warn!(rule = other, "Unknown vertex interpolation rule");
            None
        }
    }
}

/// Unroll run-length encoded crease edges.
///
/// A run of `n` vertices contributes `n - 1` edges. Weights are per run when
/// there is one weight per run, otherwise per edge. Runs reaching past the
/// index array end the unrolling with a warning.
pub fn unroll_edge_creases(tags: &SubdivTags) -> (Vec<[u32; 2]>, Vec<f32>) {
    let per_run = tags.crease_weights.len() == tags.crease_lengths.len();
    let mut edges = Vec::new();
    let mut weights = Vec::new();
    let mut start = 0usize;

    for (run, &length) in tags.crease_lengths.iter().enumerate() {
        let length = length.max(0) as usize;
        let Some(vertices) = tags.crease_indices.get(start..start + length) else {
            tracing::warn!(
                run,
                length,
                indices = tags.crease_indices.len(),
                "Crease run exceeds crease indices"
            );
            break;
        };
        for pair in vertices.windows(2) {
            let weight = if per_run {
                tags.crease_weights[run]
            } else {
                tags.crease_weights.get(edges.len()).copied().unwrap_or(0.0)
            };
            edges.push([pair[0].max(0) as u32, pair[1].max(0) as u32]);
            weights.push(weight);
        }
        start += length;
    }
    (edges, weights)
}

/// Full subdivision description for `topology`.
pub fn subdivision_desc(topology: &MeshTopology) -> SubdivisionDesc {
    let to_u32 = |values: &[i32]| values.iter().map(|v| (*v).max(0) as u32).collect::<Vec<_>>();
    let tags = topology.subdiv_tags();
    let (edge_creases, edge_crease_weights) = unroll_edge_creases(tags);

    let (vertex_creases, vertex_crease_weights) =
        if tags.corner_indices.len() == tags.corner_weights.len() {
            (to_u32(&tags.corner_indices), tags.corner_weights.clone())
        } else {
            tracing::warn!(
                indices = tags.corner_indices.len(),
                weights = tags.corner_weights.len(),
                "Vertex crease indices and weights differ in length, ignoring vertex creases"
            );
            (Vec::new(), Vec::new())
        };

    SubdivisionDesc {
        face_vertex_counts: to_u32(topology.face_vertex_counts()),
        face_vertex_indices: to_u32(topology.face_vertex_indices()),
        holes: to_u32(topology.hole_indices()),
        edge_creases,
        edge_crease_weights,
        vertex_creases,
        vertex_crease_weights,
    }
}
