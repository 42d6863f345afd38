//! Primvar population pipeline.
//!
//! Pulls dirty primvars from the scene delegate one interpolation domain at a
//! time and turns them into buffer sources queued against the prim's
//! per-domain buffer ranges.

use std::sync::Arc;

use strata_core::alloc::{HashMap, HashSet};
use strata_core::profiling::profile_function;
use strata_scene::{Interpolation, PrimId, SceneDelegate, Value};

use crate::dirty::DirtyBits;
use crate::registry::{BufferRange, BufferRole, BufferSource, BufferSpec, ResourceRegistry};

/// A primvar value held by a prim together with its domain.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimvarSource {
    pub interpolation: Interpolation,
    pub value: Value,
}

pub type PrimvarMap = HashMap<String, PrimvarSource>;

/// One freshly pulled primvar.
#[derive(Debug, Clone)]
pub struct PulledPrimvar {
    pub name: String,
    pub interpolation: Interpolation,
    pub value: Value,
}

/// Pull every dirty primvar authored on `id` in `domains`.
///
/// Clean names are skipped without touching the delegate. Empty values are
/// skipped too: a prim may simply not author an optional primvar.
pub fn pull_dirty(
    scene: &dyn SceneDelegate,
    id: &PrimId,
    bits: DirtyBits,
    domains: &[Interpolation],
) -> Vec<PulledPrimvar> {
    profile_function!();
    let mut pulled = Vec::new();
    for &interpolation in domains {
        for desc in scene.primvar_descriptors(id, interpolation) {
            if !bits.is_primvar_dirty(&desc.name) {
                continue;
            }
            let value = scene.get(id, &desc.name);
            if value.is_empty() {
                tracing::trace!(prim = %id, primvar = %desc.name, "Skipping empty primvar");
                continue;
            }
            pulled.push(PulledPrimvar {
                name: desc.name,
                interpolation,
                value,
            });
        }
    }
    pulled
}

/// Names of every primvar `id` currently describes in `domains`.
pub fn described_names(
    scene: &dyn SceneDelegate,
    id: &PrimId,
    domains: &[Interpolation],
) -> HashSet<String> {
    domains
        .iter()
        .flat_map(|&interpolation| scene.primvar_descriptors(id, interpolation))
        .map(|desc| desc.name)
        .collect()
}

/// Warn when the authored point count differs from what the topology
/// needs. Never fails: mismatched geometry is still drawn.
pub fn check_point_count(id: &PrimId, points: &Value, needed: usize) -> bool {
    let ok = points.len() == needed;
    if !ok {
        tracing::warn!(
            prim = %id,
            authored = points.len(),
            needed,
            "Point count does not match topology"
        );
    }
    ok
}

/// Queue `sources` into `slot`, reallocating the range when it is missing,
/// invalid or too small.
///
/// A new range is sized to the union of the old range's specs and the
/// specs of the pending sources, and keeps any old resource that still fits.
pub fn update_range(
    registry: &ResourceRegistry,
    slot: &mut Option<Arc<BufferRange>>,
    sources: Vec<BufferSource>,
) {
    if sources.is_empty() {
        return;
    }
    let mut specs = Vec::new();
    for source in &sources {
        source.add_buffer_specs(&mut specs);
    }

    if let Some(range) = slot.as_ref()
        && range.is_valid()
        && range.can_hold(&specs)
    {
        registry.add_sources(range, sources);
        return;
    }

    let mut union = slot
        .as_ref()
        .map(|range| range.specs().to_vec())
        .unwrap_or_default();
    BufferSpec::merge(&mut union, &specs);
    let range = registry.allocate_buffer_range(BufferRole::Primvar, union);
    if let Some(old) = slot.as_ref() {
        range.migrate_from(old);
    }
    tracing::trace!(range = range.id(), "Allocated primvar range");
    registry.add_sources(&range, sources);
    *slot = Some(range);
}

/// Per-domain primvar ranges of one prim. Vertex and varying data share a
/// range.
#[derive(Debug, Default)]
pub struct PrimvarRanges {
    pub constant: Option<Arc<BufferRange>>,
    pub uniform: Option<Arc<BufferRange>>,
    pub vertex: Option<Arc<BufferRange>>,
    pub face_varying: Option<Arc<BufferRange>>,
}

impl PrimvarRanges {
    pub fn slot_mut(&mut self, interpolation: Interpolation) -> &mut Option<Arc<BufferRange>> {
        match interpolation {
            Interpolation::Constant => &mut self.constant,
            Interpolation::Uniform => &mut self.uniform,
            Interpolation::Vertex | Interpolation::Varying => &mut self.vertex,
            Interpolation::FaceVarying => &mut self.face_varying,
        }
    }

    pub fn get(&self, interpolation: Interpolation) -> Option<&Arc<BufferRange>> {
        match interpolation {
            Interpolation::Constant => self.constant.as_ref(),
            Interpolation::Uniform => self.uniform.as_ref(),
            Interpolation::Vertex | Interpolation::Varying => self.vertex.as_ref(),
            Interpolation::FaceVarying => self.face_varying.as_ref(),
        }
    }

    /// Queue grouped sources, one range per domain.
    pub fn enqueue(
        &mut self,
        registry: &ResourceRegistry,
        sources: Vec<(Interpolation, BufferSource)>,
    ) {
        let mut grouped: Vec<(Interpolation, Vec<BufferSource>)> = Vec::new();
        for (interpolation, source) in sources {
            let key = match interpolation {
                Interpolation::Varying => Interpolation::Vertex,
                other => other,
            };
            match grouped.iter_mut().find(|(i, _)| *i == key) {
                Some((_, list)) => list.push(source),
                None => grouped.push((key, vec![source])),
            }
        }
        for (interpolation, sources) in grouped {
            update_range(registry, self.slot_mut(interpolation), sources);
        }
    }
}
