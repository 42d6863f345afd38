//! Basis curves prim.
//!
//! Curves only go through the shared-resource path: topology and index
//! ranges are deduplicated through the registry and primvars are queued
//! into per-domain ranges. They own no backend geometry.

use std::sync::Arc;

use strata_core::math::{Mat4, Vec4};
use strata_core::profiling::profile_function;
use strata_scene::{CurveBasis, CurveType, Interpolation, PrimId, Value};

use crate::backend::GeometryBackend;
use crate::delegate::SyncContext;
use crate::dirty::DirtyBits;
use crate::primvar::{self, PrimvarRanges};
use crate::registry::{BufferRange, BufferSource, IndexVariant, ResourceKey};
use crate::repr::{GeomStyle, ReprDesc};
use crate::topology::{CurveTopology, TopologyId};

const CURVE_DOMAINS: [Interpolation; 4] = [
    Interpolation::Constant,
    Interpolation::Uniform,
    Interpolation::Vertex,
    Interpolation::Varying,
];

/// Shader-selection key of a curves prim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurvesStyleKey {
    pub basis: CurveBasis,
    pub authored_normals: bool,
    pub smooth: bool,
}

/// One synthesized draw item.
#[derive(Debug, Clone)]
pub struct CurvesDrawItem {
    pub desc: ReprDesc,
    pub index_range: Option<Arc<BufferRange>>,
    pub smooth: bool,
}

impl CurvesDrawItem {
    /// Custom dirty bit tracking this item's index buffer.
    pub fn index_bit(&self) -> DirtyBits {
        match self.desc.geom_style {
            GeomStyle::Hull => DirtyBits::DIRTY_HULL_INDICES,
            _ => DirtyBits::DIRTY_INDICES,
        }
    }

    fn index_variant(&self) -> IndexVariant {
        match self.desc.geom_style {
            GeomStyle::Hull => IndexVariant::HullIndices,
            _ => IndexVariant::Indices,
        }
    }
}

pub struct BasisCurves {
    id: PrimId,
    topology: Option<Arc<CurveTopology>>,
    topology_id: Option<TopologyId>,
    resource_key: Option<ResourceKey>,
    refine_level: i32,
    local_transform: Mat4,
    visible: bool,
    reprs: Vec<(String, Vec<CurvesDrawItem>)>,
    custom_bits: DirtyBits,
    ranges: PrimvarRanges,
    authored_normals: bool,
    style_key: Option<CurvesStyleKey>,
}

impl BasisCurves {
    pub fn new(id: PrimId) -> Self {
        Self {
            id,
            topology: None,
            topology_id: None,
            resource_key: None,
            refine_level: 0,
            local_transform: Mat4::IDENTITY,
            visible: true,
            reprs: Vec::new(),
            custom_bits: DirtyBits::CLEAN,
            ranges: PrimvarRanges::default(),
            authored_normals: false,
            style_key: None,
        }
    }

    pub fn initial_dirty_bits() -> DirtyBits {
        DirtyBits::INITIAL_CURVES
    }

    pub fn id(&self) -> &PrimId {
        &self.id
    }

    pub fn topology(&self) -> Option<&Arc<CurveTopology>> {
        self.topology.as_ref()
    }

    pub fn topology_id(&self) -> Option<TopologyId> {
        self.topology_id
    }

    /// Registry key of the index ranges; private after a hash collision.
    pub fn resource_key(&self) -> Option<ResourceKey> {
        self.resource_key
    }

    pub fn draw_items(&self, repr: &str) -> Option<&[CurvesDrawItem]> {
        self.reprs
            .iter()
            .find(|(name, _)| name == repr)
            .map(|(_, items)| items.as_slice())
    }

    /// Custom bits registered by every synthesized draw item.
    pub fn custom_bits(&self) -> DirtyBits {
        self.custom_bits
    }

    pub fn primvar_range(&self, interpolation: Interpolation) -> Option<&Arc<BufferRange>> {
        self.ranges.get(interpolation)
    }

    pub fn style_key(&self) -> Option<CurvesStyleKey> {
        self.style_key
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Whether `desc` draws this prim as smooth cubic patches.
    fn supports_smooth(&self, desc: &ReprDesc, force_refined: bool) -> bool {
        let Some(topology) = &self.topology else {
            return false;
        };
        desc.geom_style == GeomStyle::Refined
            && topology.curve_type() == CurveType::Cubic
            && matches!(
                topology.basis(),
                CurveBasis::Bezier | CurveBasis::BSpline | CurveBasis::CatmullRom
            )
            && (self.refine_level > 0 || force_refined)
    }

    /// Create draw items for `repr` on first use and register their custom
    /// bits. Newly registered bits come back set so this pass services them.
    fn init_repr(&mut self, repr: &str, descs: &[ReprDesc]) -> DirtyBits {
        if self.draw_items(repr).is_some() {
            return DirtyBits::CLEAN;
        }
        let items: Vec<CurvesDrawItem> = descs
            .iter()
            .filter(|desc| desc.is_valid())
            .map(|desc| CurvesDrawItem {
                desc: *desc,
                index_range: None,
                smooth: false,
            })
            .collect();
        let mut registered = DirtyBits::CLEAN;
        for item in &items {
            let bit = item.index_bit();
            if !self.custom_bits.contains(bit) {
                tracing::trace!(prim = %self.id, ?bit, "Registered custom dirty bit");
            }
            self.custom_bits |= bit;
            registered |= bit;
        }
        self.reprs.push((repr.to_string(), items));
        registered
    }

    /// Sync draw items of `repr`. `force_refined` is the curves table policy.
    pub fn sync<B: GeometryBackend>(
        &mut self,
        ctx: &SyncContext<'_, B>,
        bits: DirtyBits,
        repr: &str,
        descs: &[ReprDesc],
        force_refined: bool,
    ) -> DirtyBits {
        profile_function!();
        let scene = ctx.scene;
        let id = self.id.clone();
        let mut bits = (bits | self.init_repr(repr, descs)) - DirtyBits::INIT_REPR;
        bits = bits.propagate(self.custom_bits);

        if bits.contains(DirtyBits::DISPLAY_STYLE) {
            self.refine_level = scene.display_style(&id).refine_level;
            self.style_key = None;
        }
        if bits.intersects(DirtyBits::TOPOLOGY | DirtyBits::DISPLAY_STYLE) || self.topology.is_none() {
            let desc = match (&self.topology, bits.is_topology_dirty()) {
                (Some(current), false) => current.desc().clone(),
                _ => scene.curve_topology(&id),
            };
            let candidate = CurveTopology::new(desc);
            let topology_id = candidate.compute_hash().combine(self.refine_level > 0);
            let shared = ctx.registry.share_curve_topology(topology_id, candidate);
            if self.topology_id != Some(topology_id) || self.resource_key != Some(shared.key) {
                bits |= self.custom_bits & DirtyBits::INDEX_BITS;
                self.style_key = None;
            }
            self.topology = Some(shared.topology);
            self.topology_id = Some(topology_id);
            self.resource_key = Some(shared.key);
        }
        if bits.contains(DirtyBits::TRANSFORM) {
            self.local_transform = scene.transform(&id);
        }
        if bits.contains(DirtyBits::VISIBILITY) {
            self.visible = scene.visible(&id);
        }

        let Some((topology, resource_key)) = self.topology.clone().zip(self.resource_key) else {
            return bits;
        };

        let mut serviced = DirtyBits::CLEAN;
        let mut key_smooth = false;
        let smooth_flags: Vec<bool> = self
            .draw_items(repr)
            .unwrap_or_default()
            .iter()
            .map(|item| self.supports_smooth(&item.desc, force_refined))
            .collect();
        if let Some((_, items)) = self.reprs.iter_mut().find(|(name, _)| name == repr) {
            for (item, smooth) in items.iter_mut().zip(smooth_flags) {
                let bit = item.index_bit();
                key_smooth |= smooth;
                if bits.contains(bit) || item.index_range.is_none() || item.smooth != smooth {
                    let key = match item.index_variant() {
                        IndexVariant::Indices => resource_key.combine(smooth),
                        _ => resource_key,
                    };
                    let shared = topology.clone();
                    item.index_range = Some(ctx.registry.index_range(key, item.index_variant(), || {
                        vec![BufferSource::CurveIndices {
                            topology: shared,
                            refine: smooth,
                        }]
                    }));
                    item.smooth = smooth;
                }
                serviced |= bit;
            }
        }

        self.update_primvars(ctx, bits, &topology);

        if self.style_key.is_none() || bits.is_any_primvar_dirty() {
            self.style_key = Some(CurvesStyleKey {
                basis: topology.basis(),
                authored_normals: self.authored_normals,
                smooth: key_smooth,
            });
        }

        bits - DirtyBits::ALL_SCENE_DIRTY_BITS - serviced
    }

    fn update_primvars<B: GeometryBackend>(
        &mut self,
        ctx: &SyncContext<'_, B>,
        bits: DirtyBits,
        topology: &Arc<CurveTopology>,
    ) {
        let mut sources = Vec::new();
        if bits.contains(DirtyBits::TRANSFORM) {
            let columns = self.local_transform.to_cols_array_2d().map(Vec4::from_array);
            sources.push((
                Interpolation::Constant,
                BufferSource::raw("transform", Value::from(columns.to_vec())),
            ));
        }
        if bits.is_any_primvar_dirty() {
            for pv in primvar::pull_dirty(ctx.scene, &self.id, bits, &CURVE_DOMAINS) {
                let per_vertex = matches!(
                    pv.interpolation,
                    Interpolation::Vertex | Interpolation::Varying
                );
                let source = match pv.name.as_str() {
                    "points" => {
                        if !topology.has_indices() {
                            primvar::check_point_count(
                                &self.id,
                                &pv.value,
                                topology.needed_control_points(),
                            );
                        }
                        BufferSource::raw(pv.name.clone(), pv.value)
                    }
                    "widths" if per_vertex => match pv.value.as_float() {
                        Some(widths) => BufferSource::WidthsInterpolation {
                            topology: topology.clone(),
                            widths: widths.clone(),
                        },
                        None => {
                            tracing::warn!(prim = %self.id, "Widths are not floats, ignoring");
                            continue;
                        }
                    },
                    "normals" if per_vertex => {
                        self.authored_normals = true;
                        match pv.value.as_vec3() {
                            Some(normals) => BufferSource::NormalsInterpolation {
                                topology: topology.clone(),
                                normals: normals.clone(),
                            },
                            None => {
                                tracing::warn!(prim = %self.id, "Normals are not 3-vectors, ignoring");
                                continue;
                            }
                        }
                    }
                    _ => BufferSource::raw(pv.name.clone(), pv.value),
                };
                sources.push((pv.interpolation, source));
            }
            if bits.contains(DirtyBits::NORMALS) {
                self.authored_normals = primvar::described_names(ctx.scene, &self.id, &CURVE_DOMAINS)
                    .contains("normals");
            }
        }
        self.ranges.enqueue(ctx.registry, sources);
    }

    /// Drop every range and draw item. Curves own no backend objects.
    pub fn finalize(&mut self) {
        self.reprs.clear();
        self.ranges = PrimvarRanges::default();
        self.topology = None;
        self.topology_id = None;
        self.resource_key = None;
        self.style_key = None;
    }
}
