use std::sync::Arc;

use parking_lot::RwLock;
use strata_scene::{CullStyle, PrimId};

use crate::backend::HitFilter;
use crate::sampler::SamplerSet;

/// User context attached to a mesh's prototype geometry.
///
/// Hit resolution reaches it through the backend's user data and uses it to
/// find the owning prim and its samplers.
#[derive(Debug)]
pub struct PrototypeContext {
    pub prim: PrimId,
    pub samplers: RwLock<SamplerSet>,
    cull: RwLock<(CullStyle, bool)>,
}

impl PrototypeContext {
    pub fn new(prim: PrimId, max_slots: u16, cull_style: CullStyle, double_sided: bool) -> Self {
        Self {
            prim,
            samplers: RwLock::new(SamplerSet::new(max_slots)),
            cull: RwLock::new((cull_style, double_sided)),
        }
    }

    pub fn set_cull(&self, cull_style: CullStyle, double_sided: bool) {
        *self.cull.write() = (cull_style, double_sided);
    }

    pub fn cull(&self) -> (CullStyle, bool) {
        *self.cull.read()
    }

    /// Hit filter reading the current cull state on every call.
    pub fn hit_filter(self: &Arc<Self>) -> HitFilter {
        let context = Arc::clone(self);
        Arc::new(move |front_facing: bool| {
            let (style, double_sided) = context.cull();
            !style.culls(front_facing, double_sided)
        })
    }
}
