/// Per-primitive display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayStyle {
    /// Subdivision refinement level. Zero means unrefined.
    pub refine_level: i32,
    pub flat_shading: bool,
}

impl DisplayStyle {
    pub fn refined(refine_level: i32) -> Self {
        Self {
            refine_level,
            flat_shading: false,
        }
    }
}

/// Which faces are discarded when hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullStyle {
    /// No opinion; treated as no culling.
    #[default]
    DontCare,
    Nothing,
    Back,
    Front,
    BackUnlessDoubleSided,
    FrontUnlessDoubleSided,
}

impl CullStyle {
    /// Whether a hit on a face of the given orientation is discarded.
    pub fn culls(self, front_facing: bool, double_sided: bool) -> bool {
        match self {
            CullStyle::DontCare | CullStyle::Nothing => false,
            CullStyle::Back => !front_facing,
            CullStyle::Front => front_facing,
            CullStyle::BackUnlessDoubleSided => !front_facing && !double_sided,
            CullStyle::FrontUnlessDoubleSided => front_facing && !double_sided,
        }
    }
}
