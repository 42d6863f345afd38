//! Per-primitive dirty bits.

use bitflags::bitflags;

bitflags! {
    /// What changed on a primitive since its last sync.
    ///
    /// The low 24 bits are scene-level categories set by the change tracker.
    /// Bits from [`DirtyBits::CUSTOM_BITS_BEGIN`] upward belong to the
    /// primitive's draw items and are registered lazily.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u32 {
        /// Nothing to do.
        const CLEAN             = 0;

        /// The representation has never been synthesized.
        const INIT_REPR         = 1 << 0;
        /// Point positions changed.
        const POINTS            = 1 << 1;
        /// Connectivity changed. Forces a structural rebuild.
        const TOPOLOGY          = 1 << 2;
        const TRANSFORM         = 1 << 3;
        const VISIBILITY        = 1 << 4;
        const CULL_STYLE        = 1 << 5;
        const DOUBLE_SIDED      = 1 << 6;
        /// Refine level or flat shading changed.
        const DISPLAY_STYLE     = 1 << 7;
        const SUBDIV_TAGS       = 1 << 8;
        /// Any primvar other than points, normals and widths.
        const PRIMVAR           = 1 << 9;
        const NORMALS           = 1 << 10;
        const WIDTHS            = 1 << 11;
        /// The instancer changed which instances exist.
        const INSTANCER         = 1 << 12;
        const INSTANCE_INDEX    = 1 << 13;

        /// Index buffer of refined/points draw items.
        const DIRTY_INDICES      = 1 << 24;
        /// Index buffer of hull draw items.
        const DIRTY_HULL_INDICES = 1 << 25;
    }
}

impl DirtyBits {
    /// First bit available to draw-item specific flags.
    pub const CUSTOM_BITS_BEGIN: u32 = 1 << 24;

    /// Every scene-level category.
    pub const ALL_SCENE_DIRTY_BITS: Self = Self::from_bits_retain(Self::CUSTOM_BITS_BEGIN - 1);

    /// Draw-item index buffer bits that a topology change implies.
    pub const INDEX_BITS: Self = Self::DIRTY_INDICES.union(Self::DIRTY_HULL_INDICES);

    /// Any bit that says a primvar value must be re-pulled.
    pub const ANY_PRIMVAR: Self = Self::POINTS
        .union(Self::NORMALS)
        .union(Self::WIDTHS)
        .union(Self::PRIMVAR);

    /// Bits a mesh needs for its first sync.
    pub const INITIAL_MESH: Self = Self::INIT_REPR
        .union(Self::POINTS)
        .union(Self::TOPOLOGY)
        .union(Self::TRANSFORM)
        .union(Self::VISIBILITY)
        .union(Self::CULL_STYLE)
        .union(Self::DOUBLE_SIDED)
        .union(Self::DISPLAY_STYLE)
        .union(Self::SUBDIV_TAGS)
        .union(Self::PRIMVAR)
        .union(Self::NORMALS)
        .union(Self::INSTANCER)
        .union(Self::INSTANCE_INDEX);

    /// Bits a curves primitive needs for its first sync.
    pub const INITIAL_CURVES: Self = Self::INIT_REPR
        .union(Self::POINTS)
        .union(Self::TOPOLOGY)
        .union(Self::TRANSFORM)
        .union(Self::VISIBILITY)
        .union(Self::DISPLAY_STYLE)
        .union(Self::PRIMVAR)
        .union(Self::NORMALS)
        .union(Self::WIDTHS)
        .union(Self::INSTANCER)
        .union(Self::INSTANCE_INDEX);

    /// The bit that tracks a primvar by name.
    pub fn for_primvar(name: &str) -> Self {
        match name {
            "points" => Self::POINTS,
            "normals" => Self::NORMALS,
            "widths" => Self::WIDTHS,
            _ => Self::PRIMVAR,
        }
    }

    /// Whether the primvar called `name` must be re-pulled.
    #[inline]
    pub fn is_primvar_dirty(self, name: &str) -> bool {
        self.intersects(Self::for_primvar(name))
    }

    #[inline]
    pub fn is_any_primvar_dirty(self) -> bool {
        self.intersects(Self::ANY_PRIMVAR)
    }

    #[inline]
    pub fn is_topology_dirty(self) -> bool {
        self.contains(Self::TOPOLOGY)
    }

    /// Any instancing-related change.
    #[inline]
    pub fn is_instancing_dirty(self) -> bool {
        self.intersects(Self::INSTANCER | Self::INSTANCE_INDEX)
    }

    /// Scene bits only, without draw-item bits.
    #[inline]
    pub fn scene_bits(self) -> Self {
        self & Self::ALL_SCENE_DIRTY_BITS
    }

    /// Draw-item bits only.
    #[inline]
    pub fn custom_bits(self) -> Self {
        self - Self::ALL_SCENE_DIRTY_BITS
    }

    /// Expand scene bits into the draw-item bits they imply.
    ///
    /// A topology change dirties every index bit in `custom_in_use`. Never
    /// removes a bit, and applying it twice is the same as applying it once.
    pub fn propagate(self, custom_in_use: DirtyBits) -> Self {
        if self.is_topology_dirty() {
            self | (custom_in_use & Self::INDEX_BITS)
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_bits_not_clean() {
        assert!(!DirtyBits::INITIAL_MESH.is_empty());
        assert!(DirtyBits::INITIAL_MESH.is_topology_dirty());
        assert!(DirtyBits::INITIAL_CURVES.contains(DirtyBits::WIDTHS));
        assert!(DirtyBits::INITIAL_MESH.custom_bits().is_empty());
    }

    #[test]
    fn test_primvar_name_mapping() {
        assert!(DirtyBits::POINTS.is_primvar_dirty("points"));
        assert!(!DirtyBits::POINTS.is_primvar_dirty("displayColor"));
        assert!(DirtyBits::PRIMVAR.is_primvar_dirty("displayColor"));
        assert!(DirtyBits::WIDTHS.is_primvar_dirty("widths"));
        assert!(!DirtyBits::PRIMVAR.is_primvar_dirty("normals"));
    }

    #[test]
    fn test_propagate_topology() {
        let in_use = DirtyBits::DIRTY_HULL_INDICES;
        let bits = DirtyBits::TOPOLOGY.propagate(in_use);
        assert_eq!(bits, DirtyBits::TOPOLOGY | DirtyBits::DIRTY_HULL_INDICES);
        assert_eq!(bits.propagate(in_use), bits);
    }

    #[test]
    fn test_propagate_without_topology() {
        let bits = DirtyBits::POINTS.propagate(DirtyBits::INDEX_BITS);
        assert_eq!(bits, DirtyBits::POINTS);
    }

    #[test]
    fn test_scene_and_custom_split() {
        let bits = DirtyBits::POINTS | DirtyBits::DIRTY_INDICES;
        assert_eq!(bits.scene_bits(), DirtyBits::POINTS);
        assert_eq!(bits.custom_bits(), DirtyBits::DIRTY_INDICES);
    }
}
