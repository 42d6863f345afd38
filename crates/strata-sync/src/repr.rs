//! Representation configuration.
//!
//! A representation is a named, ordered list of draw-style descriptors. The
//! tables are filled once at startup and only read afterwards.

use strata_core::alloc::HashMap;

use crate::dirty::DirtyBits;
use crate::error::{SyncError, SyncResult};

/// Geometry style of a draw item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeomStyle {
    /// Descriptor slot that produces no draw item.
    #[default]
    Invalid,
    /// Control cage / control polygon.
    Hull,
    /// Refined surface or smooth curve, when the primitive supports it.
    Refined,
    /// Points only.
    Points,
}

/// One draw-style descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReprDesc {
    pub geom_style: GeomStyle,
    /// Request flat shading regardless of the primitive's display style.
    pub flat_shading: bool,
}

impl ReprDesc {
    pub const fn new(geom_style: GeomStyle) -> Self {
        Self {
            geom_style,
            flat_shading: false,
        }
    }

    pub const fn flat(mut self) -> Self {
        self.flat_shading = true;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.geom_style != GeomStyle::Invalid
    }
}

/// Name to descriptor list mapping for one primitive kind.
#[derive(Debug, Clone, Default)]
pub struct ReprTable {
    entries: HashMap<String, Vec<ReprDesc>>,
    force_refined: bool,
}

impl ReprTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table whose descriptors are all forced onto the refined path when
    /// they are configured. Used for curves when the force policy is on.
    pub fn with_forced_refinement(force_refined: bool) -> Self {
        Self {
            entries: HashMap::new(),
            force_refined,
        }
    }

    pub fn force_refined(&self) -> bool {
        self.force_refined
    }

    /// Add descriptors for `name`.
    ///
    /// A second call for the same name appends. Descriptors already present
    /// are not added again, so repeating a configuration changes nothing.
    pub fn configure(&mut self, name: impl Into<String>, descs: impl IntoIterator<Item = ReprDesc>) {
        let name = name.into();
        let force = self.force_refined;
        let list = self.entries.entry(name.clone()).or_default();
        for mut desc in descs {
            if force && desc.is_valid() {
                desc.geom_style = GeomStyle::Refined;
            }
            if !list.contains(&desc) {
                list.push(desc);
            }
        }
        tracing::debug!(repr = %name, count = list.len(), "Configured representation");
    }

    /// Ordered descriptors for `name`.
    pub fn find(&self, name: &str) -> SyncResult<&[ReprDesc]> {
        self.entries
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| SyncError::NotConfigured {
                repr: name.to_string(),
            })
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Union of the bits any valid descriptor of `name` responds to.
    pub fn dirty_bits_mask(&self, name: &str) -> SyncResult<DirtyBits> {
        let mask = self
            .find(name)?
            .iter()
            .filter(|desc| desc.is_valid())
            .fold(DirtyBits::CLEAN, |mask, _| {
                mask | DirtyBits::NORMALS
                    | DirtyBits::POINTS
                    | DirtyBits::PRIMVAR
                    | DirtyBits::DISPLAY_STYLE
                    | DirtyBits::TOPOLOGY
                    | DirtyBits::WIDTHS
            });
        Ok(mask)
    }
}
