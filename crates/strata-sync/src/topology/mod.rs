//! Immutable, content-hashed topology values and the computations derived
//! from them.
//!
//! Topology is shared between primitives through the resource registry, so
//! nothing here ever mutates a topology in place. Per-primitive overrides
//! such as the refine level produce a new value.

mod adjacency;
mod curves;
mod mesh;

use std::fmt;
use std::hash::Hasher;

pub use adjacency::Adjacency;
pub use curves::{CurveIndices, CurveTopology};
pub use mesh::{MeshTopology, Triangulation};

/// Structural hash identifying a topology in the resource registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopologyId(pub u64);

impl TopologyId {
    /// Fold a flag into the id, for variants of the same topology.
    pub fn combine(self, flag: bool) -> Self {
        let mut hasher = fxhash::FxHasher64::default();
        hasher.write_u64(self.0);
        hasher.write_u8(flag as u8);
        TopologyId(hasher.finish())
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn hash_i32s(hasher: &mut impl Hasher, values: &[i32]) {
    hasher.write_usize(values.len());
    for v in values {
        hasher.write_i32(*v);
    }
}

fn hash_f32s(hasher: &mut impl Hasher, values: &[f32]) {
    hasher.write_usize(values.len());
    for v in values {
        hasher.write_u32(v.to_bits());
    }
}
