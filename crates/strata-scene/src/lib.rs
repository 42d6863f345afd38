//! Scene-side data model for Strata.
//!
//! This crate defines what the synchronization engine consumes from the
//! scene: prim identifiers, typed attribute values, raw topology
//! descriptors, display state, and the [`SceneDelegate`] trait through which
//! all of it is pulled.

pub mod delegate;
pub mod prim;
pub mod style;
pub mod topology;
pub mod value;

pub use delegate::{ComputedPrimvar, PrimvarDescriptor, SceneDelegate};
pub use prim::PrimId;
pub use style::{CullStyle, DisplayStyle};
pub use topology::{
    CurveBasis, CurveTopologyDesc, CurveType, CurveWrap, MeshTopologyDesc, SubdivScheme,
    SubdivTags,
};
pub use value::{Interpolation, Value, ValueType};
