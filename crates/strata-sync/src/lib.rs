//! Strata Sync
//!
//! Incremental synchronization of scene geometry into backend structures.
//!
//! # Overview
//!
//! Every prim carries [`DirtyBits`] saying what changed since its last sync.
//! A sync pass hands those bits to the prim, which re-pulls only the dirty
//! scene data, shares topology and index buffers with structurally
//! identical prims through the [`ResourceRegistry`], rebuilds backend
//! geometry only on structural changes, rebinds its primvar samplers and
//! reconciles its instances.
//!
//! # Quick Start
//!
//! ```ignore
//! use strata_sync::prelude::*;
//!
//! let mut delegate = RenderDelegate::new(SyncConfig::from_env())?;
//! delegate.configure_mesh_repr("smoothHull", [ReprDesc::new(GeomStyle::Refined)]);
//!
//! let mut tracker = ChangeTracker::new();
//! let id = PrimId::new("/World/mesh");
//! tracker.insert(id.clone(), delegate.insert_mesh(id.clone()));
//!
//! delegate.sync_all(&scene, &mut tracker, "smoothHull")?;
//! ```

pub mod backend;
pub mod curves;
pub mod delegate;
pub mod dirty;
pub mod error;
pub mod instance;
pub mod mesh;
pub mod primvar;
pub mod registry;
pub mod repr;
pub mod sampler;
pub mod topology;

pub use backend::{ArenaBackend, BackendError, GeometryBackend, GeometryHandle, SceneHandle};
pub use curves::BasisCurves;
pub use delegate::{Hit, Prim, RenderDelegate, ResolvedHit, SyncContext};
pub use dirty::{ChangeTracker, DirtyBits};
pub use error::{SyncError, SyncResult};
pub use mesh::{BuildState, GeometryMode, Mesh};
pub use registry::{ResourceKey, ResourceRegistry, SharedTopology};
pub use repr::{GeomStyle, ReprDesc, ReprTable};
pub use sampler::{PrimvarSampler, SampleValue, SamplerSet};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        ChangeTracker, DirtyBits, GeomStyle, Hit, RenderDelegate, ReprDesc, SampleValue,
        SyncError, SyncResult,
    };
    pub use strata_core::config::SyncConfig;
    pub use strata_scene::{PrimId, SceneDelegate};
}
