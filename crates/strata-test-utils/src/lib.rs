//! Test utilities for Strata.
//!
//! This crate provides testing infrastructure for the synchronization
//! engine: a recording scene delegate and a handful of canonical shapes.
//!
//! # Overview
//!
//! The main components are:
//!
//! - `MockSceneDelegate` - In-memory [`SceneDelegate`](strata_scene::SceneDelegate)
//!   that records every query (requires `mock` feature)
//! - [`fixtures`] - Quads, cubes and curves with known topology
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use strata_scene::{PrimId, SceneDelegate};
//! use strata_test_utils::{fixtures, MockSceneDelegate};
//!
//! let scene = MockSceneDelegate::new();
//! let id = PrimId::new("/World/quad");
//! scene.add_prim(id.clone(), fixtures::quad());
//!
//! // Pull data like the engine does
//! let topology = scene.mesh_topology(&id);
//! assert_eq!(topology.face_vertex_counts, vec![4]);
//!
//! // Verify what was queried
//! assert_eq!(scene.count_topology_pulls(), 1);
//! # }
//! ```
//!
//! # Design Philosophy
//!
//! ## 1. Interior Mutability
//!
//! The delegate is shared by reference with sync worker threads, so edits
//! and the call log go through `RwLock`/`Mutex` and every method takes
//! `&self`.
//!
//! ## 2. Record, Don't Assert
//!
//! The mock never fails a query. Tests inspect the recorded
//! [`DelegateCall`]s afterwards to check that clean prims pulled nothing.

pub mod fixtures;
#[cfg(feature = "mock")]
pub mod mock_scene;

pub use fixtures::MockPrim;
#[cfg(feature = "mock")]
pub use mock_scene::{DelegateCall, MockSceneDelegate};
