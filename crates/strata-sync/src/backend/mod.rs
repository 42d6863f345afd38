//! Geometry backend contract.
//!
//! The engine never talks to a ray tracer or GPU directly. Everything it
//! creates goes through [`GeometryBackend`], an object-safe trait whose
//! objects are addressed by generation-checked handles, so a released
//! handle can never silently reach a reused object.

mod arena;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use strata_core::alloc::IndexSlot;
use strata_core::math::{Aabb, Mat4, Vec3};

pub use arena::ArenaBackend;

/// Handle to a backend scene (a top-level or prototype container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneHandle(pub(crate) IndexSlot);

/// Handle to a backend geometry (triangles, subdivision surface or instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryHandle(pub(crate) IndexSlot);

impl fmt::Display for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}v{}", self.0.index(), self.0.generation())
    }
}

impl fmt::Display for GeometryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geom#{}v{}", self.0.index(), self.0.generation())
    }
}

/// Kind of geometry object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Triangles,
    Subdivision,
    /// Reference to another scene with its own transform.
    Instance,
}

/// How subdivision treats boundary edges and corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundaryMode {
    NoBoundary,
    #[default]
    SmoothBoundary,
    PinCorners,
}

/// Subdivision surface buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubdivisionDesc {
    pub face_vertex_counts: Vec<u32>,
    pub face_vertex_indices: Vec<u32>,
    pub holes: Vec<u32>,
    /// One `(v0, v1)` pair per creased edge.
    pub edge_creases: Vec<[u32; 2]>,
    pub edge_crease_weights: Vec<f32>,
    pub vertex_creases: Vec<u32>,
    pub vertex_crease_weights: Vec<f32>,
}

/// Opaque per-object payload, used to map hits back to prims.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Decides whether a hit on a geometry is kept. Receives the front-facing
/// flag of the hit.
pub type HitFilter = Arc<dyn Fn(bool) -> bool + Send + Sync>;

/// Counters for auditing backend object lifetimes in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub scenes_created: usize,
    pub scenes_released: usize,
    pub geometries_created: usize,
    pub geometries_released: usize,
    pub vertex_uploads: usize,
    pub index_uploads: usize,
    pub geometry_commits: usize,
    pub scene_commits: usize,
    pub live_scenes: usize,
    pub live_geometries: usize,
}

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The handle never belonged to this backend.
    InvalidHandle,
    /// The handle's object has been released.
    StaleHandle,
    /// The operation does not apply to this kind of object.
    WrongKind {
        /// What the operation needed.
        expected: &'static str,
    },
    /// Interpolation or attribute slot outside the backend's range.
    SlotOutOfRange { slot: u32 },
    /// Geometry element (face, triangle) outside the geometry.
    ElementOutOfRange { element: u32 },
    /// The backend could not create an object.
    CreationFailed(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::InvalidHandle => write!(f, "Invalid backend handle"),
            BackendError::StaleHandle => write!(f, "Backend handle used after release"),
            BackendError::WrongKind { expected } => {
                write!(f, "Backend object is not a {}", expected)
            }
            BackendError::SlotOutOfRange { slot } => {
                write!(f, "Vertex attribute slot {} out of range", slot)
            }
            BackendError::ElementOutOfRange { element } => {
                write!(f, "Element {} out of range", element)
            }
            BackendError::CreationFailed(msg) => write!(f, "Backend creation failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

pub type BackendResult<T> = Result<T, BackendError>;

/// Narrow build contract of a ray-tracing or display backend.
///
/// Structural edits (attach, detach, commit) need exclusive access to the
/// affected scene; callers serialize them by holding `&mut` to the backend.
pub trait GeometryBackend: Send {
    fn create_scene(&mut self) -> BackendResult<SceneHandle>;
    fn release_scene(&mut self, scene: SceneHandle) -> BackendResult<()>;

    fn create_geometry(&mut self, kind: GeometryKind) -> BackendResult<GeometryHandle>;
    fn release_geometry(&mut self, geometry: GeometryHandle) -> BackendResult<()>;

    fn attach(&mut self, scene: SceneHandle, geometry: GeometryHandle) -> BackendResult<()>;
    fn detach(&mut self, scene: SceneHandle, geometry: GeometryHandle) -> BackendResult<()>;

    fn set_vertices(&mut self, geometry: GeometryHandle, points: &[Vec3]) -> BackendResult<()>;
    fn set_triangles(&mut self, geometry: GeometryHandle, indices: &[[u32; 3]]) -> BackendResult<()>;
    fn set_subdivision(&mut self, geometry: GeometryHandle, desc: &SubdivisionDesc) -> BackendResult<()>;
    fn set_boundary_mode(&mut self, geometry: GeometryHandle, mode: BoundaryMode) -> BackendResult<()>;
    fn set_tessellation_rate(&mut self, geometry: GeometryHandle, rate: f32) -> BackendResult<()>;

    /// Bind `data` (`components` floats per vertex) to attribute `slot`.
    fn set_vertex_attribute(
        &mut self,
        geometry: GeometryHandle,
        slot: u32,
        components: usize,
        data: &[f32],
    ) -> BackendResult<()>;
    fn clear_vertex_attribute(&mut self, geometry: GeometryHandle, slot: u32) -> BackendResult<()>;

    /// Evaluate attribute `slot` at `(element, u, v)` into `out`.
    fn interpolate(
        &self,
        geometry: GeometryHandle,
        slot: u32,
        element: u32,
        u: f32,
        v: f32,
        out: &mut [f32],
    ) -> BackendResult<()>;

    fn max_vertex_attribute_slots(&self) -> u16;

    fn set_enabled(&mut self, geometry: GeometryHandle, enabled: bool) -> BackendResult<()>;
    fn is_enabled(&self, geometry: GeometryHandle) -> BackendResult<bool>;

    fn set_user_data(&mut self, geometry: GeometryHandle, data: Option<UserData>) -> BackendResult<()>;
    fn user_data(&self, geometry: GeometryHandle) -> BackendResult<Option<UserData>>;

    fn set_hit_filter(&mut self, geometry: GeometryHandle, filter: Option<HitFilter>) -> BackendResult<()>;
    /// Run the geometry's hit filter; geometry without one accepts all hits.
    fn accepts_hit(&self, geometry: GeometryHandle, front_facing: bool) -> BackendResult<bool>;

    /// Point an instance geometry at the scene it replicates.
    fn set_instanced_scene(&mut self, instance: GeometryHandle, scene: SceneHandle) -> BackendResult<()>;
    fn set_transform(&mut self, instance: GeometryHandle, transform: Mat4) -> BackendResult<()>;

    fn commit_geometry(&mut self, geometry: GeometryHandle) -> BackendResult<()>;
    /// Rebuild the scene's acceleration structure. Required before the scene
    /// is queried.
    fn commit_scene(&mut self, scene: SceneHandle) -> BackendResult<()>;
    /// Bounds as of the last commit.
    fn scene_bounds(&self, scene: SceneHandle) -> BackendResult<Aabb>;

    fn stats(&self) -> BackendStats;
}
