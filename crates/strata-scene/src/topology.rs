//! Raw topology descriptors, exactly as authored in the scene.

/// Subdivision scheme of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubdivScheme {
    /// Polygonal mesh, never subdivided.
    None,
    Bilinear,
    #[default]
    CatmullClark,
    Loop,
}

/// Subdivision surface tags.
///
/// Creases use a compact run-length encoding: `crease_lengths[i]` vertices
/// of `crease_indices` form crease run `i`. `crease_weights` holds either one
/// weight per run or one weight per edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubdivTags {
    /// `none`, `edgeOnly` or `edgeAndCorner`. Empty means not authored.
    pub vertex_interpolation_rule: String,
    pub crease_indices: Vec<i32>,
    pub crease_lengths: Vec<i32>,
    pub crease_weights: Vec<f32>,
    pub corner_indices: Vec<i32>,
    pub corner_weights: Vec<f32>,
}

impl SubdivTags {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Polygon mesh connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshTopologyDesc {
    pub scheme: SubdivScheme,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub hole_indices: Vec<i32>,
}

impl MeshTopologyDesc {
    pub fn new(face_vertex_counts: Vec<i32>, face_vertex_indices: Vec<i32>) -> Self {
        Self {
            scheme: SubdivScheme::default(),
            face_vertex_counts,
            face_vertex_indices,
            hole_indices: Vec::new(),
        }
    }

    pub fn with_scheme(mut self, scheme: SubdivScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_holes(mut self, hole_indices: Vec<i32>) -> Self {
        self.hole_indices = hole_indices;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CurveType {
    #[default]
    Linear,
    Cubic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CurveBasis {
    #[default]
    Bezier,
    BSpline,
    CatmullRom,
    Hermite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CurveWrap {
    #[default]
    NonPeriodic,
    Periodic,
}

/// Basis curves connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurveTopologyDesc {
    pub curve_type: CurveType,
    pub basis: CurveBasis,
    pub wrap: CurveWrap,
    pub curve_vertex_counts: Vec<i32>,
    /// Optional explicit control point indices.
    pub curve_indices: Vec<i32>,
}

impl CurveTopologyDesc {
    pub fn new(curve_type: CurveType, basis: CurveBasis, curve_vertex_counts: Vec<i32>) -> Self {
        Self {
            curve_type,
            basis,
            wrap: CurveWrap::NonPeriodic,
            curve_vertex_counts,
            curve_indices: Vec::new(),
        }
    }
}
