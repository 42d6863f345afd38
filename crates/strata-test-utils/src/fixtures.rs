//! Canonical prims with known topology.

use strata_core::math::{Mat4, Vec3};
use strata_scene::{
    ComputedPrimvar, CullStyle, CurveBasis, CurveTopologyDesc, CurveType, DisplayStyle,
    Interpolation, MeshTopologyDesc, PrimId, SubdivTags, Value,
};

/// Everything a scene delegate can report about one prim.
#[derive(Debug, Clone)]
pub struct MockPrim {
    pub mesh_topology: MeshTopologyDesc,
    pub curve_topology: CurveTopologyDesc,
    pub subdiv_tags: SubdivTags,
    pub transform: Mat4,
    pub visible: bool,
    pub display_style: DisplayStyle,
    pub cull_style: CullStyle,
    pub double_sided: bool,
    /// Authored primvars in authoring order, `points` included.
    pub primvars: Vec<(String, Interpolation, Value)>,
    pub computed: Vec<ComputedPrimvar>,
    pub instancer: Option<PrimId>,
}

impl Default for MockPrim {
    fn default() -> Self {
        Self {
            mesh_topology: MeshTopologyDesc::default(),
            curve_topology: CurveTopologyDesc::default(),
            subdiv_tags: SubdivTags::default(),
            transform: Mat4::IDENTITY,
            visible: true,
            display_style: DisplayStyle::default(),
            cull_style: CullStyle::default(),
            double_sided: false,
            primvars: Vec::new(),
            computed: Vec::new(),
            instancer: None,
        }
    }
}

impl MockPrim {
    pub fn mesh(topology: MeshTopologyDesc, points: Vec<Vec3>) -> Self {
        Self {
            mesh_topology: topology,
            ..Default::default()
        }
        .with_primvar("points", Interpolation::Vertex, points)
    }

    pub fn curves(topology: CurveTopologyDesc, points: Vec<Vec3>) -> Self {
        Self {
            curve_topology: topology,
            ..Default::default()
        }
        .with_primvar("points", Interpolation::Vertex, points)
    }

    /// Author `name`, replacing any previous value of the same name.
    pub fn set_primvar(&mut self, name: &str, interpolation: Interpolation, value: Value) {
        match self.primvars.iter_mut().find(|(n, _, _)| n == name) {
            Some(entry) => {
                entry.1 = interpolation;
                entry.2 = value;
            }
            None => self.primvars.push((name.to_string(), interpolation, value)),
        }
    }

    pub fn remove_primvar(&mut self, name: &str) -> bool {
        let before = self.primvars.len();
        self.primvars.retain(|(n, _, _)| n != name);
        self.primvars.len() != before
    }

    pub fn primvar(&self, name: &str) -> Option<&Value> {
        self.primvars
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, value)| value)
    }

    pub fn with_primvar(
        mut self,
        name: &str,
        interpolation: Interpolation,
        value: impl Into<Value>,
    ) -> Self {
        self.set_primvar(name, interpolation, value.into());
        self
    }

    pub fn with_refine_level(mut self, refine_level: i32) -> Self {
        self.display_style.refine_level = refine_level;
        self
    }

    pub fn with_subdiv_tags(mut self, tags: SubdivTags) -> Self {
        self.subdiv_tags = tags;
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_cull_style(mut self, cull_style: CullStyle) -> Self {
        self.cull_style = cull_style;
        self
    }

    pub fn with_instancer(mut self, instancer: PrimId) -> Self {
        self.instancer = Some(instancer);
        self
    }
}

/// Unit quad in the XY plane, one face.
pub fn quad_topology() -> MeshTopologyDesc {
    MeshTopologyDesc::new(vec![4], vec![0, 1, 2, 3])
}

pub fn quad_points() -> Vec<Vec3> {
    vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ]
}

pub fn quad() -> MockPrim {
    MockPrim::mesh(quad_topology(), quad_points())
}

/// Unit cube with outward-facing quads.
pub fn cube_topology() -> MeshTopologyDesc {
    MeshTopologyDesc::new(
        vec![4; 6],
        vec![
            0, 3, 2, 1, // -z
            4, 5, 6, 7, // +z
            0, 1, 5, 4, // -y
            2, 3, 7, 6, // +y
            1, 2, 6, 5, // +x
            0, 4, 7, 3, // -x
        ],
    )
}

pub fn cube_points() -> Vec<Vec3> {
    vec![
        Vec3::new(-0.5, -0.5, -0.5),
        Vec3::new(0.5, -0.5, -0.5),
        Vec3::new(0.5, 0.5, -0.5),
        Vec3::new(-0.5, 0.5, -0.5),
        Vec3::new(-0.5, -0.5, 0.5),
        Vec3::new(0.5, -0.5, 0.5),
        Vec3::new(0.5, 0.5, 0.5),
        Vec3::new(-0.5, 0.5, 0.5),
    ]
}

pub fn cube() -> MockPrim {
    MockPrim::mesh(cube_topology(), cube_points())
}

/// `count` cubic Bezier curves of four control points each.
pub fn cubic_curves(count: usize) -> MockPrim {
    let topology = CurveTopologyDesc::new(CurveType::Cubic, CurveBasis::Bezier, vec![4; count]);
    let points = (0..count * 4)
        .map(|i| Vec3::new((i % 4) as f32, (i / 4) as f32, 0.0))
        .collect();
    MockPrim::curves(topology, points)
}

/// `count` two-point linear segments.
pub fn linear_curves(count: usize) -> MockPrim {
    let topology = CurveTopologyDesc::new(CurveType::Linear, CurveBasis::Bezier, vec![2; count]);
    let points = (0..count * 2)
        .map(|i| Vec3::new((i % 2) as f32, (i / 2) as f32, 0.0))
        .collect();
    MockPrim::curves(topology, points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_is_closed() {
        let topology = cube_topology();
        let total: i32 = topology.face_vertex_counts.iter().sum();
        assert_eq!(total as usize, topology.face_vertex_indices.len());
        assert_eq!(cube_points().len(), 8);
    }

    #[test]
    fn test_set_primvar_replaces() {
        let mut prim = quad();
        prim.set_primvar("points", Interpolation::Vertex, Value::from(vec![Vec3::ZERO]));
        assert_eq!(prim.primvars.len(), 1);
        assert_eq!(prim.primvar("points").map(Value::len), Some(1));
        assert!(prim.remove_primvar("points"));
        assert!(!prim.remove_primvar("points"));
    }
}
