//! Integration tests for mesh synchronization.
//!
//! Every test runs the full delegate against the in-process arena backend
//! and a recording mock scene.

use std::sync::Arc;

use strata_core::math::{Mat4, Vec3};
use strata_scene::{
    ComputedPrimvar, CullStyle, Interpolation, MeshTopologyDesc, PrimId, SubdivTags, Value,
};
use strata_sync::backend::{BoundaryMode, GeometryBackend};
use strata_sync::prelude::*;
use strata_sync::{ArenaBackend, BuildState, GeometryMode};
use strata_test_utils::{fixtures, MockSceneDelegate};

const HULL: &str = "hull";
const REFINED: &str = "refined";

fn delegate_with(config: SyncConfig) -> RenderDelegate {
    strata_core::logging::init();
    let mut delegate = RenderDelegate::new(config).expect("create delegate");
    delegate.configure_mesh_repr(HULL, [ReprDesc::new(GeomStyle::Hull)]);
    delegate.configure_mesh_repr(REFINED, [ReprDesc::new(GeomStyle::Refined)]);
    delegate
}

fn delegate() -> RenderDelegate {
    delegate_with(SyncConfig::default())
}

/// Sync once and commit, returning the bits left dirty.
fn sync(
    delegate: &RenderDelegate,
    scene: &MockSceneDelegate,
    id: &PrimId,
    bits: DirtyBits,
    repr: &str,
) -> DirtyBits {
    let remaining = delegate.sync(scene, id, bits, repr).expect("sync");
    delegate.commit().expect("commit");
    remaining
}

fn add_mesh(
    delegate: &RenderDelegate,
    scene: &MockSceneDelegate,
    path: &str,
    prim: strata_test_utils::MockPrim,
) -> (PrimId, DirtyBits) {
    let id = PrimId::new(path);
    scene.add_prim(id.clone(), prim);
    let bits = delegate.insert_mesh(id.clone());
    (id, bits)
}

// ============================================================================
// Dirty Bits
// ============================================================================

#[test]
fn test_first_sync_clears_scene_bits() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());

    assert_eq!(bits, DirtyBits::INITIAL_MESH);
    assert_eq!(delegate.initial_dirty_bits(&id).unwrap(), DirtyBits::INITIAL_MESH);

    let remaining = sync(&delegate, &scene, &id, bits, HULL);
    assert_eq!(remaining, DirtyBits::CLEAN);
    delegate
        .with_mesh(&id, |mesh| {
            assert_eq!(mesh.state(), BuildState::Built(GeometryMode::Triangulated));
            assert!(mesh.geometry().is_some());
            assert_eq!(mesh.points().len(), 4);
        })
        .unwrap();
}

#[test]
fn test_clean_sync_does_no_work() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);

    let before = delegate.backend_stats();
    let registry_before = delegate.registry().stats();
    scene.clear_calls();

    let remaining = delegate.sync(&scene, &id, DirtyBits::CLEAN, HULL).unwrap();
    assert_eq!(remaining, DirtyBits::CLEAN);

    // Nothing was pulled, uploaded or rebuilt.
    assert!(scene.calls().is_empty());
    assert_eq!(delegate.registry().pending_sources(), 0);
    assert_eq!(delegate.registry().stats(), registry_before);
    assert_eq!(delegate.backend_stats(), before);
}

#[test]
fn test_unserviced_bits_persist_in_tracker() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());

    let mut tracker = ChangeTracker::new();
    tracker.insert(id.clone(), bits);
    delegate.sync_all(&scene, &mut tracker, HULL).unwrap();
    assert!(tracker.dirty_prims().is_empty());

    tracker.mark_dirty(&id, DirtyBits::POINTS);
    assert_eq!(tracker.dirty_prims(), vec![id.clone()]);
    delegate.sync_all(&scene, &mut tracker, HULL).unwrap();
    assert_eq!(tracker.dirty_bits(&id), DirtyBits::CLEAN);
}

// ============================================================================
// Shared Resources
// ============================================================================

#[test]
fn test_identical_topologies_share_resources() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (a, bits_a) = add_mesh(&delegate, &scene, "/a", fixtures::quad());
    let (b, bits_b) = add_mesh(&delegate, &scene, "/b", fixtures::quad());
    let (c, bits_c) = add_mesh(&delegate, &scene, "/c", fixtures::cube());

    sync(&delegate, &scene, &a, bits_a, HULL);
    sync(&delegate, &scene, &b, bits_b, HULL);
    sync(&delegate, &scene, &c, bits_c, HULL);

    let topology = |id: &PrimId| delegate.with_mesh(id, |m| m.topology().cloned()).unwrap().unwrap();
    let indices = |id: &PrimId| delegate.with_mesh(id, |m| m.index_range().cloned()).unwrap().unwrap();

    assert!(Arc::ptr_eq(&topology(&a), &topology(&b)));
    assert!(Arc::ptr_eq(&indices(&a), &indices(&b)));
    assert!(!Arc::ptr_eq(&indices(&a), &indices(&c)));

    let stats = delegate.registry().stats();
    assert_eq!(stats.triangulation_builds, 2);
    assert_eq!(stats.index_range_builds, 2);
    assert_eq!(stats.hash_collisions, 0);
}

#[test]
fn test_hash_collision_builds_private_triangles() {
    use strata_sync::registry::{BufferSource, IndexVariant};
    use strata_sync::topology::MeshTopology;
    use strata_sync::ResourceKey;

    let delegate = delegate_with(SyncConfig {
        verify_topology_hashes: true,
        ..SyncConfig::default()
    });
    let scene = MockSceneDelegate::new();

    // Occupy the quad's topology id with unrelated connectivity.
    let id = MeshTopology::new(fixtures::quad_topology(), 0)
        .with_subdiv_tags(SubdivTags::default())
        .compute_hash();
    let other = MeshTopology::new(MeshTopologyDesc::new(vec![3], vec![2, 1, 0]), 0);
    let registry = delegate.registry();
    let seeded = registry.share_mesh_topology(id, other);
    assert_eq!(seeded.key, ResourceKey::Shared(id));
    let seeded_triangles = registry.triangulation(seeded.key, &seeded.topology);
    let seeded_range = registry.index_range(seeded.key, IndexVariant::Triangles, || {
        vec![BufferSource::TriangleIndices {
            triangulation: seeded_triangles.clone(),
        }]
    });

    let (quad, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &quad, bits, HULL);

    let (key, triangles, range) = delegate
        .with_mesh(&quad, |m| {
            (m.resource_key(), m.triangulation().cloned(), m.index_range().cloned())
        })
        .unwrap();
    let (triangles, range) = (triangles.unwrap(), range.unwrap());
    assert_eq!(key, Some(ResourceKey::Private));
    assert!(!Arc::ptr_eq(&triangles, &seeded_triangles));
    assert!(!Arc::ptr_eq(&range, &seeded_range));
    assert_eq!(delegate.registry().stats().hash_collisions, 1);

    // Same prim without a collision gives the reference connectivity.
    let reference = delegate_with(SyncConfig::default());
    let (reference_quad, bits) = add_mesh(&reference, &scene, "/reference", fixtures::quad());
    sync(&reference, &scene, &reference_quad, bits, HULL);
    let (expected_triangles, expected_range) = reference
        .with_mesh(&reference_quad, |m| {
            (m.triangulation().cloned().unwrap(), m.index_range().cloned().unwrap())
        })
        .unwrap();
    assert_eq!(triangles.indices, expected_triangles.indices);
    assert!(range.resource("indices").is_some());
    assert_eq!(range.resource("indices"), expected_range.resource("indices"));
    assert_ne!(range.resource("indices"), seeded_range.resource("indices"));
}

#[test]
fn test_parallel_sync_builds_each_resource_once() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let mut tracker = ChangeTracker::new();
    let ids: Vec<PrimId> = (0..32)
        .map(|i| {
            let (id, bits) = add_mesh(&delegate, &scene, &format!("/quad_{i}"), fixtures::quad());
            tracker.insert(id.clone(), bits);
            id
        })
        .collect();

    let synced = delegate.sync_all(&scene, &mut tracker, HULL).unwrap();
    assert_eq!(synced, 32);

    let stats = delegate.registry().stats();
    assert_eq!(stats.triangulation_builds, 1);
    assert_eq!(stats.index_range_builds, 1);

    let first = delegate
        .with_mesh(&ids[0], |m| m.index_range().cloned())
        .unwrap()
        .unwrap();
    for id in &ids[1..] {
        let range = delegate.with_mesh(id, |m| m.index_range().cloned()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &range));
    }
    assert!(first.has_resource("indices"));
}

// ============================================================================
// Incremental Updates
// ============================================================================

#[test]
fn test_points_edit_keeps_geometry() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);

    let geometry = delegate.with_mesh(&id, |m| m.geometry()).unwrap();
    let before = delegate.backend_stats();

    let moved: Vec<Vec3> = fixtures::quad_points().iter().map(|p| *p + Vec3::Z).collect();
    scene.set_points(&id, moved.clone());
    scene.clear_calls();
    sync(&delegate, &scene, &id, DirtyBits::POINTS, HULL);

    let after = delegate.backend_stats();
    assert_eq!(delegate.with_mesh(&id, |m| m.geometry()).unwrap(), geometry);
    assert_eq!(after.geometries_created, before.geometries_created);
    assert_eq!(after.vertex_uploads, before.vertex_uploads + 1);
    assert_eq!(scene.count_topology_pulls(), 0);
    delegate
        .with_mesh(&id, |m| assert_eq!(m.points(), moved.as_slice()))
        .unwrap();
}

#[test]
fn test_topology_edit_rebuilds_geometry() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);

    let (geometry, range) = delegate
        .with_mesh(&id, |m| (m.geometry(), m.index_range().cloned()))
        .unwrap();
    let before = delegate.backend_stats();

    scene.set_mesh_topology(&id, MeshTopologyDesc::new(vec![3, 3], vec![0, 1, 2, 0, 2, 3]));
    sync(&delegate, &scene, &id, DirtyBits::TOPOLOGY, HULL);

    let (new_geometry, new_range) = delegate
        .with_mesh(&id, |m| (m.geometry(), m.index_range().cloned()))
        .unwrap();
    assert!(new_geometry.is_some());
    assert_ne!(new_geometry, geometry);
    assert!(!Arc::ptr_eq(&range.unwrap(), &new_range.unwrap()));

    let after = delegate.backend_stats();
    assert_eq!(after.geometries_created, before.geometries_created + 1);
    assert_eq!(after.geometries_released, before.geometries_released + 1);
    assert_eq!(after.live_geometries, before.live_geometries);
}

#[test]
fn test_computed_points_override_authored() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());

    let skinned = vec![Vec3::splat(3.0); 4];
    scene.set_computed_primvars(
        &id,
        vec![ComputedPrimvar {
            name: "points".to_string(),
            interpolation: Interpolation::Vertex,
            value: Value::from(skinned.clone()),
        }],
    );
    sync(&delegate, &scene, &id, bits, HULL);

    delegate
        .with_mesh(&id, |m| assert_eq!(m.points(), skinned.as_slice()))
        .unwrap();
}

#[test]
fn test_point_count_mismatch_still_builds() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let prim = strata_test_utils::MockPrim::mesh(fixtures::cube_topology(), fixtures::quad_points());
    let (id, bits) = add_mesh(&delegate, &scene, "/short", prim);

    assert_eq!(sync(&delegate, &scene, &id, bits, HULL), DirtyBits::CLEAN);
    assert!(delegate.with_mesh(&id, |m| m.geometry()).unwrap().is_some());
}

#[test]
fn test_removed_primvar_drops_sampler() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let prim = fixtures::quad().with_primvar("height", Interpolation::Vertex, vec![0.0f32, 1.0, 2.0, 3.0]);
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", prim);
    sync(&delegate, &scene, &id, bits, HULL);

    let context = delegate.with_mesh(&id, |m| m.context().cloned()).unwrap().unwrap();
    assert!(context.samplers.read().contains("height"));

    scene.remove_primvar(&id, "height");
    sync(&delegate, &scene, &id, DirtyBits::PRIMVAR, HULL);

    assert!(!context.samplers.read().contains("height"));
    assert!(delegate.with_mesh(&id, |m| m.primvar("height").is_none()).unwrap());
}

// ============================================================================
// Smooth Normals
// ============================================================================

#[test]
fn test_smooth_normals_follow_points() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);

    let normals = delegate
        .with_mesh(&id, |m| m.smooth_normals().map(|n| n.to_vec()))
        .unwrap()
        .expect("catmull-clark mesh without authored normals is smooth");
    assert!(normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-5));

    // Tilt the quad onto the XZ plane.
    let tilted = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    scene.set_points(&id, tilted);
    sync(&delegate, &scene, &id, DirtyBits::POINTS, HULL);

    delegate
        .with_mesh(&id, |m| {
            assert!(m.adjacency_valid());
            assert!(m.normals_valid());
            let n = m.smooth_normals().unwrap();
            assert!(n.iter().all(|n| (*n + Vec3::Y).length() < 1e-5));
        })
        .unwrap();
}

#[test]
fn test_authored_normals_disable_smoothing() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let prim = fixtures::quad().with_primvar("normals", Interpolation::Vertex, vec![Vec3::X; 4]);
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", prim);
    sync(&delegate, &scene, &id, bits, HULL);

    delegate
        .with_mesh(&id, |m| assert!(m.smooth_normals().is_none()))
        .unwrap();
}

// ============================================================================
// Subdivision
// ============================================================================

#[test]
fn test_refined_repr_tessellates() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/cube", fixtures::cube().with_refine_level(2));
    sync(&delegate, &scene, &id, bits, REFINED);

    let geometry = delegate
        .with_mesh(&id, |m| {
            assert_eq!(m.state(), BuildState::Built(GeometryMode::Tessellated));
            assert!(m.index_range().is_none());
            m.geometry()
        })
        .unwrap()
        .unwrap();
    assert_eq!(delegate.backend().tessellation_rate(geometry).unwrap(), 4.0);

    // A refine change updates the rate in place.
    scene.set_refine_level(&id, 3);
    sync(&delegate, &scene, &id, DirtyBits::DISPLAY_STYLE, REFINED);
    assert_eq!(delegate.with_mesh(&id, |m| m.geometry()).unwrap(), Some(geometry));
    assert_eq!(delegate.backend().tessellation_rate(geometry).unwrap(), 8.0);

    // Dropping to level zero falls back to triangles.
    scene.set_refine_level(&id, 0);
    sync(&delegate, &scene, &id, DirtyBits::DISPLAY_STYLE, REFINED);
    delegate
        .with_mesh(&id, |m| {
            assert_eq!(m.state(), BuildState::Built(GeometryMode::Triangulated));
            assert_ne!(m.geometry(), Some(geometry));
            assert!(m.index_range().is_some());
        })
        .unwrap();
}

#[test]
fn test_polygonal_scheme_never_tessellates() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let mut prim = fixtures::cube().with_refine_level(2);
    prim.mesh_topology = prim.mesh_topology.with_scheme(strata_scene::SubdivScheme::None);
    let (id, bits) = add_mesh(&delegate, &scene, "/cube", prim);
    sync(&delegate, &scene, &id, bits, REFINED);

    delegate
        .with_mesh(&id, |m| {
            assert_eq!(m.state(), BuildState::Built(GeometryMode::Triangulated));
            assert!(m.smooth_normals().is_none());
        })
        .unwrap();
}

#[test]
fn test_crease_runs_unroll_to_edges() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let tags = SubdivTags {
        vertex_interpolation_rule: "edgeAndCorner".to_string(),
        crease_indices: vec![0, 1, 2],
        crease_lengths: vec![3],
        crease_weights: vec![2.0],
        corner_indices: vec![7],
        corner_weights: vec![1.5],
    };
    let prim = fixtures::cube().with_refine_level(1).with_subdiv_tags(tags);
    let (id, bits) = add_mesh(&delegate, &scene, "/cube", prim);
    sync(&delegate, &scene, &id, bits, REFINED);

    let geometry = delegate.with_mesh(&id, |m| m.geometry()).unwrap().unwrap();
    let backend = delegate.backend();
    let desc = backend.subdivision(geometry).unwrap();
    assert_eq!(desc.edge_creases, vec![[0, 1], [1, 2]]);
    assert_eq!(desc.edge_crease_weights, vec![2.0, 2.0]);
    assert_eq!(desc.vertex_creases, vec![7]);
    assert_eq!(desc.vertex_crease_weights, vec![1.5]);
    assert_eq!(backend.boundary_mode(geometry).unwrap(), BoundaryMode::PinCorners);
}

#[test]
fn test_tag_edit_updates_subdivision_in_place() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/cube", fixtures::cube().with_refine_level(1));
    sync(&delegate, &scene, &id, bits, REFINED);
    let geometry = delegate.with_mesh(&id, |m| m.geometry()).unwrap().unwrap();
    assert!(delegate.backend().subdivision(geometry).unwrap().edge_creases.is_empty());

    scene.set_subdiv_tags(
        &id,
        SubdivTags {
            vertex_interpolation_rule: "none".to_string(),
            crease_indices: vec![4, 5],
            crease_lengths: vec![2],
            crease_weights: vec![1.0],
            ..Default::default()
        },
    );
    sync(&delegate, &scene, &id, DirtyBits::SUBDIV_TAGS, REFINED);

    assert_eq!(delegate.with_mesh(&id, |m| m.geometry()).unwrap(), Some(geometry));
    let backend = delegate.backend();
    assert_eq!(backend.subdivision(geometry).unwrap().edge_creases, vec![[4, 5]]);
    assert_eq!(backend.boundary_mode(geometry).unwrap(), BoundaryMode::NoBoundary);
    assert!(backend.is_committed(geometry).unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unconfigured_repr_is_reported() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());

    let err = delegate.sync(&scene, &id, bits, "wireframe").unwrap_err();
    assert_eq!(
        err,
        SyncError::NotConfigured {
            repr: "wireframe".to_string()
        }
    );
    assert!(delegate.with_mesh(&id, |m| m.geometry().is_none()).unwrap());

    let missing = PrimId::new("/missing");
    assert!(matches!(
        delegate.sync(&scene, &missing, bits, HULL),
        Err(SyncError::UnknownPrim { .. })
    ));
    assert!(matches!(
        delegate.with_curves(&id, |_| ()),
        Err(SyncError::WrongPrimType { expected: "basis curves", .. })
    ));
}

#[test]
fn test_sync_all_keeps_bits_on_error() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    let mut tracker = ChangeTracker::new();
    tracker.insert(id.clone(), bits);

    assert!(delegate.sync_all(&scene, &mut tracker, "wireframe").is_err());
    assert_eq!(tracker.dirty_bits(&id), bits);
}

#[test]
fn test_backend_failure_retries_next_sync() {
    let backend = ArenaBackend::new(16).with_geometry_budget(0);
    let mut delegate = RenderDelegate::with_backend(SyncConfig::default(), backend).unwrap();
    delegate.configure_mesh_repr(HULL, [ReprDesc::new(GeomStyle::Hull)]);
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());

    let remaining = sync(&delegate, &scene, &id, bits, HULL);
    assert!(remaining.contains(DirtyBits::TOPOLOGY | DirtyBits::POINTS));
    delegate
        .with_mesh(&id, |m| {
            assert_eq!(m.state(), BuildState::Empty);
            assert!(m.geometry().is_none());
        })
        .unwrap();

    delegate.backend().set_geometry_budget(None);
    assert_eq!(sync(&delegate, &scene, &id, remaining, HULL), DirtyBits::CLEAN);
    assert!(delegate.with_mesh(&id, |m| m.geometry().is_some()).unwrap());
}

#[test]
fn test_failed_build_releases_unfinished_geometry() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);

    // A stale prototype scene makes the rebuild fail after geometry creation.
    let prototype = delegate.with_mesh(&id, |m| m.prototype_scene()).unwrap().unwrap();
    delegate.backend().release_scene(prototype).unwrap();
    let before = delegate.backend_stats();

    let remaining = delegate.sync(&scene, &id, DirtyBits::TOPOLOGY, HULL).unwrap();
    assert!(remaining.contains(DirtyBits::TOPOLOGY));
    let after = delegate.backend_stats();
    assert_eq!(after.geometries_created, before.geometries_created + 1);
    assert_eq!(after.geometries_released, before.geometries_released + 1);
    delegate
        .with_mesh(&id, |m| {
            assert_eq!(m.state(), BuildState::Empty);
            assert!(m.geometry().is_none());
        })
        .unwrap();
}

// ============================================================================
// Finalize
// ============================================================================

#[test]
fn test_finalize_releases_everything() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (quad, quad_bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    let (cube, cube_bits) = add_mesh(
        &delegate,
        &scene,
        "/cube",
        fixtures::cube().with_refine_level(1).with_transform(Mat4::from_scale(Vec3::splat(2.0))),
    );
    sync(&delegate, &scene, &quad, quad_bits, HULL);
    sync(&delegate, &scene, &cube, cube_bits, REFINED);
    assert!(delegate.backend_stats().live_geometries >= 4);

    delegate.finalize(&quad).unwrap();
    delegate.finalize(&cube).unwrap();

    let stats = delegate.backend_stats();
    assert_eq!(stats.live_geometries, 0);
    assert_eq!(stats.live_scenes, 1);
    assert_eq!(stats.geometries_created, stats.geometries_released);
    let root = delegate.root_scene();
    assert!(delegate.backend().scene_geometries(root).unwrap().is_empty());

    // Idempotent.
    delegate.finalize(&quad).unwrap();
    assert_eq!(delegate.backend_stats(), stats);
}

#[test]
fn test_finalized_mesh_rebuilds_on_full_sync() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);
    delegate.finalize(&id).unwrap();

    assert_eq!(sync(&delegate, &scene, &id, bits, HULL), DirtyBits::CLEAN);
    assert_eq!(delegate.with_mesh(&id, |m| m.instances().len()).unwrap(), 1);
}

#[test]
fn test_remove_prim() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad());
    sync(&delegate, &scene, &id, bits, HULL);

    delegate.remove_prim(&id).unwrap();
    assert!(delegate.prim_ids().is_empty());
    assert_eq!(delegate.backend_stats().live_geometries, 0);
    assert!(matches!(
        delegate.remove_prim(&id),
        Err(SyncError::UnknownPrim { .. })
    ));
}

#[test]
fn test_cull_state_reaches_hit_filter() {
    let delegate = delegate();
    let scene = MockSceneDelegate::new();
    let (id, bits) = add_mesh(&delegate, &scene, "/quad", fixtures::quad().with_cull_style(CullStyle::Back));
    sync(&delegate, &scene, &id, bits, HULL);

    let geometry = delegate.with_mesh(&id, |m| m.geometry()).unwrap().unwrap();
    assert!(!delegate.backend().accepts_hit(geometry, false).unwrap());
    assert!(delegate.backend().accepts_hit(geometry, true).unwrap());

    scene.set_double_sided(&id, true);
    scene.set_cull_style(&id, CullStyle::BackUnlessDoubleSided);
    sync(&delegate, &scene, &id, DirtyBits::CULL_STYLE | DirtyBits::DOUBLE_SIDED, HULL);
    assert!(delegate.backend().accepts_hit(geometry, false).unwrap());
}
