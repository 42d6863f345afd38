//! Benchmarks for topology processing and full sync passes.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use strata_core::math::Vec3;
use strata_scene::{MeshTopologyDesc, PrimId};
use strata_sync::prelude::*;
use strata_sync::topology::{Adjacency, MeshTopology};
use strata_test_utils::{MockPrim, MockSceneDelegate};

/// `n` x `n` grid of quads.
fn grid(n: usize) -> (MeshTopologyDesc, Vec<Vec3>) {
    let row = n + 1;
    let mut indices = Vec::with_capacity(n * n * 4);
    for y in 0..n {
        for x in 0..n {
            let i = (y * row + x) as i32;
            let r = row as i32;
            indices.extend_from_slice(&[i, i + 1, i + r + 1, i + r]);
        }
    }
    let points = (0..row * row)
        .map(|i| Vec3::new((i % row) as f32, (i / row) as f32, 0.0))
        .collect();
    (MeshTopologyDesc::new(vec![4; n * n], indices), points)
}

fn bench_triangulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangulate");

    for n in [16, 64, 256] {
        let (desc, _) = grid(n);
        let topology = MeshTopology::new(desc, 0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n * n), &topology, |b, topology| {
            b.iter(|| black_box(topology.triangulate()));
        });
    }

    group.finish();
}

fn bench_smooth_normals(c: &mut Criterion) {
    let mut group = c.benchmark_group("smooth_normals");

    for n in [16, 64, 256] {
        let (desc, points) = grid(n);
        let topology = MeshTopology::new(desc, 0);
        let adjacency = Adjacency::build(&topology);
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(points.len()), &points, |b, points| {
            b.iter(|| black_box(adjacency.compute_smooth_normals(&topology, points)));
        });
    }

    group.finish();
}

fn setup(prims: usize, n: usize) -> (RenderDelegate, MockSceneDelegate, ChangeTracker) {
    let mut delegate = RenderDelegate::new(SyncConfig::default()).expect("create delegate");
    delegate.configure_mesh_repr("hull", [ReprDesc::new(GeomStyle::Hull)]);
    let scene = MockSceneDelegate::new();
    let mut tracker = ChangeTracker::new();
    let (desc, points) = grid(n);
    for i in 0..prims {
        let id = PrimId::new(format!("/World/grid_{i}"));
        scene.add_prim(id.clone(), MockPrim::mesh(desc.clone(), points.clone()));
        tracker.insert(id.clone(), delegate.insert_mesh(id));
    }
    (delegate, scene, tracker)
}

fn bench_initial_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_sync");
    group.sample_size(20);

    for prims in [16, 128] {
        group.throughput(Throughput::Elements(prims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(prims), &prims, |b, &prims| {
            b.iter_with_setup(
                || setup(prims, 32),
                |(delegate, scene, mut tracker)| {
                    delegate
                        .sync_all(&scene, &mut tracker, "hull")
                        .expect("sync");
                    delegate
                },
            );
        });
    }

    group.finish();
}

fn bench_points_resync(c: &mut Criterion) {
    let mut group = c.benchmark_group("points_resync");

    for prims in [16, 128] {
        let (delegate, scene, mut tracker) = setup(prims, 32);
        delegate.sync_all(&scene, &mut tracker, "hull").expect("sync");
        let ids = delegate.prim_ids();

        group.throughput(Throughput::Elements(prims as u64));
        group.bench_function(BenchmarkId::from_parameter(prims), |b| {
            b.iter(|| {
                for id in &ids {
                    tracker.mark_dirty(id, DirtyBits::POINTS);
                }
                delegate.sync_all(&scene, &mut tracker, "hull").expect("sync")
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_triangulate,
    bench_smooth_normals,
    bench_initial_sync,
    bench_points_resync
);
criterion_main!(benches);
