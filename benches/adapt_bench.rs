use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use vmesh::prelude::*;

fn maxwellian(cells_per_axis: u64) -> VelocityMesh {
    let v = 3.0;
    let dv = 2.0 * v / cells_per_axis as f64;
    let mut mesh = VelocityMesh::new();
    mesh.fill([-v; 3], [v; 3], [dv; 3]).expect("valid lattice");
    for key in mesh.enumerate_ids(false) {
        let c = mesh.get_center(key).expect("stored key");
        let r2: f64 = c.iter().map(|x| x * x).sum();
        let f = (-r2 / 0.5).exp();
        mesh.set(key, [f, 0.0, 0.0, 0.0]).expect("stored key");
    }
    mesh.clip_to_threshold();
    mesh
}

fn bench_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("adapter_check");
    for &n in &[16u64, 32u64] {
        let mesh = maxwellian(n);
        let adapter = RefinementAdapter::default();
        group.bench_with_input(BenchmarkId::new("check", n), &n, |b, _| {
            b.iter(|| black_box(adapter.check(&mesh)));
        });
    }
    group.finish();
}

fn bench_adapt(c: &mut Criterion) {
    let mut group = c.benchmark_group("adapter_adapt");
    for &n in &[16u64, 32u64] {
        let base = maxwellian(n);
        group.bench_with_input(BenchmarkId::new("adapt", n), &n, |b, _| {
            b.iter(|| {
                let mut mesh = base.clone();
                let mut adapter = RefinementAdapter::default();
                black_box(adapter.adapt(&mut mesh));
            });
        });
    }
    group.finish();
}

fn bench_clip(c: &mut Criterion) {
    let base = maxwellian(32);
    c.bench_function("clip_0.1", |b| {
        b.iter(|| {
            let mut mesh = base.clone();
            black_box(mesh.clip(0.1));
        });
    });
}

fn bench_unrefine(c: &mut Criterion) {
    let mut group = c.benchmark_group("adapter_unrefine");
    for &n in &[16u64, 24u64] {
        let mut refined = VelocityMesh::new();
        let hi = n as f64;
        refined.fill([0.0; 3], [hi; 3], [1.0; 3]).expect("valid lattice");
        let roots = refined.enumerate_ids(true);
        RefinementAdapter::default().refine(&mut refined, &roots);
        let leaves = refined.enumerate_leaves(true);
        group.bench_with_input(BenchmarkId::new("all_leaves", n), &n, |b, _| {
            b.iter(|| {
                let mut mesh = refined.clone();
                let mut adapter = RefinementAdapter::default();
                black_box(adapter.unrefine(&mut mesh, &leaves));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_check,
    bench_adapt,
    bench_clip,
    bench_unrefine
);
criterion_main!(benches);
