use box_packer_core::prelude::*;
use box_packer_core::{BranchBoundPacker, ExactPacker, NfdhPacker, PhysicsPacker};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn generate_task(count: u32, min_side: f64, max_side: f64) -> PackingTask {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let objects = (1..=count)
        .map(|id| {
            let w = rng.gen_range(min_side..=max_side).round();
            let h = rng.gen_range(min_side..=max_side).round();
            PackInputObject::new(id, w, h)
        })
        .collect();
    PackingTask::new(PackingContainer::new(1000.0, 1000.0, 10.0), objects)
}

fn bench_nfdh(c: &mut Criterion) {
    let mut group = c.benchmark_group("nfdh");
    for count in [50u32, 200, 1000] {
        let task = generate_task(count, 10.0, 80.0);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &task, |b, task| {
            let packer = NfdhPacker::new(true);
            b.iter(|| black_box(packer.pack(task, &CancelToken::new())))
        });
    }
    group.finish();
}

fn bench_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact");
    group.sample_size(10);
    for count in [3u32, 5, 7] {
        let task = generate_task(count, 100.0, 300.0);
        let cfg = ExactConfig {
            time_limit_ms: 2_000,
            ..ExactConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(count), &task, |b, task| {
            let packer = ExactPacker::new(cfg.clone(), true);
            b.iter(|| black_box(packer.pack(task, &CancelToken::new())))
        });
    }
    group.finish();
}

fn bench_branch_bound(c: &mut Criterion) {
    let mut group = c.benchmark_group("branch_bound");
    group.sample_size(10);
    for count in [4u32, 8, 12] {
        let task = generate_task(count, 100.0, 300.0);
        let cfg = BranchBoundConfig {
            grid_step: 20.0,
            time_limit_ms: 2_000,
        };
        group.bench_with_input(BenchmarkId::from_parameter(count), &task, |b, task| {
            let packer = BranchBoundPacker::new(cfg.clone(), true);
            b.iter(|| black_box(packer.pack(task, &CancelToken::new())))
        });
    }
    group.finish();
}

fn bench_physics(c: &mut Criterion) {
    let mut group = c.benchmark_group("physics");
    group.sample_size(10);
    for count in [10u32, 40] {
        let task = generate_task(count, 40.0, 160.0);
        let physics = PhysicsConfig {
            seed: Some(1),
            shake_duration: 1.0,
            raster_cell_size: 2.0,
            ..PhysicsConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(count), &task, |b, task| {
            let packer = PhysicsPacker::new(physics.clone(), true);
            b.iter(|| black_box(packer.pack(task, &CancelToken::new())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_nfdh, bench_exact, bench_branch_bound, bench_physics);
criterion_main!(benches);
