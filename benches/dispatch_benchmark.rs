//=========================================================================
// Dispatch Benchmark
//=========================================================================
//
// Measures cached per-frame dispatch and index lookups.
//
// Run with: `cargo bench --bench dispatch_benchmark`
//
//=========================================================================

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use aetheric_nodes::core::connector::EntityConnector;
use aetheric_nodes::core::node::{Capabilities, Node};
use aetheric_nodes::core::scene::{SceneBuilder, SceneOrchestrator};

struct Spinner {
    angle: f32,
}

impl Node for Spinner {
    fn capabilities(&self) -> Capabilities {
        Capabilities::TICK
    }

    fn tick(&mut self, dt: f32) {
        self.angle += dt * 90.0;
    }
}

/// Only implements `init`; never part of the tick cache.
struct Inert;

impl Node for Inert {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INIT
    }
}

fn scene(connectors: usize) -> SceneOrchestrator {
    let statics = (0..connectors).map(|i| {
        EntityConnector::builder(format!("entity_{i}"))
            .tag(if i % 2 == 0 { "Even" } else { "Odd" })
            .node(Spinner { angle: 0.0 })
            .node(Inert)
            .build()
    });

    let scene = SceneBuilder::new("Bench").with_statics(statics).build();
    scene.execute(None);
    scene
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_tick");

    for count in [100, 1_000, 10_000] {
        let scene = scene(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| scene.tick(black_box(1.0 / 60.0)));
        });
    }

    group.finish();
}

fn bench_index_lookup(c: &mut Criterion) {
    let scene = scene(1_000);
    let index = scene.index();

    c.bench_function("index_by_id", |b| {
        b.iter(|| black_box(index.try_get_by_id(black_box(500))));
    });

    c.bench_function("index_first_by_tag", |b| {
        b.iter(|| black_box(index.try_get_first_by_tag(black_box("Odd"))));
    });

    c.bench_function("index_first_node", |b| {
        b.iter(|| black_box(index.try_get_first_node::<Spinner>(true)));
    });
}

criterion_group!(benches, bench_tick, bench_index_lookup);
criterion_main!(benches);
