use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use glam::DVec3;
use objgrasp::{analyze, curvature::compute_profile, synthetic, AnalysisConfig};

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    group.sample_size(10);

    let config = AnalysisConfig::default().with_seed(0);
    let table = synthetic::table_patch(DVec3::new(0.0, 0.15, 0.5), DVec3::NEG_Y, 0.4, 3000, 5);

    let objects = [
        (
            "cylinder",
            synthetic::cylinder(DVec3::new(0.0, 0.1, 0.5), DVec3::NEG_Y, 0.03, 0.1, 1500, 1),
        ),
        (
            "box",
            synthetic::cuboid(DVec3::new(0.0, 0.13, 0.5), [0.06, 0.04, 0.08], 1500, 2),
        ),
        (
            "sphere",
            synthetic::sphere(DVec3::new(0.0, 0.115, 0.5), 0.035, 1200, 3),
        ),
    ];

    for (name, object) in objects.iter() {
        let normals = object.normals().unwrap_or_default();
        let scene = [table.points(), object.points()].concat();

        group.bench_with_input(BenchmarkId::new("on_table", name), &scene, |b, scene| {
            b.iter(|| black_box(analyze(object.points(), normals, scene, &config)))
        });
    }

    group.finish();
}

fn bench_curvature(c: &mut Criterion) {
    let mut group = c.benchmark_group("curvature");

    let config = AnalysisConfig::default();
    for num_points in [500, 1500, 5000] {
        let object = synthetic::cylinder(
            DVec3::new(0.0, 0.1, 0.5),
            DVec3::NEG_Y,
            0.03,
            0.1,
            num_points,
            1,
        );
        let normals = object.normals().unwrap_or_default();

        group.bench_with_input(
            BenchmarkId::new("compute_profile", num_points),
            &num_points,
            |b, _| b.iter(|| black_box(compute_profile(object.points(), normals, &config.curvature))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_analyze, bench_curvature);
criterion_main!(benches);
