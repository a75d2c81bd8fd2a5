//! Benchmarks pour l'intersection habitats / emprise

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geo::{polygon, Area, MultiPolygon};
use habitat_loss::overlay::intersect;
use habitat_loss::scoring::HabitatFeature;
use habitat_loss::types::DevelopmentFeature;

/// Grille de `n` x `n` parcelles de 50 m de côté
fn habitat_grid(n: usize) -> Vec<HabitatFeature> {
    let mut features = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            let (x, y) = (col as f64 * 50.0, row as f64 * 50.0);
            let geometry = MultiPolygon::new(vec![polygon![
                (x: x, y: y),
                (x: x + 50.0, y: y),
                (x: x + 50.0, y: y + 50.0),
                (x: x, y: y + 50.0),
            ]]);
            features.push(HabitatFeature {
                id: format!("{}-{}", row, col),
                area_m2: geometry.unsigned_area(),
                geometry,
                broad_habitat: "Grassland".to_string(),
                condition: "Good".to_string(),
                distinctiveness: "High".to_string(),
                condition_score: Some(3.0),
                distinctiveness_score: Some(6.0),
                significance_score: 1.0,
                properties: BTreeMap::new(),
            });
        }
    }
    features
}

/// Emprise en losange couvrant le centre de la grille
fn development(n: usize) -> Vec<DevelopmentFeature> {
    let half = n as f64 * 25.0;
    vec![DevelopmentFeature {
        id: "0".to_string(),
        geometry: MultiPolygon::new(vec![polygon![
            (x: half, y: 0.0),
            (x: 2.0 * half, y: half),
            (x: half, y: 2.0 * half),
            (x: 0.0, y: half),
        ]]),
    }]
}

fn bench_intersect(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersect");

    for n in [10usize, 30, 60] {
        let habitats = habitat_grid(n);
        let dev = development(n);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n * n), &n, |b, _| {
            b.iter(|| {
                let result = intersect(black_box(&habitats), black_box(&dev), 2).unwrap();
                black_box(result)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_intersect);
criterion_main!(benches);
