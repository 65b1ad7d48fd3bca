use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowc::value::{ElementType, HostData, UnaryOperation};
use flowc::{FullyConnectedNode, InputNode, Map, MapCompiler, Model};

/// A stack of `layers` dense layers of width `width`.
fn dense_stack(width: usize, layers: usize) -> Map {
    let mut model = Model::new();
    let x = model.add_node(InputNode::new(ElementType::Float, width)).unwrap();
    let mut port = model.output(x, 0).unwrap();
    for layer in 0..layers {
        let weights: Vec<f32> = (0..width * width)
            .map(|i| ((i + layer) % 7) as f32 * 0.1 - 0.3)
            .collect();
        let dense = model
            .add_node(
                FullyConnectedNode::new(port, weights, vec![0.01f32; width], width, width)
                    .with_activation(UnaryOperation::Relu),
            )
            .unwrap();
        port = model.output(dense, 0).unwrap();
    }
    Map::new(model, &[("x", x)], &[("y", port)]).unwrap()
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_stack");
    for &(width, layers) in &[(8, 2), (32, 4), (64, 8)] {
        let label = format!("{}x{}", width, layers);
        let input = vec![HostData::from(vec![0.5f32; width])];

        let mut map = dense_stack(width, layers);
        group.bench_with_input(BenchmarkId::new("interpreted", &label), &input, |b, input| {
            b.iter(|| black_box(map.compute(black_box(input)).unwrap()))
        });

        let mut compiled = MapCompiler::default()
            .compile(&dense_stack(width, layers), "bench")
            .unwrap();
        group.bench_with_input(BenchmarkId::new("compiled", &label), &input, |b, input| {
            b.iter(|| black_box(compiled.compute(black_box(input)).unwrap()))
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let map = dense_stack(32, 4);
    c.bench_function("compile_dense_32x4", |b| {
        b.iter(|| MapCompiler::default().compile(black_box(&map), "bench").unwrap())
    });
}

criterion_group!(benches, bench_compute, bench_compile);
criterion_main!(benches);
