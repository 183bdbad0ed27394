use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{arr0, ArrayD};
use rand::prelude::*;

use onnx_calibrate::calibration::CollectedOutputs;
use onnx_calibrate::{
    GraphBuilder, OnnxModel, QuantParamCalculator, QuantizationThresholds, RangeAggregator,
    RangeObserver,
};

const NO_NODES: [&str; 0] = [];

/// Chain of Conv blocks followed by a Relu, or by a [0, 6] Clip every third block
fn build_chain_model(blocks: usize) -> OnnxModel {
    let mut builder = GraphBuilder::new("chain").input("t0", &[-1, 16]);

    for i in 0..blocks {
        let input = format!("t{}", 2 * i);
        let hidden = format!("h{}", i);
        let output = format!("t{}", 2 * i + 2);
        let weight = format!("w{}", i);

        builder = builder
            .initializer(&weight, &[16], &[0.1; 16])
            .node("Conv", &format!("conv_{}", i), &[input.as_str(), weight.as_str()], &[hidden.as_str()]);

        builder = if i % 3 == 0 {
            builder.clip(&format!("clip_{}", i), &hidden, &output, 0.0, 6.0)
        } else {
            builder.node("Relu", &format!("relu_{}", i), &[hidden.as_str()], &[output.as_str()])
        };
    }

    builder.output(&format!("t{}", 2 * blocks), &[-1, 16]).build_model()
}

fn random_thresholds(model: &OnnxModel, rng: &mut StdRng) -> QuantizationThresholds {
    RangeObserver::new(["Conv"], NO_NODES, NO_NODES)
        .calibration_targets(&model.graph)
        .into_iter()
        .map(|t| {
            let min = rng.gen_range(-10.0f32..0.0);
            let max = rng.gen_range(0.0f32..10.0);
            (t, (min, max))
        })
        .collect()
}

fn random_outputs(model: &OnnxModel, batches: usize, rng: &mut StdRng) -> CollectedOutputs {
    let augmented = RangeObserver::new(["Conv"], NO_NODES, NO_NODES)
        .augment(model)
        .unwrap();
    let output_names: Vec<String> = augmented.graph.outputs.iter().map(|o| o.name.clone()).collect();

    let batches = (0..batches)
        .map(|_| {
            output_names.iter()
                .enumerate()
                .map(|(k, _)| -> ArrayD<f32> {
                    let v = rng.gen_range(-10.0f32..10.0);
                    // original output first, then alternating (min, max) probes
                    if k % 2 == 0 { arr0(v.abs()).into_dyn() } else { arr0(-v.abs()).into_dyn() }
                })
                .collect()
        })
        .collect();

    CollectedOutputs { output_names, batches }
}

fn bench_augment(c: &mut Criterion) {
    let mut group = c.benchmark_group("augment");

    for blocks in [16, 128, 512] {
        let model = build_chain_model(blocks);
        let observer = RangeObserver::new(["Conv", "MatMul"], NO_NODES, NO_NODES);

        group.bench_with_input(BenchmarkId::from_parameter(blocks), &model, |b, model| {
            b.iter(|| observer.augment(black_box(model)).unwrap())
        });
    }

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let mut rng = StdRng::seed_from_u64(7);
    let model = build_chain_model(128);

    for batches in [1, 16, 64] {
        let collected = random_outputs(&model, batches, &mut rng);
        let aggregator = RangeAggregator::default();

        group.bench_with_input(BenchmarkId::from_parameter(batches), &collected, |b, collected| {
            b.iter(|| aggregator.aggregate(black_box(collected), 1).unwrap())
        });
    }

    group.finish();
}

fn bench_compute_params(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_params");
    let mut rng = StdRng::seed_from_u64(42);

    for blocks in [16, 128, 512] {
        let model = build_chain_model(blocks);
        let thresholds = random_thresholds(&model, &mut rng);
        let calculator = QuantParamCalculator::new();

        group.bench_with_input(BenchmarkId::from_parameter(blocks), &thresholds, |b, thresholds| {
            b.iter(|| calculator.compute(&model.graph, Some(black_box(thresholds))).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_augment, bench_aggregate, bench_compute_params);
criterion_main!(benches);
