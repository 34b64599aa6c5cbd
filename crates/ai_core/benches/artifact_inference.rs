use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use makanmate_ai_core::{
    named_inputs, Activation, CalibrationSummary, ChannelAffine, HeadLayer, InferenceArtifact,
    QuantizedDense, QuantizedEmbedding, QuantizedGraph, TowerGraph, ITEM_FEATURE_DIM,
    USER_FEATURE_DIM,
};

const NUM_USERS: usize = 1000;
const NUM_ITEMS: usize = 500;
const EMBEDDING_DIM: usize = 64;
const PROJECTION_DIM: usize = 32;

fn dense(name: &str, inputs: usize, outputs: usize, activation: Activation) -> QuantizedDense {
    let weights: Vec<f32> = (0..inputs * outputs)
        .map(|i| ((i % 13) as f32 - 6.0) * 0.01)
        .collect();
    let bias = vec![0.0; outputs];
    QuantizedDense::from_float(name, &weights, &bias, inputs, outputs, (-4.0, 4.0), activation)
        .expect("bench layer")
}

fn tower(name: &str, rows: usize, features: usize) -> TowerGraph {
    let table: Vec<f32> = (0..rows * EMBEDDING_DIM)
        .map(|i| ((i % 17) as f32 - 8.0) * 0.005)
        .collect();
    TowerGraph {
        embedding: QuantizedEmbedding::from_float(name, &table, rows, EMBEDDING_DIM)
            .expect("bench embedding"),
        projection: dense(name, features, PROJECTION_DIM, Activation::Relu),
        normalization: ChannelAffine {
            scale: vec![1.0; PROJECTION_DIM],
            shift: vec![0.0; PROJECTION_DIM],
        },
    }
}

fn production_shaped_artifact() -> InferenceArtifact {
    let concat = 2 * (EMBEDDING_DIM + PROJECTION_DIM);
    let graph = QuantizedGraph {
        user_tower: tower("user_embedding", NUM_USERS, USER_FEATURE_DIM),
        item_tower: tower("item_embedding", NUM_ITEMS, ITEM_FEATURE_DIM),
        hidden: vec![
            HeadLayer {
                dense: dense("dense_1", concat, 128, Activation::Relu),
                normalization: None,
            },
            HeadLayer {
                dense: dense("dense_2", 128, 64, Activation::Relu),
                normalization: None,
            },
            HeadLayer {
                dense: dense("dense_3", 64, 32, Activation::Relu),
                normalization: None,
            },
        ],
        output: dense("rating_output", 32, 1, Activation::Sigmoid),
        rating_scale: 4.0,
        rating_offset: 1.0,
    };
    let calibration = CalibrationSummary {
        samples: 0,
        seed: 0,
        reference_samples: 0,
        feature_min: -3.0,
        feature_max: 3.0,
    };
    InferenceArtifact::new(graph, calibration).expect("bench artifact")
}

fn bench_single_prediction(c: &mut Criterion) {
    let artifact = production_shaped_artifact();
    let inputs = named_inputs(42, 7, &[0.3; USER_FEATURE_DIM], &[-0.2; ITEM_FEATURE_DIM]);

    c.bench_function("artifact_predict_single", |b| {
        b.iter(|| {
            let prediction = artifact.predict(black_box(&inputs));
            black_box(prediction).ok();
        });
    });
}

fn bench_item_sweep(c: &mut Criterion) {
    let artifact = production_shaped_artifact();
    let user_features = [0.1f32; USER_FEATURE_DIM];
    let item_features = [0.5f32; ITEM_FEATURE_DIM];

    let mut group = c.benchmark_group("artifact_item_sweep");
    group.throughput(Throughput::Elements(NUM_ITEMS as u64));
    group.bench_function("score_all_items", |b| {
        b.iter(|| {
            for item in 0..NUM_ITEMS as i32 {
                let inputs = named_inputs(3, item, &user_features, &item_features);
                black_box(artifact.predict(&inputs)).ok();
            }
        });
    });
    group.finish();
}

criterion_group!(artifact_benches, bench_single_prediction, bench_item_sweep);
criterion_main!(artifact_benches);
