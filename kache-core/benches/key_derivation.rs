use criterion::{criterion_group, criterion_main, Criterion};
use kache_core::{derive_key, CallArgs, KeyStrategy, ParameterSet, Signature};
use serde_json::json;
use std::hint::black_box;

fn wide_params(width: usize) -> ParameterSet {
    (0..width)
        .map(|i| (format!("param_{i:03}"), json!({ "index": i, "label": "value" })))
        .collect()
}

fn bench_key_strategies(c: &mut Criterion) {
    let params = wide_params(16);

    c.bench_function("key/canonical_16", |b| {
        b.iter(|| {
            let key = derive_key("bench", black_box(&params), &KeyStrategy::Canonical)
                .expect("derive key");
            black_box(key);
        })
    });

    c.bench_function("key/digest_16", |b| {
        b.iter(|| {
            let key = derive_key("bench", black_box(&params), &KeyStrategy::Digest)
                .expect("derive key");
            black_box(key);
        })
    });
}

fn bench_bind_and_derive(c: &mut Criterion) {
    let signature = Signature::new()
        .param("a")
        .param_with_default("b", 2)
        .param_with_default("c", "label");
    let args = CallArgs::new().arg(1).kwarg("c", "other");

    c.bench_function("key/bind_then_canonical", |b| {
        b.iter(|| {
            let params = signature.bind(black_box(&args)).expect("bind args");
            let key = derive_key("f", &params, &KeyStrategy::Canonical).expect("derive key");
            black_box(key);
        })
    });
}

criterion_group!(benches, bench_key_strategies, bench_bind_and_derive);
criterion_main!(benches);
