use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ds_core::{Column, Factor, Frame};
use ds_inference::policy::{FOLD_COL, PTRT_COL, RESP_CTL_COL, RESP_TRT_COL};
use ds_inference::{
    EstimateOptions, LogisticFitter, Policy, SensitivityParams, estimate, expand_parameter,
    sensitize,
};
use ds_prob::sigmoid;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::Arc;

fn make_policy(n: usize, seed: u64) -> Policy {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let groups = ["asian", "black", "hispanic", "white"];
    let mut group = Vec::with_capacity(n);
    let mut treat = Vec::with_capacity(n);
    let (mut ptrt, mut r0, mut r1) = (Vec::new(), Vec::new(), Vec::new());
    for i in 0..n {
        let g = i % groups.len();
        let x: f64 = rng.random_range(-2.0..2.0);
        let p = sigmoid(-0.5 + 0.3 * g as f64 + 0.5 * x);
        group.push(groups[g]);
        treat.push(if rng.random::<f64>() < p { 1.0 } else { 0.0 });
        ptrt.push(p);
        r0.push(sigmoid(-1.0 + 0.8 * x));
        r1.push(sigmoid(-0.4 + 0.8 * x));
    }
    let data = Frame::from_columns(vec![
        ("race".into(), Column::Factor(Factor::from_labels(&group))),
        ("frisked".into(), Column::Numeric(treat)),
        (FOLD_COL.into(), Column::Text(vec!["test".to_string(); n])),
        (PTRT_COL.into(), Column::Numeric(ptrt)),
        (RESP_CTL_COL.into(), Column::Numeric(r0)),
        (RESP_TRT_COL.into(), Column::Numeric(r1)),
    ])
    .unwrap();
    Policy::new("race", "frisked", data, Arc::new(LogisticFitter::default()))
}

fn bench_sensitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sensitize");
    for &n in &[1_000usize, 10_000] {
        let policy = make_policy(n, 1);
        let params = SensitivityParams::new(0.3, vec![0.5, 1.0, 1.5, 0.0], 0.8, 0.4)
            .expand(policy.data.require("race").unwrap())
            .unwrap();
        let ptrt = policy.data.numeric(PTRT_COL).unwrap().to_vec();
        let r0 = policy.data.numeric(RESP_CTL_COL).unwrap().to_vec();
        let r1 = policy.data.numeric(RESP_TRT_COL).unwrap().to_vec();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(sensitize(&ptrt, &r0, &r1, black_box(&params))).unwrap())
        });
    }
    group.finish();
}

fn bench_expand(c: &mut Criterion) {
    let policy = make_policy(10_000, 2);
    let race = policy.data.require("race").unwrap();
    c.bench_function("expand_parameter_levels", |b| {
        b.iter(|| black_box(expand_parameter(race, black_box(&[0.1, 0.2, 0.3, 0.4]))).unwrap())
    });
}

fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate");
    group.sample_size(20);
    for &n in &[500usize, 5_000] {
        let policy = make_policy(n, 3);
        let params = SensitivityParams::new(0.25, 1.0, 0.5, 0.5);
        let opts = EstimateOptions::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(estimate(&policy, black_box(&params), &opts)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sensitize, bench_expand, bench_estimate);
criterion_main!(benches);
