//! Benchmarks for loop-law constraint generation
//!
//! Synthetic networks are chains of three-reaction rings joined by transport
//! reactions, so the number of independent cycles equals the number of rings.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use loopless::loop_law::{
    LoopInfo, LoopLawOptions, Preprocessing, add_loop_law, find_components,
    merge_parallel_variables, prepare_loop_info,
};
use loopless::model::StoichiometricModel;
use loopless::nullspace::{NullspaceProvider, NullspaceStrategy, PrecomputedNullspace, RrefNullspace};

/// Ring counts available for benchmarking
const RING_COUNTS: &[usize] = &[10, 50, 200];

/// Reaction-equation text for a chain of `rings` internal cycles
fn ring_chain(rings: usize) -> String {
    let mut text = String::from("EX: -> M0 [0, 10]\n");
    for k in 0..rings {
        text.push_str(&format!("F{k}: M{k} -> N{k}\n"));
        text.push_str(&format!("G{k}: N{k} <=> P{k}\n"));
        text.push_str(&format!("H{k}: P{k} -> M{k}\n"));
        text.push_str(&format!("T{k}: M{k} -> M{}\n", k + 1));
    }
    text.push_str(&format!("OUT: M{rings} -> [0, 10]\n"));
    text
}

fn prepare(rings: usize) -> Option<(StoichiometricModel, LoopInfo, LoopLawOptions)> {
    let model: StoichiometricModel = match ring_chain(rings).parse() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Warning: Could not build {rings} rings: {e}. Skipping benchmark.");
            return None;
        }
    };

    let basis = RrefNullspace
        .cycle_space(&model, NullspaceStrategy::Plain)
        .ok()?
        .basis;
    let options = LoopLawOptions {
        preprocessing: Preprocessing::MinimalNullspace,
        ..LoopLawOptions::default()
    };
    let provider = PrecomputedNullspace::new(basis, None);
    let info = prepare_loop_info(&model, &options, &provider, None).ok()?;
    Some((model, info, options))
}

/// Benchmark the in-process null space
fn bench_null_space(c: &mut Criterion) {
    let mut group = c.benchmark_group("null_space");

    for &rings in RING_COUNTS {
        let Ok(model) = ring_chain(rings).parse::<StoichiometricModel>() else {
            continue;
        };
        group.throughput(Throughput::Elements(model.num_reactions() as u64));

        group.bench_with_input(BenchmarkId::new("rref", rings), &model, |b, model| {
            b.iter(|| {
                black_box(RrefNullspace.cycle_space(black_box(model), NullspaceStrategy::Plain))
            })
        });
    }

    group.finish();
}

/// Benchmark connected components of the basis support
fn bench_components(c: &mut Criterion) {
    let mut group = c.benchmark_group("components");

    for &rings in RING_COUNTS {
        let Some((model, info, _)) = prepare(rings) else {
            continue;
        };
        group.throughput(Throughput::Elements(model.num_reactions() as u64));

        group.bench_with_input(
            BenchmarkId::new("find_components", rings),
            &info.cycle_basis,
            |b, basis| b.iter(|| black_box(find_components(black_box(basis)))),
        );
    }

    group.finish();
}

/// Benchmark assembly of the loop-law rows
fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");

    for &rings in RING_COUNTS {
        let Some((model, info, options)) = prepare(rings) else {
            continue;
        };
        let lp = model.to_linear_program();
        let rxn_index: Vec<usize> = (0..model.num_reactions()).collect();
        group.throughput(Throughput::Elements(model.num_reactions() as u64));

        group.bench_with_input(
            BenchmarkId::new("add_loop_law", rings),
            &(lp, rxn_index),
            |b, (lp, rxn_index)| {
                b.iter(|| {
                    black_box(add_loop_law(
                        black_box(lp),
                        &model,
                        black_box(rxn_index),
                        &info,
                        &options,
                    ))
                })
            },
        );
    }

    group.finish();
}

/// Benchmark the parallel-variable merge on assembled problems
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for &rings in RING_COUNTS {
        let Some((model, info, options)) = prepare(rings) else {
            continue;
        };
        let lp = model.to_linear_program();
        let rxn_index: Vec<usize> = (0..model.num_reactions()).collect();
        let Ok(milp) = add_loop_law(&lp, &model, &rxn_index, &info, &options) else {
            eprintln!("Warning: Could not assemble {rings} rings. Skipping benchmark.");
            continue;
        };
        group.throughput(Throughput::Elements(milp.lp.cols() as u64));

        group.bench_with_input(BenchmarkId::new("merge_parallel", rings), &milp, |b, milp| {
            b.iter(|| black_box(merge_parallel_variables(black_box(milp.clone()))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_null_space,
    bench_components,
    bench_assembly,
    bench_merge
);
criterion_main!(benches);
