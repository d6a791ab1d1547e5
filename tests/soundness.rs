use loopless::loop_law::{AugmentedMilp, LoopLawOptions, Preprocessing, add_loop_law, prepare_loop_info};
use loopless::lp_solver::ConstraintSense;
use loopless::model::StoichiometricModel;
use loopless::nullspace::{NullspaceProvider, NullspaceStrategy, PrecomputedNullspace, RrefNullspace};

const TRIANGLE: &str = r#"
    EX: -> A [0, 10]
    R1: A -> B
    R2: B -> C
    R3: C -> A
    OUT: C -> [0, 10]
"#;

const EX: usize = 0;
const R1: usize = 1;
const R2: usize = 2;
const R3: usize = 3;
const OUT: usize = 4;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn triangle() -> StoichiometricModel {
    TRIANGLE.parse().expect("Failed to parse triangle model")
}

/// Level 3 augmentation over the in-process null space served as a precomputed basis
fn augmented(model: &StoichiometricModel) -> AugmentedMilp {
    let basis = RrefNullspace
        .cycle_space(model, NullspaceStrategy::Plain)
        .expect("Plain null space should succeed")
        .basis;
    let provider = PrecomputedNullspace::new(basis, None);
    let options = LoopLawOptions {
        preprocessing: Preprocessing::MinimalNullspace,
        ..LoopLawOptions::default()
    };

    let lp = model.to_linear_program();
    let rxn_index: Vec<usize> = (0..model.num_reactions()).collect();
    let info = prepare_loop_info(model, &options, &provider, None).expect("Loop info should be computed");
    add_loop_law(&lp, model, &rxn_index, &info, &options).expect("Augmentation should succeed")
}

fn row_holds(milp: &AugmentedMilp, row: usize, x: &[f64]) -> bool {
    let a = milp.lp.a.to_csr();
    let lhs: f64 = a
        .outer_view(row)
        .map_or(0.0, |r| r.iter().map(|(j, v)| v * x[j]).sum());
    let b = milp.lp.b[row];
    match milp.lp.sense[row] {
        ConstraintSense::LessEqual => lhs <= b + 1e-9,
        ConstraintSense::Equal => (lhs - b).abs() <= 1e-9,
        ConstraintSense::GreaterEqual => lhs >= b - 1e-9,
    }
}

/// Interval of every energy column left by the energy rows once fluxes and
/// indicators are fixed in `x`.
fn energy_intervals(milp: &AugmentedMilp, x: &[f64]) -> Vec<(f64, f64)> {
    let layout = milp.info.layout.as_ref().expect("Builder should record a layout");
    let a = milp.lp.a.to_csc();
    let csr = milp.lp.a.to_csr();

    layout
        .energy_columns
        .clone()
        .map(|g| {
            let (mut lo, mut hi) = (milp.lp.lb[g], milp.lp.ub[g]);
            let column = a.outer_view(g).expect("Energy column should exist");
            for (i, &coef) in column.iter() {
                if layout.rows.cycle.contains(&i) {
                    continue;
                }
                let others: f64 = csr
                    .outer_view(i)
                    .map_or(0.0, |r| r.iter().filter(|(j, _)| *j != g).map(|(j, v)| v * x[j]).sum());
                let bound = (milp.lp.b[i] - others) / coef;
                let upper = match milp.lp.sense[i] {
                    ConstraintSense::LessEqual => coef > 0.0,
                    ConstraintSense::GreaterEqual => coef < 0.0,
                    ConstraintSense::Equal => {
                        lo = lo.max(bound);
                        hi = hi.min(bound);
                        continue;
                    }
                };
                if upper {
                    hi = hi.min(bound);
                } else {
                    lo = lo.max(bound);
                }
            }
            (lo, hi)
        })
        .collect()
}

/// Whether every cycle row can still reach zero over the energy intervals.
fn cycle_rows_satisfiable(milp: &AugmentedMilp, intervals: &[(f64, f64)]) -> bool {
    let layout = milp.info.layout.as_ref().expect("Builder should record a layout");
    let a = milp.lp.a.to_csr();
    let start = layout.energy_columns.start;

    if intervals.iter().any(|(lo, hi)| lo > hi) {
        return false;
    }
    layout.rows.cycle.clone().all(|i| {
        let (mut lo, mut hi) = (0.0, 0.0);
        if let Some(row) = a.outer_view(i) {
            for (j, &v) in row.iter() {
                let (l, h) = intervals[j - start];
                lo += (v * l).min(v * h);
                hi += (v * l).max(v * h);
            }
        }
        lo <= 1e-9 && hi >= -1e-9
    })
}

/// Point with the given fluxes and the indicator set by each flux direction.
fn point(milp: &AugmentedMilp, fluxes: [f64; 5], idle_forward: bool) -> Vec<f64> {
    let mut x = vec![0.0; milp.lp.cols()];
    x[..5].copy_from_slice(&fluxes);
    for (r, &v) in fluxes.iter().enumerate() {
        if let Some(ind) = milp.info.indicator_column(r) {
            let forward = if v == 0.0 { idle_forward } else { v > 0.0 };
            x[ind] = if forward { 1.0 } else { 0.0 };
        }
    }
    x
}

#[cfg(test)]
mod interval_tests {
    use super::*;

    #[test]
    fn test_internal_cycle_contradicts_energy_rows() {
        init();
        let model = triangle();
        let milp = augmented(&model);
        let layout = milp.info.layout.as_ref().unwrap();

        let x = point(&milp, [0.0, 5.0, 5.0, 5.0, 0.0], true);
        for row in layout.rows.flux_upper.clone().chain(layout.rows.flux_lower.clone()) {
            assert!(row_holds(&milp, row, &x), "flux row {row} rejects forward indicators");
        }

        let intervals = energy_intervals(&milp, &x);
        for &(lo, hi) in &intervals {
            assert_eq!((lo, hi), (-100.0, -1.0));
        }
        assert!(!cycle_rows_satisfiable(&milp, &intervals));
    }

    #[test]
    fn test_exchange_driven_flux_leaves_energy_room() {
        init();
        let model = triangle();
        let milp = augmented(&model);

        // R3 idle with its indicator off
        let x = point(&milp, [5.0, 5.0, 5.0, 0.0, 5.0], false);
        let layout = milp.info.layout.as_ref().unwrap();
        for row in layout.rows.flux_upper.clone().chain(layout.rows.flux_lower.clone()) {
            assert!(row_holds(&milp, row, &x));
        }

        let intervals = energy_intervals(&milp, &x);
        let g3 = milp.info.energy_column(R3).unwrap() - layout.energy_columns.start;
        assert_eq!(intervals[g3], (1.0, 100.0));
        assert!(cycle_rows_satisfiable(&milp, &intervals));
    }

    #[test]
    fn test_exchange_reactions_have_no_loop_variables() {
        let model = triangle();
        let milp = augmented(&model);
        assert!(milp.info.indicator_column(EX).is_none());
        assert!(milp.info.indicator_column(OUT).is_none());
        for r in [R1, R2, R3] {
            assert!(milp.info.indicator_column(r).is_some());
        }
    }
}

#[cfg(feature = "coin_cbc")]
mod solver_tests {
    use super::*;
    use loopless::constraint;
    use loopless::lp_solver::LPModelBuilder;
    use loopless::program::LinearProgram;

    /// Feasibility of `lp` with some columns fixed
    fn feasible(lp: &LinearProgram, fixed: &[(usize, f64)]) -> bool {
        struct Soundness;
        let (mut builder, vars) = LPModelBuilder::<Soundness>::from_linear_program(lp)
            .expect("Program should convert to a solver model");
        for &(j, value) in fixed {
            builder.add_constraint(constraint!((vars[j]) == value));
        }
        builder
            .solve()
            .expect("Solver should run")
            .status
            .is_feasible()
    }

    #[test]
    fn test_plain_fba_admits_internal_cycle() {
        init();
        let model = triangle();
        let lp = model.to_linear_program();
        assert!(feasible(
            &lp,
            &[(EX, 0.0), (R1, 5.0), (R2, 5.0), (R3, 5.0), (OUT, 0.0)]
        ));
    }

    #[test]
    fn test_loop_law_rejects_internal_cycle() {
        init();
        let model = triangle();
        let milp = augmented(&model);
        for k in [1.0, 5.0, 100.0] {
            assert!(
                !feasible(&milp.lp, &[(R1, k), (R2, k), (R3, k)]),
                "cycle with flux {k} should be infeasible"
            );
        }
    }

    #[test]
    fn test_loop_law_keeps_exchange_driven_flux() {
        init();
        let model = triangle();
        let milp = augmented(&model);
        assert!(feasible(
            &milp.lp,
            &[(EX, 5.0), (R1, 5.0), (R2, 5.0), (R3, 0.0), (OUT, 5.0)]
        ));
    }
}
