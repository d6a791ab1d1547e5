//! Assembly of the big-M loop-law rows and columns.

use anyhow::Result;
use log::{debug, warn};
use sprs::{CsMat, TriMat};

use super::{
    AugmentedMilp, LoopInfo, LoopLawEncoding, LoopLayout, LoopRows, LoopSlot, cycle_rows,
};
use crate::LoopError;
use crate::lp_solver::{ConstraintSense, VariableType};
use crate::program::LinearProgram;

/// Reactions getting loop-law variables: nonzero row in `basis` and some participation.
fn select_reactions(basis: &CsMat<f64>, info: &LoopInfo) -> Vec<usize> {
    cycle_rows(basis)
        .into_iter()
        .enumerate()
        .filter(|&(r, nonzero)| nonzero && info.participation[r].any())
        .map(|(r, _)| r)
        .collect()
}

fn warn_undersized_flux_bound(lp: &LinearProgram, columns: impl Iterator<Item = usize>, flux: f64) {
    let largest = columns
        .flat_map(|j| [lp.lb[j].abs(), lp.ub[j].abs()])
        .filter(|b| b.is_finite())
        .fold(0.0, f64::max);

    if flux <= largest {
        warn!(
            "Flux big-M {} does not exceed the largest flux bound {} of a cycle-capable reaction, \
             feasible fluxes may be cut off",
            flux, largest
        );
    }
}

/// Append indicator and energy columns and the loop-law rows to `lp`.
///
/// Rows are appended as flux-upper, flux-lower, energy-upper, energy-lower and
/// cycle blocks, columns as indicators then energies. The layout is recorded in
/// the returned `info`.
pub fn build_loop_constraints(
    lp: &LinearProgram,
    rxn_index: &[usize],
    basis: &CsMat<f64>,
    mut info: LoopInfo,
    encoding: LoopLawEncoding,
) -> Result<AugmentedMilp> {
    for (what, found) in [
        ("cycle basis rows", basis.rows()),
        ("loop participation flags", info.participation.len()),
    ] {
        if found != rxn_index.len() {
            return Err(LoopError::DimensionMismatch {
                what,
                expected: rxn_index.len(),
                found,
            }
            .into());
        }
    }
    if let Some((reaction, &column)) = rxn_index.iter().enumerate().find(|(_, c)| **c >= lp.cols()) {
        return Err(LoopError::IndexOutOfRange {
            reaction,
            column,
            columns: lp.cols(),
        }
        .into());
    }
    let constants = info.constants;
    constants.validate()?;

    let basis = basis.to_csr();
    let reactions = select_reactions(&basis, &info);
    let (m0, n0) = (lp.rows(), lp.cols());
    let (nint, cycles) = (reactions.len(), basis.cols());
    debug!(
        "Building loop law for {} reactions and {} cycles on a {}x{} problem",
        nint, cycles, m0, n0
    );

    warn_undersized_flux_bound(lp, reactions.iter().map(|&r| rxn_index[r]), constants.flux);

    let mut slots = vec![None; rxn_index.len()];
    for (slot, &r) in reactions.iter().enumerate() {
        slots[r] = Some(LoopSlot {
            slot,
            flipped: false,
        });
    }

    let rows = LoopRows {
        flux_upper: m0..m0 + nint,
        flux_lower: m0 + nint..m0 + 2 * nint,
        energy_upper: m0 + 2 * nint..m0 + 3 * nint,
        energy_lower: m0 + 3 * nint..m0 + 4 * nint,
        cycle: m0 + 4 * nint..m0 + 4 * nint + cycles,
    };
    let indicator_columns = n0..n0 + nint;
    let energy_columns = n0 + nint..n0 + 2 * nint;

    let mut a = TriMat::with_capacity(
        (rows.cycle.end, energy_columns.end),
        lp.a.nnz() + 8 * nint + basis.nnz(),
    );
    for (&v, (i, j)) in lp.a.iter() {
        a.add_triplet(i, j, v);
    }

    let mut b = lp.b.clone();
    let mut sense = lp.sense.clone();

    match encoding {
        LoopLawEncoding::IndicatorEnergy => {
            let (mv, mg) = (constants.flux, constants.energy);

            for (s, &r) in reactions.iter().enumerate() {
                let (v, ind, g) = (rxn_index[r], indicator_columns.start + s, energy_columns.start + s);

                // v - Mv a <= 0
                a.add_triplet(rows.flux_upper.start + s, v, 1.0);
                a.add_triplet(rows.flux_upper.start + s, ind, -mv);
                // v - Mv a >= -Mv
                a.add_triplet(rows.flux_lower.start + s, v, 1.0);
                a.add_triplet(rows.flux_lower.start + s, ind, -mv);
                // (Mg + 1) a + g <= Mg
                a.add_triplet(rows.energy_upper.start + s, ind, mg + 1.0);
                a.add_triplet(rows.energy_upper.start + s, g, 1.0);
                // (Mg + 1) a + g >= 1
                a.add_triplet(rows.energy_lower.start + s, ind, mg + 1.0);
                a.add_triplet(rows.energy_lower.start + s, g, 1.0);
            }

            b.extend(std::iter::repeat_n(0.0, nint));
            b.extend(std::iter::repeat_n(-mv, nint));
            b.extend(std::iter::repeat_n(mg, nint));
            b.extend(std::iter::repeat_n(1.0, nint));
            for block in [
                ConstraintSense::LessEqual,
                ConstraintSense::GreaterEqual,
                ConstraintSense::LessEqual,
                ConstraintSense::GreaterEqual,
            ] {
                sense.extend(std::iter::repeat_n(block, nint));
            }
        }
    }

    // Nᵗ g = 0
    let mut slot_basis = TriMat::new((nint, cycles));
    for (&v, (r, k)) in basis.iter() {
        if let Some(slot) = slots[r] {
            a.add_triplet(rows.cycle.start + k, energy_columns.start + slot.slot, v);
            slot_basis.add_triplet(slot.slot, k, v);
        }
    }
    b.extend(std::iter::repeat_n(0.0, cycles));
    sense.extend(std::iter::repeat_n(ConstraintSense::Equal, cycles));

    let n = energy_columns.end;
    let mut c = lp.c.clone();
    c.resize(n, 0.0);

    let mut lb = lp.lb.clone();
    let mut ub = lp.ub.clone();
    lb.extend(std::iter::repeat_n(0.0, nint));
    ub.extend(std::iter::repeat_n(1.0, nint));
    lb.extend(std::iter::repeat_n(-constants.energy_box, nint));
    ub.extend(std::iter::repeat_n(constants.energy_box, nint));

    let mut var_types = lp.variable_types();
    var_types.extend(std::iter::repeat_n(VariableType::Binary, nint));
    var_types.extend(std::iter::repeat_n(VariableType::Continuous, nint));

    let quadratic = lp.quadratic.as_ref().map(|f| {
        let mut padded = TriMat::with_capacity((n, n), f.nnz());
        for (&v, (i, j)) in f.iter() {
            padded.add_triplet(i, j, v);
        }
        padded.to_csr()
    });

    info.layout = Some(LoopLayout {
        rows,
        indicator_columns,
        energy_columns,
        slots,
        slot_reactions: reactions,
        slot_basis: slot_basis.to_csr(),
    });

    Ok(AugmentedMilp {
        lp: LinearProgram {
            a: a.to_csr(),
            b,
            c,
            lb,
            ub,
            sense,
            quadratic,
            var_types: Some(var_types),
        },
        info,
        initial_solution: Vec::new(),
    })
}
