//! Sharing of loop-law variables between (anti)parallel reactions.
//!
//! Reactions whose cycle-basis rows are proportional take part in exactly the
//! same cycles, so the cycle rows force their directions to agree (or to be
//! opposite for a negative factor). Such reactions can use one indicator and one
//! energy column. A parallel reaction `s` merged onto `t` uses `a_t` and `g_t`;
//! an anti-parallel one uses `1 - a_t` and `-g_t`.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use log::{debug, info, warn};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use super::{AugmentedMilp, LoopLayout, LoopSlot};
use crate::LoopError;
use crate::program::LinearProgram;

/// Minimum |cosine| between basis rows treated as parallel
pub const PARALLEL_THRESHOLD: f64 = 0.9999999;

/// Earliest slot with a parallel row, and whether it is anti-parallel.
fn parallel_partners(slot_basis: &CsMat<f64>) -> Vec<Option<(usize, bool)>> {
    let slots = slot_basis.rows();

    let norms: Vec<f64> = slot_basis
        .outer_iterator()
        .map(|row| row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt())
        .collect();

    let mut normalised = TriMat::new(slot_basis.shape());
    for (&v, (r, c)) in slot_basis.iter() {
        if norms[r] > 0.0 {
            normalised.add_triplet(r, c, v / norms[r]);
        }
    }
    let normalised: CsMat<f64> = normalised.to_csr();
    let transposed = normalised.transpose_view().to_csr();
    let gram = &normalised * &transposed;

    (0..slots)
        .into_par_iter()
        .map(|s| {
            gram.outer_view(s).and_then(|row| {
                row.iter()
                    .filter(|&(t, v)| t < s && v.abs() > PARALLEL_THRESHOLD)
                    .min_by_key(|&(t, _)| t)
                    .map(|(t, &v)| (t, v < 0.0))
            })
        })
        .collect()
}

/// Merge indicator and energy columns of reactions with parallel cycle rows.
///
/// Merged-away columns are removed; the rows of their reactions are kept and
/// rewritten onto the shared columns. A problem without further parallel pairs is
/// returned unchanged.
pub fn merge_parallel_variables(milp: AugmentedMilp) -> Result<AugmentedMilp> {
    let Some(layout) = milp.info.layout.clone() else {
        return Ok(milp);
    };

    let slots = layout.slot_reactions.len();
    let partners = parallel_partners(&layout.slot_basis);

    // partners are earlier slots, so their roots are already resolved
    let mut root = Vec::with_capacity(slots);
    for partner in &partners {
        let resolved = match *partner {
            Some((t, flip)) => {
                let (r, f): (usize, bool) = root[t];
                (r, f != flip)
            }
            None => (root.len(), false),
        };
        root.push(resolved);
    }

    let kept: Vec<usize> = (0..slots).filter(|&s| root[s].0 == s).collect();
    if kept.len() == slots {
        debug!("No parallel loop-law variables to merge");
        return Ok(milp);
    }
    info!(
        "Merging {} of {} loop-law variable pairs",
        slots - kept.len(),
        slots
    );

    let lp = &milp.lp;
    let (ind0, en0) = (layout.indicator_columns.start, layout.energy_columns.start);

    // target column and flip for every column of the problem
    let mut redirect: Vec<(usize, bool)> = (0..lp.cols()).map(|j| (j, false)).collect();
    for (s, &(t, flip)) in root.iter().enumerate() {
        redirect[ind0 + s] = (ind0 + t, flip);
        redirect[en0 + s] = (en0 + t, flip);
    }

    check_indicator_overlap(lp, &root, ind0)?;

    let mut new_index = vec![None; lp.cols()];
    let mut cols = 0;
    for (j, &(t, _)) in redirect.iter().enumerate() {
        if t == j {
            new_index[j] = Some(cols);
            cols += 1;
        }
    }
    let column = |j: usize| {
        let (t, flip) = redirect[j];
        (new_index[t].unwrap_or(t), flip)
    };
    let is_indicator = |j: usize| layout.indicator_columns.contains(&j);

    let mut a = TriMat::with_capacity((lp.rows(), cols), lp.a.nnz());
    let mut b = lp.b.clone();
    for (&v, (i, j)) in lp.a.iter() {
        let (t, flip) = column(j);
        match (flip, is_indicator(j)) {
            (false, _) => a.add_triplet(i, t, v),
            // v·(1 - a) = v - v·a
            (true, true) => {
                a.add_triplet(i, t, -v);
                b[i] -= v;
            }
            (true, false) => a.add_triplet(i, t, -v),
        }
    }

    let mut c = vec![0.0; cols];
    let mut lb = vec![f64::NEG_INFINITY; cols];
    let mut ub = vec![f64::INFINITY; cols];
    let old_types = lp.variable_types();
    let mut var_types = old_types.clone();
    var_types.truncate(cols);
    for j in 0..lp.cols() {
        let (t, flip) = column(j);
        let (l, u) = match (flip, is_indicator(j)) {
            (false, _) => (lp.lb[j], lp.ub[j]),
            (true, true) => (1.0 - lp.ub[j], 1.0 - lp.lb[j]),
            (true, false) => (-lp.ub[j], -lp.lb[j]),
        };
        c[t] += if flip { -lp.c[j] } else { lp.c[j] };
        lb[t] = lb[t].max(l);
        ub[t] = ub[t].min(u);
        if redirect[j].0 == j {
            var_types[t] = old_types[j];
        }
    }

    let quadratic = match &lp.quadratic {
        Some(f) => {
            let mut q = TriMat::with_capacity((cols, cols), f.nnz());
            for (&v, (i, j)) in f.iter() {
                match (new_index[i], new_index[j]) {
                    (Some(ni), Some(nj)) => q.add_triplet(ni, nj, v),
                    _ if v == 0.0 => {}
                    _ => bail!("quadratic cost on merged loop-law column ({i}, {j})"),
                }
            }
            Some(q.to_csr())
        }
        None => None,
    };

    let position: HashMap<usize, usize> = kept.iter().enumerate().map(|(k, &s)| (s, k)).collect();
    let slots_of_reactions = layout
        .slots
        .iter()
        .map(|slot| {
            slot.map(|LoopSlot { slot, flipped }| {
                let (t, flip) = root[slot];
                LoopSlot {
                    slot: position[&t],
                    flipped: flipped != flip,
                }
            })
        })
        .collect();

    let mut slot_basis = TriMat::new((kept.len(), layout.slot_basis.cols()));
    for (&v, (s, k)) in layout.slot_basis.iter() {
        if let Some(&p) = position.get(&s) {
            slot_basis.add_triplet(p, k, v);
        }
    }

    let start = new_index[ind0].unwrap_or(ind0);
    let energy_columns = start + kept.len()..start + 2 * kept.len();
    let a: CsMat<f64> = a.to_csr();
    for row in layout.rows.cycle.clone() {
        let energies = a.outer_view(row).map_or(0, |r| {
            r.iter()
                .filter(|&(j, v)| energy_columns.contains(&j) && *v != 0.0)
                .count()
        });
        if energies == 1 {
            warn!(
                "Cycle row {} collapsed onto a single energy column, the merged problem is infeasible",
                row
            );
        }
    }

    let mut info = milp.info.clone();
    info.layout = Some(LoopLayout {
        rows: layout.rows.clone(),
        indicator_columns: start..start + kept.len(),
        energy_columns,
        slots: slots_of_reactions,
        slot_reactions: kept.iter().map(|&s| layout.slot_reactions[s]).collect(),
        slot_basis: slot_basis.to_csr(),
    });

    Ok(AugmentedMilp {
        lp: LinearProgram {
            a,
            b,
            c,
            lb,
            ub,
            sense: lp.sense.clone(),
            quadratic,
            var_types: Some(var_types),
        },
        info,
        initial_solution: milp.initial_solution,
    })
}

/// Indicator columns of one merge group must not share rows before merging.
fn check_indicator_overlap(lp: &LinearProgram, root: &[(usize, bool)], ind0: usize) -> Result<()> {
    let a = lp.a.to_csc();
    let rows_of = |j: usize| -> HashSet<usize> {
        a.outer_view(j)
            .map(|col| {
                col.iter()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut groups: HashMap<usize, HashSet<usize>> = HashMap::new();
    for (s, &(t, _)) in root.iter().enumerate() {
        let rows = rows_of(ind0 + s);
        let group = groups.entry(t).or_default();
        if !group.is_disjoint(&rows) {
            return Err(LoopError::MergeOverlap {
                target: ind0 + t,
                source: ind0 + s,
            }
            .into());
        }
        group.extend(rows);
    }
    Ok(())
}
