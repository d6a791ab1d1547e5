//! Cycle-space providers
//!
//! A cycle basis `N` is a reactions × k matrix whose columns span the flux
//! directions through internal reactions that leave every metabolite balanced
//! (`S · N = 0` with exchange reactions fixed at zero). How the basis is obtained
//! is pluggable: [`RrefNullspace`] computes the plain null space in-process and
//! [`PrecomputedNullspace`] serves one produced by an external tool.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use log::debug;
use ordered_float::OrderedFloat;
use sprs::{CsMat, TriMat};

use crate::LoopError;
use crate::loop_law::LoopParticipation;
use crate::model::StoichiometricModel;

/// `max |S · N|` above which a basis is rejected
pub const ORTHOGONALITY_TOLERANCE: f64 = 1e-6;

/// Basis entries with smaller magnitude are dropped
const ZERO_TOLERANCE: f64 = 1e-10;

/// Basis flavours a provider may be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullspaceStrategy {
    /// Any basis of the internal null space
    Plain,
    /// Sparse basis from the fast sparse-null-space-pursuit heuristic
    FastSnp,
    /// Sparse basis from a minimal-support MILP
    MinimalMilp,
}

/// Result of a null-space computation
#[derive(Debug, Clone)]
pub struct CycleSpace {
    /// Reactions × cycles
    pub basis: CsMat<f64>,
    /// Per-reaction direction in which the reaction can take part in a cycle.
    /// Providers that do not know leave this `None` and callers derive it from bounds.
    pub participation: Option<Vec<LoopParticipation>>,
}

pub trait NullspaceProvider {
    fn cycle_space(
        &self,
        model: &StoichiometricModel,
        strategy: NullspaceStrategy,
    ) -> Result<CycleSpace>;
}

/// Plain null space by Gauss-Jordan elimination.
///
/// Only [`NullspaceStrategy::Plain`] is supported; the sparse strategies need an
/// optimiser and are expected to come through [`PrecomputedNullspace`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RrefNullspace;

impl NullspaceProvider for RrefNullspace {
    fn cycle_space(
        &self,
        model: &StoichiometricModel,
        strategy: NullspaceStrategy,
    ) -> Result<CycleSpace> {
        match strategy {
            NullspaceStrategy::Plain => Ok(CycleSpace {
                basis: internal_null_basis(model, &model.internal_reactions()),
                participation: None,
            }),
            other => Err(LoopError::UnsupportedStrategy(other).into()),
        }
    }
}

/// Null space of `S` restricted to `columns`, embedded back into reaction space.
///
/// The result has one row per model reaction; rows of reactions outside
/// `columns` are empty.
pub fn internal_null_basis(model: &StoichiometricModel, columns: &[usize]) -> CsMat<f64> {
    let n = model.num_reactions();

    // dense copy of the touched rows of S[:, columns]
    let mut row_of = HashMap::new();
    let mut dense: Vec<Vec<f64>> = Vec::new();
    for (k, &j) in columns.iter().enumerate() {
        for (i, v) in model.column(j) {
            let r = *row_of.entry(i).or_insert_with(|| {
                dense.push(vec![0.0; columns.len()]);
                dense.len() - 1
            });
            dense[r][k] = v;
        }
    }

    let vectors = rref_null_space(dense, columns.len());
    debug!(
        "null space of {} reactions has dimension {}",
        columns.len(),
        vectors.len()
    );

    let mut basis = TriMat::new((n, vectors.len()));
    for (c, vector) in vectors.iter().enumerate() {
        for (k, &v) in vector.iter().enumerate() {
            if v.abs() > ZERO_TOLERANCE {
                basis.add_triplet(columns[k], c, v);
            }
        }
    }
    basis.to_csr()
}

/// One null-space vector per free column of the reduced row echelon form.
fn rref_null_space(mut m: Vec<Vec<f64>>, cols: usize) -> Vec<Vec<f64>> {
    let rows = m.len();
    let mut pivots = Vec::new();

    for c in 0..cols {
        let r = pivots.len();
        if r == rows {
            break;
        }

        let best = (r..rows).max_by_key(|&i| OrderedFloat(m[i][c].abs()));
        let Some(best) = best else { break };
        if m[best][c].abs() <= ZERO_TOLERANCE {
            continue;
        }

        m.swap(r, best);
        let p = m[r][c];
        m[r].iter_mut().for_each(|x| *x /= p);

        let pivot_row = m[r].clone();
        for (i, row) in m.iter_mut().enumerate() {
            let f = row[c];
            if i != r && f != 0.0 {
                for k in c..cols {
                    row[k] -= f * pivot_row[k];
                }
            }
        }
        pivots.push(c);
    }

    let mut is_pivot = vec![false; cols];
    pivots.iter().for_each(|&c| is_pivot[c] = true);

    (0..cols)
        .filter(|&free| !is_pivot[free])
        .map(|free| {
            let mut v = vec![0.0; cols];
            v[free] = 1.0;
            for (r, &pc) in pivots.iter().enumerate() {
                v[pc] = -m[r][free];
            }
            v
        })
        .collect()
}

/// A basis computed elsewhere, served for every strategy.
#[derive(Debug, Clone)]
pub struct PrecomputedNullspace {
    space: CycleSpace,
}

impl PrecomputedNullspace {
    pub fn new(basis: CsMat<f64>, participation: Option<Vec<LoopParticipation>>) -> Self {
        Self {
            space: CycleSpace {
                basis,
                participation,
            },
        }
    }

    /// Read a basis from whitespace-separated `reaction_id cycle coefficient` lines.
    ///
    /// Cycles are numbered from 0; the number of cycles is one more than the
    /// largest index seen, which may not exceed the number of entries. `#`
    /// starts a comment.
    pub fn read(path: &Path, model: &StoichiometricModel) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents, model).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str, model: &StoichiometricModel) -> Result<Self> {
        let mut entries = Vec::new();
        let mut cycles = 0;
        let mut widest_line = 0;

        for (lineno, raw) in contents.lines().enumerate() {
            let line = lineno + 1;
            let text = raw.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }

            let fields: Vec<&str> = text.split_whitespace().collect();
            let &[id, cycle, coefficient] = fields.as_slice() else {
                return Err(LoopError::Parse {
                    line,
                    message: "expected 'reaction cycle coefficient'".into(),
                }
                .into());
            };
            let bad = |message: String| LoopError::Parse { line, message };

            let reaction = model
                .reaction_index(id)
                .ok_or_else(|| bad(format!("unknown reaction '{id}'")))?;
            let cycle: usize = cycle
                .parse()
                .map_err(|e| bad(format!("cycle index '{cycle}': {e}")))?;
            let coefficient: f64 = coefficient
                .parse()
                .map_err(|e| bad(format!("coefficient '{coefficient}': {e}")))?;

            let width = cycle
                .checked_add(1)
                .ok_or_else(|| bad(format!("cycle index {cycle} is out of range")))?;
            if width > cycles {
                cycles = width;
                widest_line = line;
            }
            entries.push((reaction, cycle, coefficient));
        }

        // more cycles than entries leaves some cycle without any reaction
        if cycles > entries.len() {
            return Err(LoopError::Parse {
                line: widest_line,
                message: format!(
                    "cycle index {} exceeds the {} basis entries",
                    cycles - 1,
                    entries.len()
                ),
            }
            .into());
        }

        let mut basis = TriMat::new((model.num_reactions(), cycles));
        for (r, c, v) in entries {
            basis.add_triplet(r, c, v);
        }
        Ok(Self::new(basis.to_csr(), None))
    }
}

impl NullspaceProvider for PrecomputedNullspace {
    fn cycle_space(
        &self,
        model: &StoichiometricModel,
        _strategy: NullspaceStrategy,
    ) -> Result<CycleSpace> {
        if self.space.basis.rows() != model.num_reactions() {
            return Err(LoopError::DimensionMismatch {
                what: "cycle basis rows",
                expected: model.num_reactions(),
                found: self.space.basis.rows(),
            }
            .into());
        }
        Ok(self.space.clone())
    }
}

/// Largest absolute entry of `S · N`.
pub fn verify_orthogonality(model: &StoichiometricModel, basis: &CsMat<f64>) -> Result<f64> {
    if basis.rows() != model.num_reactions() {
        return Err(LoopError::DimensionMismatch {
            what: "cycle basis rows",
            expected: model.num_reactions(),
            found: basis.rows(),
        }
        .into());
    }

    let product = &model.s.to_csr() * &basis.to_csr();
    Ok(product
        .iter()
        .map(|(v, _)| OrderedFloat(v.abs()))
        .max()
        .map_or(0.0, |m| m.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> StoichiometricModel {
        "EX_A: -> A [0, 10]\n\
         R1: A <=> B\n\
         R2: B <=> C\n\
         R3: C <=> A\n\
         OUT: C -> [0, 10]"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_rref_finds_the_triangle_cycle() {
        let model = triangle();
        let space = RrefNullspace
            .cycle_space(&model, NullspaceStrategy::Plain)
            .unwrap();

        assert_eq!(space.basis.shape(), (5, 1));
        assert!(space.participation.is_none());
        // exchanges are outside the cycle space
        assert_eq!(space.basis.get(0, 0), None);
        assert_eq!(space.basis.get(4, 0), None);
        // R1 = R2 = R3 around the loop
        let coefficients: Vec<f64> = (1..4)
            .map(|r| *space.basis.get(r, 0).unwrap())
            .collect();
        assert!((coefficients[0] - coefficients[1]).abs() < 1e-12);
        assert!((coefficients[1] - coefficients[2]).abs() < 1e-12);
        assert!(verify_orthogonality(&model, &space.basis).unwrap() < 1e-12);
    }

    #[test]
    fn test_rref_rejects_sparse_strategies() {
        let err = RrefNullspace
            .cycle_space(&triangle(), NullspaceStrategy::FastSnp)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LoopError>(),
            Some(&LoopError::UnsupportedStrategy(NullspaceStrategy::FastSnp))
        );
    }

    #[test]
    fn test_null_space_of_two_parallel_loops() {
        // R1 and R2 both convert A to B; R3 converts back, giving two independent cycles
        let model: StoichiometricModel = "R1: A <=> B\nR2: A <=> B\nR3: B <=> A".parse().unwrap();
        let basis = internal_null_basis(&model, &[0, 1, 2]);

        assert_eq!(basis.cols(), 2);
        assert!(verify_orthogonality(&model, &basis).unwrap() < 1e-12);
    }

    #[test]
    fn test_acyclic_network_has_empty_basis() {
        let model: StoichiometricModel = "EX: -> A\nR1: A -> B\nOUT: B ->".parse().unwrap();
        let space = RrefNullspace
            .cycle_space(&model, NullspaceStrategy::Plain)
            .unwrap();
        assert_eq!(space.basis.shape(), (3, 0));
    }

    #[test]
    fn test_precomputed_basis_file() {
        let model = triangle();
        let provider = PrecomputedNullspace::parse(
            "# one loop\nR1 0 1\nR2 0 1\nR3 0 1.0\n",
            &model,
        )
        .unwrap();

        let space = provider
            .cycle_space(&model, NullspaceStrategy::MinimalMilp)
            .unwrap();
        assert_eq!(space.basis.shape(), (5, 1));
        assert_eq!(verify_orthogonality(&model, &space.basis).unwrap(), 0.0);
    }

    #[test]
    fn test_precomputed_basis_unknown_reaction() {
        let err = PrecomputedNullspace::parse("R9 0 1", &triangle()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoopError>(),
            Some(LoopError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_precomputed_basis_cycle_index_overflow() {
        let err = PrecomputedNullspace::parse("R1 18446744073709551615 1\n", &triangle()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoopError>(),
            Some(LoopError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_precomputed_basis_sparse_cycle_index() {
        let err = PrecomputedNullspace::parse("R1 0 1\nR2 0 1\nR3 1000000 1\n", &triangle())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoopError>(),
            Some(LoopError::Parse { line: 3, .. })
        ));

        let provider = PrecomputedNullspace::parse("R1 0 1\nR2 1 1\n", &triangle()).unwrap();
        assert_eq!(provider.space.basis.shape(), (5, 2));
    }

    #[test]
    fn test_non_orthogonal_basis_residual() {
        let model = triangle();
        let mut basis = TriMat::new((5, 1));
        basis.add_triplet(1, 0, 1.0);
        basis.add_triplet(2, 0, 1.0);

        let residual = verify_orthogonality(&model, &basis.to_csr()).unwrap();
        assert_eq!(residual, 1.0);
    }
}
