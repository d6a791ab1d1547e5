//! Matrix-form linear and mixed-integer programs
//!
//! `min ½ xᵀ F x + cᵀ x  s.t.  A x (sense) b,  lb ≤ x ≤ ub`
//!
//! This is the exchange format between the loop-law builder and whatever solver
//! eventually consumes the problem. `A` is kept in CSR storage.

use anyhow::Result;
use sprs::CsMat;

use crate::LoopError;
use crate::lp_solver::{ConstraintSense, VariableType};

/// A linear program, optionally with a quadratic objective and column types.
#[derive(Debug, Clone)]
pub struct LinearProgram {
    /// Constraint matrix, rows × columns
    pub a: CsMat<f64>,
    /// Right-hand side, one entry per row
    pub b: Vec<f64>,
    /// Linear cost, one entry per column
    pub c: Vec<f64>,
    pub lb: Vec<f64>,
    pub ub: Vec<f64>,
    /// Row senses, one entry per row
    pub sense: Vec<ConstraintSense>,
    /// Quadratic cost `F` (columns × columns), if any
    pub quadratic: Option<CsMat<f64>>,
    /// Column types; `None` means every column is continuous
    pub var_types: Option<Vec<VariableType>>,
}

impl LinearProgram {
    pub fn rows(&self) -> usize {
        self.a.rows()
    }

    pub fn cols(&self) -> usize {
        self.a.cols()
    }

    /// Column types with the continuous default filled in.
    pub fn variable_types(&self) -> Vec<VariableType> {
        match &self.var_types {
            Some(types) => types.clone(),
            None => vec![VariableType::Continuous; self.cols()],
        }
    }

    /// Check that all vectors agree with the shape of `A`.
    pub fn validate(&self) -> Result<()> {
        let (m, n) = (self.rows(), self.cols());
        let checks = [
            ("length of b", m, self.b.len()),
            ("length of sense", m, self.sense.len()),
            ("length of c", n, self.c.len()),
            ("length of lb", n, self.lb.len()),
            ("length of ub", n, self.ub.len()),
        ];
        for (what, expected, found) in checks {
            if expected != found {
                return Err(LoopError::DimensionMismatch {
                    what,
                    expected,
                    found,
                }
                .into());
            }
        }

        if let Some(types) = &self.var_types {
            if types.len() != n {
                return Err(LoopError::DimensionMismatch {
                    what: "length of var_types",
                    expected: n,
                    found: types.len(),
                }
                .into());
            }
        }

        if let Some(f) = &self.quadratic {
            for (what, found) in [("quadratic rows", f.rows()), ("quadratic columns", f.cols())] {
                if found != n {
                    return Err(LoopError::DimensionMismatch {
                        what,
                        expected: n,
                        found,
                    }
                    .into());
                }
            }
        }

        if let Some(j) = (0..n).find(|&j| self.lb[j] > self.ub[j]) {
            return Err(anyhow::anyhow!(
                "column {} has lower bound {} above upper bound {}",
                j,
                self.lb[j],
                self.ub[j]
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn two_by_three() -> LinearProgram {
        let mut a = TriMat::new((2, 3));
        a.add_triplet(0, 0, 1.0);
        a.add_triplet(1, 2, -1.0);
        LinearProgram {
            a: a.to_csr(),
            b: vec![0.0; 2],
            c: vec![0.0; 3],
            lb: vec![-1.0; 3],
            ub: vec![1.0; 3],
            sense: vec![ConstraintSense::Equal; 2],
            quadratic: None,
            var_types: None,
        }
    }

    #[test]
    fn test_consistent_program_validates() {
        let lp = two_by_three();
        assert!(lp.validate().is_ok());
        assert_eq!(lp.variable_types(), vec![VariableType::Continuous; 3]);
    }

    #[test]
    fn test_short_rhs_is_rejected() {
        let mut lp = two_by_three();
        lp.b.pop();

        let err = lp.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<LoopError>(),
            Some(&LoopError::DimensionMismatch {
                what: "length of b",
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_quadratic_shape_is_checked() {
        let mut lp = two_by_three();
        lp.quadratic = Some(CsMat::eye(2));

        let err = lp.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoopError>(),
            Some(LoopError::DimensionMismatch { what: "quadratic rows", .. })
        ));
    }

    #[test]
    fn test_crossed_bounds_are_rejected() {
        let mut lp = two_by_three();
        lp.lb[1] = 2.0;
        assert!(lp.validate().is_err());
    }
}
