//! Arithmetic on variables and linear expressions
//!
//! ```ignore
//! let upper = v - 10000.0 * a;   // flux row of a loop-law reaction
//! let energy = 101.0 * a + g;    // energy row
//! let flipped = 1.0 - a;         // indicator of an anti-parallel partner
//! ```
//!
//! Anything convertible into a [`LinearExpression`] of the same brand can appear
//! on the right of `+` and `-`.

use std::ops::{Add, Mul, Neg, Sub};

use super::{LinearExpression, VariableId};

impl<Brand> From<f64> for LinearExpression<Brand> {
    fn from(constant: f64) -> Self {
        LinearExpression::new(constant)
    }
}

impl<Brand> Neg for LinearExpression<Brand> {
    type Output = LinearExpression<Brand>;

    fn neg(self) -> Self::Output {
        self * -1.0
    }
}

impl<Brand, Rhs: Into<LinearExpression<Brand>>> Add<Rhs> for LinearExpression<Brand> {
    type Output = LinearExpression<Brand>;

    fn add(mut self, rhs: Rhs) -> Self::Output {
        let rhs: LinearExpression<Brand> = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl<Brand, Rhs: Into<LinearExpression<Brand>>> Sub<Rhs> for LinearExpression<Brand> {
    type Output = LinearExpression<Brand>;

    fn sub(self, rhs: Rhs) -> Self::Output {
        let rhs: LinearExpression<Brand> = rhs.into();
        self + -rhs
    }
}

impl<Brand> Mul<f64> for LinearExpression<Brand> {
    type Output = LinearExpression<Brand>;

    fn mul(mut self, factor: f64) -> Self::Output {
        for term in &mut self.terms {
            term.coefficient *= factor;
        }
        self.constant *= factor;
        self
    }
}

impl<Brand, Rhs: Into<LinearExpression<Brand>>> Add<Rhs> for VariableId<Brand> {
    type Output = LinearExpression<Brand>;

    fn add(self, rhs: Rhs) -> Self::Output {
        LinearExpression::from(self) + rhs
    }
}

impl<Brand, Rhs: Into<LinearExpression<Brand>>> Sub<Rhs> for VariableId<Brand> {
    type Output = LinearExpression<Brand>;

    fn sub(self, rhs: Rhs) -> Self::Output {
        LinearExpression::from(self) - rhs
    }
}

impl<Brand> Mul<f64> for VariableId<Brand> {
    type Output = LinearExpression<Brand>;

    fn mul(self, factor: f64) -> Self::Output {
        LinearExpression::from(self) * factor
    }
}

// scalar on the left

impl<Brand> Mul<VariableId<Brand>> for f64 {
    type Output = LinearExpression<Brand>;

    fn mul(self, variable: VariableId<Brand>) -> Self::Output {
        variable * self
    }
}

impl<Brand> Mul<LinearExpression<Brand>> for f64 {
    type Output = LinearExpression<Brand>;

    fn mul(self, expression: LinearExpression<Brand>) -> Self::Output {
        expression * self
    }
}

impl<Brand> Add<VariableId<Brand>> for f64 {
    type Output = LinearExpression<Brand>;

    fn add(self, variable: VariableId<Brand>) -> Self::Output {
        variable + self
    }
}

impl<Brand> Sub<VariableId<Brand>> for f64 {
    type Output = LinearExpression<Brand>;

    fn sub(self, variable: VariableId<Brand>) -> Self::Output {
        LinearExpression::from(self) - variable
    }
}

impl<Brand> Sub<LinearExpression<Brand>> for f64 {
    type Output = LinearExpression<Brand>;

    fn sub(self, expression: LinearExpression<Brand>) -> Self::Output {
        LinearExpression::from(self) - expression
    }
}
