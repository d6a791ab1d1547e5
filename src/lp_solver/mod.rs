//! Linear Programming (LP) solver abstraction layer
//!
//! The loop-law pipeline itself only assembles matrices; it never solves anything.
//! This module is the hookup for callers (and the test-suite) that want to hand an
//! assembled [`LinearProgram`] to a MILP solver without depending on a particular
//! backend.
//!
//! # Type Safety with Branded Types
//!
//! `VariableId`, `LinearExpression`, `Constraint` and `LPModelBuilder` carry a
//! `Brand` type parameter. A variable created by one builder cannot be used in a
//! constraint on another builder; the brand is a zero-sized phantom type.
//!
//! ```rust
//! use loopless::constraint;
//! use loopless::lp_model_builder;
//! use loopless::lp_solver::VariableType;
//!
//! let mut builder = lp_model_builder!();
//! let v = builder.add_variable(VariableType::Continuous, -10.0, 10.0);
//! let a = builder.add_variable(VariableType::Binary, 0.0, 1.0);
//!
//! // big-M switch: a = 0 forces v <= 0
//! builder.add_constraint(constraint!((v - 10.0 * a) <= 0.0));
//! ```
//!
//! # From matrix form
//!
//! [`LPModelBuilder::from_linear_program`] translates a matrix-form problem row by
//! row and returns the variable handles in column order, so extra constraints
//! (for instance fixing fluxes to test feasibility of a flux pattern) can be added
//! before solving.
//!
//! # Solver Selection
//!
//! The backend is selected with the `LOOPLESS_LP_SOLVER` environment variable:
//! - `"gurobi"` - Gurobi (requires the `gurobi` feature)
//! - `"coin_cbc"` or `"cbc"` - COIN-OR CBC (requires the `coin_cbc` feature)
//!
//! If not set, the solver defaults to Gurobi if available, otherwise CBC.

use anyhow::Result;
use std::env;
use std::marker::PhantomData;

use crate::program::LinearProgram;

/// Variable types supported by LP solvers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    /// Continuous variable (can take any real value)
    Continuous,
    /// Integer variable (can only take integer values)
    Integer,
    /// Binary variable (can only take values 0 or 1)
    Binary,
}

/// Constraint sense for linear constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    /// Less than or equal to (≤)
    LessEqual,
    /// Equal to (=)
    Equal,
    /// Greater than or equal to (≥)
    GreaterEqual,
}

/// Optimization direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationSense {
    /// Minimize the objective function
    Minimize,
    /// Maximize the objective function
    Maximize,
}

/// Status of the optimization process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum OptimizationStatus {
    /// Optimal solution found
    Optimal,
    /// Feasible solution found, but not necessarily optimal
    Feasible,
    /// Problem is infeasible (no solution exists)
    Infeasible,
    /// Problem is unbounded
    Unbounded,
    /// Other status (solver-specific)
    Other(&'static str),
}

impl OptimizationStatus {
    /// Whether the solver returned a point satisfying every constraint
    pub fn is_feasible(self) -> bool {
        matches!(self, OptimizationStatus::Optimal | OptimizationStatus::Feasible)
    }
}

/// Available LP solver backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
enum SolverBackend {
    #[cfg(feature = "gurobi")]
    /// Gurobi commercial solver
    Gurobi,
    #[cfg(feature = "coin_cbc")]
    /// Coin CBC open-source solver
    CoinCbc,
}

impl SolverBackend {
    /// Get the solver backend from environment variable or use fallback logic
    fn from_env_or_default() -> Result<Self> {
        if let Ok(solver_name) = env::var("LOOPLESS_LP_SOLVER") {
            match solver_name.to_lowercase().as_str() {
                "gurobi" => {
                    #[cfg(feature = "gurobi")]
                    return Ok(SolverBackend::Gurobi);
                    #[cfg(not(feature = "gurobi"))]
                    return Err(anyhow::anyhow!(
                        "Gurobi solver requested via LOOPLESS_LP_SOLVER but gurobi feature not enabled"
                    ));
                }
                "coin_cbc" | "coin-cbc" | "cbc" => {
                    #[cfg(feature = "coin_cbc")]
                    return Ok(SolverBackend::CoinCbc);
                    #[cfg(not(feature = "coin_cbc"))]
                    return Err(anyhow::anyhow!(
                        "Coin CBC solver requested via LOOPLESS_LP_SOLVER but coin_cbc feature not enabled"
                    ));
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "Invalid solver '{}' in LOOPLESS_LP_SOLVER. Valid options: gurobi, coin_cbc",
                        solver_name
                    ));
                }
            }
        }

        #[cfg(feature = "gurobi")]
        return Ok(SolverBackend::Gurobi);

        #[allow(unreachable_code)]
        #[cfg(feature = "coin_cbc")]
        return Ok(SolverBackend::CoinCbc);

        #[cfg(not(any(feature = "gurobi", feature = "coin_cbc")))]
        Err(anyhow::anyhow!(
            "No LP solver backend available. Please enable a solver feature (e.g., 'gurobi' or 'coin_cbc')"
        ))
    }
}

/// A linear expression term: coefficient * variable
#[derive(Debug, Clone)]
pub struct LinearTerm<Brand> {
    pub coefficient: f64,
    pub variable: VariableId<Brand>,
}

/// A linear expression: sum of terms plus constant
#[derive(Debug, Clone)]
pub struct LinearExpression<Brand> {
    pub terms: Vec<LinearTerm<Brand>>,
    pub constant: f64,
}

impl<Brand> LinearExpression<Brand> {
    /// Create a new linear expression with a constant term
    pub fn new(constant: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant,
        }
    }

    /// Add a term to the expression
    pub fn add_term(&mut self, coefficient: f64, variable: VariableId<Brand>) {
        self.terms.push(LinearTerm {
            coefficient,
            variable,
        });
    }
}

impl<Brand> From<VariableId<Brand>> for LinearExpression<Brand> {
    fn from(variable: VariableId<Brand>) -> Self {
        let mut expression = Self::new(0.0);
        expression.add_term(1.0, variable);
        expression
    }
}

/// Unique identifier for a variable in the LP model
///
/// The `Brand` type parameter ensures that variables can only be used with the
/// builder that created them. This is enforced at compile time.
pub struct VariableId<Brand> {
    id: usize,
    _brand: PhantomData<fn() -> Brand>,
}

impl<Brand> VariableId<Brand> {
    /// Column position of the variable in its builder
    pub fn index(&self) -> usize {
        self.id
    }
}

// Manual trait implementations that don't require Brand to implement anything
impl<Brand> std::fmt::Debug for VariableId<Brand> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableId").field("id", &self.id).finish()
    }
}

impl<Brand> Clone for VariableId<Brand> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Brand> Copy for VariableId<Brand> {}

impl<Brand> PartialEq for VariableId<Brand> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<Brand> Eq for VariableId<Brand> {}

impl<Brand> std::hash::Hash for VariableId<Brand> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Unique identifier for a constraint in the LP model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintId(usize);

/// A linear constraint `expression (sense) rhs`
///
/// ```rust,no_run
/// use loopless::constraint;
/// use loopless::lp_model_builder;
/// use loopless::lp_solver::{Constraint, ConstraintSense, VariableType};
///
/// let mut builder = lp_model_builder!();
/// let x = builder.add_variable(VariableType::Continuous, 0.0, 10.0);
/// let y = builder.add_variable(VariableType::Continuous, 0.0, 10.0);
///
/// let c = constraint!((x + y) == 10.0);
/// let c = Constraint::eq(x + y, 10.0);
/// let c = Constraint::new(x + y, ConstraintSense::Equal, 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct Constraint<Brand> {
    expression: LinearExpression<Brand>,
    sense: ConstraintSense,
    rhs: f64,
}

impl<Brand> Constraint<Brand> {
    /// Create a new constraint
    pub fn new(
        expression: impl Into<LinearExpression<Brand>>,
        sense: ConstraintSense,
        rhs: f64,
    ) -> Self {
        Self {
            expression: expression.into(),
            sense,
            rhs,
        }
    }

    /// Create an equality constraint: expression == rhs
    pub fn eq(expression: impl Into<LinearExpression<Brand>>, rhs: f64) -> Self {
        Self::new(expression, ConstraintSense::Equal, rhs)
    }

    /// Create a less-than-or-equal constraint: expression <= rhs
    pub fn le(expression: impl Into<LinearExpression<Brand>>, rhs: f64) -> Self {
        Self::new(expression, ConstraintSense::LessEqual, rhs)
    }

    /// Create a greater-than-or-equal constraint: expression >= rhs
    pub fn ge(expression: impl Into<LinearExpression<Brand>>, rhs: f64) -> Self {
        Self::new(expression, ConstraintSense::GreaterEqual, rhs)
    }
}

/// Variable information stored in the model
#[derive(Debug, Clone)]
struct VariableInfo {
    var_type: VariableType,
    lower_bound: f64,
    upper_bound: f64,
}

/// Objective function information
#[derive(Debug, Clone)]
struct ObjectiveInfo<Brand> {
    expression: LinearExpression<Brand>,
    sense: OptimizationSense,
}

/// Result of solving an LP model
#[derive(Debug, Clone)]
pub struct LPSolution<Brand> {
    pub status: OptimizationStatus,
    pub objective_value: f64,
    variable_values: Vec<f64>,
    _brand: PhantomData<fn() -> Brand>,
}

impl<Brand> LPSolution<Brand> {
    /// Get the value of a variable from the solution
    pub fn get_value(&self, var_id: VariableId<Brand>) -> Option<f64> {
        self.variable_values.get(var_id.id).copied()
    }

    /// All variable values in column order
    pub fn values(&self) -> &[f64] {
        &self.variable_values
    }
}

/// Builder for LP models that can work with different backends
///
/// ```rust,no_run
/// use loopless::lp_model_builder;
/// use loopless::lp_solver::{LPModelBuilder, VariableType};
///
/// struct FluxModel;
/// let mut builder1 = LPModelBuilder::<FluxModel>::new();
/// let v = builder1.add_variable(VariableType::Continuous, -1000.0, 1000.0);
///
/// let mut builder2 = lp_model_builder!();
/// ```
pub struct LPModelBuilder<Brand> {
    variables: Vec<VariableInfo>,
    constraints: Vec<Constraint<Brand>>,
    objective: Option<ObjectiveInfo<Brand>>,
    _brand: PhantomData<fn() -> Brand>,
}

impl<Brand> LPModelBuilder<Brand> {
    /// Create a new LP model builder
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: None,
            _brand: PhantomData,
        }
    }

    /// Translate a matrix-form problem into a builder.
    ///
    /// Returns the builder together with one handle per column of `lp`. A nonzero
    /// linear cost vector becomes a minimisation objective. Quadratic problems are
    /// rejected, neither backend takes them through this layer.
    pub fn from_linear_program(lp: &LinearProgram) -> Result<(Self, Vec<VariableId<Brand>>)> {
        lp.validate()?;
        if lp.quadratic.is_some() {
            return Err(anyhow::anyhow!(
                "quadratic objectives are not supported by the LP solver layer"
            ));
        }

        let mut builder = Self::new();
        let types = lp.variable_types();
        let vars: Vec<VariableId<Brand>> = (0..lp.cols())
            .map(|j| builder.add_variable(types[j], lp.lb[j], lp.ub[j]))
            .collect();

        let mut rows: Vec<LinearExpression<Brand>> =
            (0..lp.rows()).map(|_| LinearExpression::new(0.0)).collect();
        for (&value, (row, col)) in lp.a.iter() {
            rows[row].add_term(value, vars[col]);
        }
        for (row, expression) in rows.into_iter().enumerate() {
            builder.add_constraint(Constraint::new(expression, lp.sense[row], lp.b[row]));
        }

        if lp.c.iter().any(|&c| c != 0.0) {
            let mut objective = LinearExpression::new(0.0);
            for (j, &c) in lp.c.iter().enumerate().filter(|(_, c)| **c != 0.0) {
                objective.add_term(c, vars[j]);
            }
            builder.set_objective(objective, OptimizationSense::Minimize);
        }

        Ok((builder, vars))
    }

    /// Add a variable to the model
    pub fn add_variable(
        &mut self,
        var_type: VariableType,
        lower_bound: f64,
        upper_bound: f64,
    ) -> VariableId<Brand> {
        let var_id = VariableId {
            id: self.variables.len(),
            _brand: PhantomData,
        };
        self.variables.push(VariableInfo {
            var_type,
            lower_bound,
            upper_bound,
        });
        var_id
    }

    /// Add a constraint to the model
    pub fn add_constraint(&mut self, constraint: Constraint<Brand>) -> ConstraintId {
        let constr_id = ConstraintId(self.constraints.len());
        self.constraints.push(constraint);
        constr_id
    }

    /// Set the objective function
    pub fn set_objective(&mut self, expression: LinearExpression<Brand>, sense: OptimizationSense) {
        self.objective = Some(ObjectiveInfo { expression, sense });
    }

    /// Number of variables added so far
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of constraints added so far
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Solve the model using the solver selected by `LOOPLESS_LP_SOLVER`
    pub fn solve(&self) -> Result<LPSolution<Brand>> {
        let solver = SolverBackend::from_env_or_default()?;

        match solver {
            #[cfg(feature = "gurobi")]
            SolverBackend::Gurobi => crate::lp_solver::gurobi::solve_gurobi(self),

            #[cfg(feature = "coin_cbc")]
            SolverBackend::CoinCbc => crate::lp_solver::coin_cbc::solve_coin_cbc(self),
        }
    }
}

impl<Brand> Default for LPModelBuilder<Brand> {
    fn default() -> Self {
        Self::new()
    }
}

// Macros for convenient syntax
pub mod macros;

// Operator overloading for linear expressions
pub mod ops;

pub mod output_suppression;

#[cfg(feature = "gurobi")]
pub mod gurobi;

#[cfg(feature = "coin_cbc")]
pub mod coin_cbc;
