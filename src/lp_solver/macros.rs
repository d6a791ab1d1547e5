//! Macros for the LP solver module

/// Create a new LP model builder with a unique brand
///
/// Each invocation defines a fresh brand type, so variables of two builders
/// cannot be mixed.
///
/// ```rust
/// use loopless::lp_model_builder;
/// use loopless::lp_solver::VariableType;
///
/// let mut builder = lp_model_builder!();
/// let v = builder.add_variable(VariableType::Continuous, -1000.0, 1000.0);
///
/// let mut flux_model = lp_model_builder!(FluxModel);
/// let mut energy_model = lp_model_builder!(EnergyModel);
///
/// let v = flux_model.add_variable(VariableType::Continuous, 0.0, 10.0);
/// let g = energy_model.add_variable(VariableType::Continuous, -1000.0, 1000.0);
///
/// // energy_model.add_constraint(constraint!((v) <= 5.0)); // ERROR: wrong brand
/// ```
#[macro_export]
macro_rules! lp_model_builder {
    ($brand_name:ident) => {{
        struct $brand_name;
        $crate::lp_solver::LPModelBuilder::<$brand_name>::new()
    }};

    // `UniqueBrand` is local to the block, so every invocation gets its own type
    () => {{
        struct UniqueBrand;
        $crate::lp_solver::LPModelBuilder::<UniqueBrand>::new()
    }};
}

/// Create constraints using natural comparison syntax
///
/// The left-hand side must be in parentheses.
///
/// ```rust
/// use loopless::constraint;
/// use loopless::lp_model_builder;
/// use loopless::lp_solver::VariableType;
///
/// let mut builder = lp_model_builder!(LoopModel);
/// let a = builder.add_variable(VariableType::Binary, 0.0, 1.0);
/// let g = builder.add_variable(VariableType::Continuous, -1000.0, 1000.0);
///
/// builder.add_constraint(constraint!((101.0 * a + g) <= 100.0));
/// builder.add_constraint(constraint!((101.0 * a + g) >= 1.0));
/// let _ = constraint!((g) == 0.0);
/// ```
#[macro_export]
macro_rules! constraint {
    (($lhs:expr) == $rhs:expr) => {
        $crate::lp_solver::Constraint::new(
            $lhs,
            $crate::lp_solver::ConstraintSense::Equal,
            $rhs as f64,
        )
    };
    (($lhs:expr) <= $rhs:expr) => {
        $crate::lp_solver::Constraint::new(
            $lhs,
            $crate::lp_solver::ConstraintSense::LessEqual,
            $rhs as f64,
        )
    };
    (($lhs:expr) >= $rhs:expr) => {
        $crate::lp_solver::Constraint::new(
            $lhs,
            $crate::lp_solver::ConstraintSense::GreaterEqual,
            $rhs as f64,
        )
    };
}
