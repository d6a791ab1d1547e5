use std::collections::HashMap;

use log::debug;

use crate::lp_solver::output_suppression::GagHandle;
use crate::lp_solver::*;
use ::coin_cbc::{Model, Sense};

/// Round a floating-point number to a specified number of significant digits
/// This is an workaround to mask floating point errors in CBC.
fn round_to_sig_digits(value: f64, digits: u32) -> f64 {
    if value == 0.0 {
        return 0.0;
    }

    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10_f64.powi(digits as i32 - magnitude - 1);
    (value * scale).round() / scale
}

/// Solve an LP model using Coin CBC
pub fn solve_coin_cbc<Brand>(builder: &LPModelBuilder<Brand>) -> Result<LPSolution<Brand>> {
    debug!(
        "CBC: {} columns, {} rows",
        builder.variables.len(),
        builder.constraints.len()
    );
    // CBC prints its banner and progress on stdout
    let _gag_handle = GagHandle::stdout()?;
    let mut model = Model::default();
    let mut var_map = HashMap::new();

    for (idx, var_info) in builder.variables.iter().enumerate() {
        let col = match var_info.var_type {
            VariableType::Continuous => {
                let col = model.add_col();
                model.set_col_lower(col, var_info.lower_bound);
                model.set_col_upper(col, var_info.upper_bound);
                col
            }
            VariableType::Integer => {
                let col = model.add_integer();
                model.set_col_lower(col, var_info.lower_bound);
                model.set_col_upper(col, var_info.upper_bound);
                col
            }
            VariableType::Binary => model.add_binary(),
        };
        let var_id = VariableId {
            id: idx,
            _brand: std::marker::PhantomData,
        };
        var_map.insert(var_id, col);
    }

    for constraint in &builder.constraints {
        let row = model.add_row();

        for term in &constraint.expression.terms {
            if let Some(&col) = var_map.get(&term.variable) {
                model.set_weight(row, col, term.coefficient);
            } else {
                return Err(anyhow::anyhow!(
                    "Variable {:?} not found in model",
                    term.variable
                ));
            }
        }

        let rhs_adjusted = constraint.rhs - constraint.expression.constant;

        match constraint.sense {
            ConstraintSense::LessEqual => model.set_row_upper(row, rhs_adjusted),
            ConstraintSense::Equal => model.set_row_equal(row, rhs_adjusted),
            ConstraintSense::GreaterEqual => model.set_row_lower(row, rhs_adjusted),
        }
    }

    if let Some(obj_info) = &builder.objective {
        for term in &obj_info.expression.terms {
            if let Some(&col) = var_map.get(&term.variable) {
                model.set_obj_coeff(col, term.coefficient);
            } else {
                return Err(anyhow::anyhow!(
                    "Variable {:?} not found in model",
                    term.variable
                ));
            }
        }

        let sense = match obj_info.sense {
            OptimizationSense::Minimize => Sense::Minimize,
            OptimizationSense::Maximize => Sense::Maximize,
        };

        model.set_obj_sense(sense);
    }

    let solution = model.solve();

    let status = if solution.raw().is_proven_optimal() {
        OptimizationStatus::Optimal
    } else if solution.raw().is_proven_infeasible() {
        OptimizationStatus::Infeasible
    } else {
        OptimizationStatus::Other("Unknown status")
    };

    let num_vars = builder.variables.len();
    let mut variable_values = vec![0.0; num_vars];
    if status.is_feasible() {
        for (var_id, col) in var_map.iter() {
            variable_values[var_id.id] = round_to_sig_digits(solution.col(*col), 8);
        }
    }

    let objective_value = match &builder.objective {
        Some(obj_info) if status.is_feasible() => {
            let obj_val = obj_info
                .expression
                .terms
                .iter()
                .fold(obj_info.expression.constant, |acc, term| {
                    acc + term.coefficient * variable_values[term.variable.id]
                });
            round_to_sig_digits(obj_val, 8)
        }
        _ => 0.0,
    };

    Ok(LPSolution {
        status,
        objective_value,
        variable_values,
        _brand: std::marker::PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constraint, lp_model_builder};

    #[test]
    fn test_round_to_sig_digits() {
        assert_eq!(round_to_sig_digits(0.0, 8), 0.0);
        assert_eq!(round_to_sig_digits(1.000000004, 8), 1.0);
        assert_eq!(round_to_sig_digits(-99.9999999999, 8), -100.0);
    }

    #[test]
    fn test_big_m_switch_is_respected() {
        let mut builder = lp_model_builder!();
        let v = builder.add_variable(VariableType::Continuous, -10.0, 10.0);
        let a = builder.add_variable(VariableType::Binary, 0.0, 1.0);

        builder.add_constraint(constraint!((v - 100.0 * a) <= 0.0));
        builder.add_constraint(constraint!((v - 100.0 * a) >= -100.0));
        builder.add_constraint(constraint!((v) >= 2.0));
        builder.set_objective(a.into(), OptimizationSense::Minimize);

        let solution = solve_coin_cbc(&builder).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert_eq!(solution.get_value(a), Some(1.0));
    }

    #[test]
    fn test_infeasible_detected() {
        let mut builder = lp_model_builder!();
        let x = builder.add_variable(VariableType::Continuous, 0.0, 1.0);
        builder.add_constraint(constraint!((x) >= 2.0));

        let solution = solve_coin_cbc(&builder).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
    }
}
