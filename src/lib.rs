//! Loop-law constraints for constraint-based metabolic models
//!
//! Flux balance analysis admits flux distributions where an internal cycle of
//! reactions carries flux without any thermodynamic driving force. This library
//! augments the flux-balance LP with binary direction indicators and continuous
//! "energy" variables so that such loops become infeasible (loopless FBA).
//!
//! # Pipeline
//!
//! 1. A [`nullspace::NullspaceProvider`] returns a basis of the internal cycle space
//!    (rows are reactions, columns are independent cycles).
//! 2. [`loop_law::components`] partitions the cycle-capable reactions into connected
//!    components of the basis support.
//! 3. Optionally, [`loop_law::linker`] enumerates elementary flux modes per component
//!    through an external tool and records which reaction pairs share a mode.
//! 4. [`loop_law::builder`] appends the big-M indicator rows and the cycle
//!    orthogonality rows to the LP.
//! 5. Optionally, [`loop_law::merge`] shares indicator/energy variables between
//!    reactions with (anti)parallel cycle participation.
//!
//! # Usage Example
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use loopless::loop_law::{LoopLawOptions, add_loop_law, prepare_loop_info};
//! use loopless::model::read_model;
//! use loopless::nullspace::RrefNullspace;
//! use std::path::Path;
//!
//! let model = read_model(Path::new("network.rxn"))?;
//! let lp = model.to_linear_program();
//! let rxn_index: Vec<usize> = (0..model.num_reactions()).collect();
//!
//! let options = LoopLawOptions::default();
//! let info = prepare_loop_info(&model, &options, &RrefNullspace, None)?;
//! let milp = add_loop_law(&lp, &model, &rxn_index, &info, &options)?;
//! println!("{} rows, {} columns", milp.lp.rows(), milp.lp.cols());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - **[`model`]**: stoichiometric model and a reaction-equation file reader
//! - **[`program`]**: matrix-form LP/MILP
//! - **[`nullspace`]**: cycle-space providers and the orthogonality check
//! - **[`loop_law`]**: component finder, reaction linker, constraint builder, variable merger
//! - **[`lp_solver`]**: solver abstraction used to check feasibility of assembled problems
//! - **[`augment`]**: command-line front-end and CPLEX LP output

use clap::Parser;
use std::{error::Error, fmt};

pub mod augment;
pub mod loop_law;
pub mod lp_solver;
pub mod model;
pub mod nullspace;
pub mod program;

pub use augment::{AugmentArgs, ComponentsArgs, augment_main, components_main};
pub use loop_law::{AugmentedMilp, LoopInfo};
pub use model::StoichiometricModel;
pub use program::LinearProgram;

/// Errors raised by the loop-law pipeline.
///
/// Everything here is a configuration or consistency problem: it is reported
/// before a partial problem is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopError {
    /// Two collections that must agree in length do not.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A reaction is mapped to a column outside the problem.
    IndexOutOfRange {
        reaction: usize,
        column: usize,
        columns: usize,
    },
    /// Two reactions are mapped to the same problem column.
    DuplicateColumn { column: usize },
    /// A reaction index that does not exist in the model.
    UnknownReaction(usize),
    /// `S · N` is not numerically zero.
    InvalidCycleBasis { residual: f64 },
    /// The null-space provider cannot compute the requested strategy.
    UnsupportedStrategy(nullspace::NullspaceStrategy),
    /// Big-M constants that cannot encode the loop law.
    InvalidConstants(&'static str),
    /// Preprocessing level outside 1..=4.
    InvalidLevel(u8),
    /// The merge pass found an indicator column already shared with its target.
    MergeOverlap { target: usize, source: usize },
    /// Malformed input file.
    Parse { line: usize, message: String },
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(f, "{what}: expected {expected}, found {found}"),
            LoopError::IndexOutOfRange {
                reaction,
                column,
                columns,
            } => write!(
                f,
                "reaction {reaction} is mapped to column {column}, but the problem has {columns} columns"
            ),
            LoopError::DuplicateColumn { column } => {
                write!(f, "column {column} is mapped to more than one reaction")
            }
            LoopError::UnknownReaction(r) => write!(f, "unknown reaction index {r}"),
            LoopError::InvalidCycleBasis { residual } => write!(
                f,
                "cycle basis is not in the null space of the stoichiometry (max |S·N| = {residual:e})"
            ),
            LoopError::UnsupportedStrategy(s) => {
                write!(f, "null-space strategy {s:?} is not available from this provider")
            }
            LoopError::InvalidConstants(why) => write!(f, "invalid big-M constants: {why}"),
            LoopError::InvalidLevel(level) => {
                write!(f, "preprocessing level {level} is not in 1..=4")
            }
            LoopError::MergeOverlap { target, source } => write!(
                f,
                "indicator columns {target} and {source} overlap before merging"
            ),
            LoopError::Parse { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl Error for LoopError {}

/// Command-line interface arguments for the loopless tools.
#[derive(Debug, Parser)]
#[clap(
    name = "loopless",
    about = "Loop-law MILP augmentation for constraint-based metabolic models"
)]
pub enum CLIArguments {
    /// Add loop-law constraints to the flux-balance problem of a model and write a CPLEX LP file.
    Augment(AugmentArgs),
    /// Print the connected components of cycle-capable reactions.
    Components(ComponentsArgs),
}
