//! Command-line front-end.
//!
//! - **[`augment_main`]**: reads a model, adds the loop law to its flux-balance
//!   problem and writes the MILP as a CPLEX LP file.
//! - **[`components_main`]**: prints the connected components of the
//!   cycle-capable reactions.
//!
//! Without `--basis`, the plain null space is computed in-process and the
//! preprocessing level defaults to 1. Levels 2 to 4 need a basis computed by an
//! external tool.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use loopless::augment::{AugmentArgs, augment_main};
//!
//! let args = AugmentArgs {
//!     input: "network.rxn".into(),
//!     output: "network.lp".into(),
//!     basis: None,
//!     level: None,
//!     focus: vec![],
//!     merge: false,
//!     efm_tool: None,
//!     efm_program: "efm".into(),
//!     flux_bound: 10000.0,
//!     energy_bound: 100.0,
//!     energy_box: 1000.0,
//! };
//!
//! augment_main(args)?;
//! # Ok(())
//! # }
//! ```

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::*;
use clap::Parser;
use log::info;
use prettytable::*;

use crate::loop_law::{
    BigM, CommandEfmEnumerator, EfmEnumerator, LoopInfo, LoopLawOptions, LoopScope, Preprocessing,
    add_loop_law, prepare_loop_info,
};
use crate::model::{StoichiometricModel, read_model};
use crate::nullspace::{NullspaceProvider, PrecomputedNullspace, RrefNullspace};

pub mod lp_file;

/// Command-line arguments for the augment command.
#[derive(Parser, Debug)]
pub struct AugmentArgs {
    /// Reaction-equation model file
    pub input: PathBuf,

    /// Output CPLEX LP file
    #[clap(long, short)]
    pub output: PathBuf,

    /// Precomputed cycle basis with `reaction cycle coefficient` lines
    #[clap(long, short)]
    pub basis: Option<PathBuf>,

    /// Preprocessing level (default: 3 with --basis, 1 otherwise)
    #[clap(long, short, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub level: Option<u8>,

    /// Only constrain the components of (or, at level 4, reactions linked to) these reactions
    #[clap(long)]
    pub focus: Vec<String>,

    /// Share variables between reactions with parallel cycle participation
    #[clap(long)]
    pub merge: bool,

    /// Installation directory of the EFM enumerator
    #[clap(long)]
    pub efm_tool: Option<PathBuf>,

    /// Executable name of the EFM enumerator inside its installation directory
    #[clap(long, default_value = "efm")]
    pub efm_program: String,

    /// Big-M bound on flux magnitudes
    #[clap(long, default_value_t = 10000.0)]
    pub flux_bound: f64,

    /// Largest energy magnitude
    #[clap(long, default_value_t = 100.0)]
    pub energy_bound: f64,

    /// Box bound of the energy variables
    #[clap(long, default_value_t = 1000.0)]
    pub energy_box: f64,
}

/// Command-line arguments for the components command.
#[derive(Parser, Debug)]
pub struct ComponentsArgs {
    /// Reaction-equation model file
    pub input: PathBuf,

    /// Precomputed cycle basis with `reaction cycle coefficient` lines
    #[clap(long, short)]
    pub basis: Option<PathBuf>,

    /// Preprocessing level (default: 3 with --basis, 1 otherwise)
    #[clap(long, short, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub level: Option<u8>,
}

fn provider(
    basis: Option<&Path>,
    model: &StoichiometricModel,
) -> Result<Box<dyn NullspaceProvider>> {
    let provider: Box<dyn NullspaceProvider> = match basis {
        Some(path) => Box::new(PrecomputedNullspace::read(path, model)?),
        None => Box::new(RrefNullspace),
    };
    Ok(provider)
}

fn preprocessing(level: Option<u8>, basis: Option<&Path>) -> Result<Preprocessing> {
    match (level, basis) {
        (Some(level), _) => Preprocessing::from_level(level),
        (None, Some(_)) => Ok(Preprocessing::MinimalNullspace),
        (None, None) => Ok(Preprocessing::PlainNullspace),
    }
}

fn focus_reactions(model: &StoichiometricModel, focus: &[String]) -> Result<Vec<usize>> {
    focus
        .iter()
        .map(|id| {
            model
                .reaction_index(id)
                .ok_or_else(|| anyhow!("unknown focus reaction '{}'", id))
        })
        .collect()
}

fn print_summary(model: &StoichiometricModel, info: &LoopInfo, rows: usize, cols: usize) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["", "Value"]);

    let loop_reactions = info
        .layout
        .as_ref()
        .map_or(0, |layout| layout.slots.iter().flatten().count());
    table.add_row(row!["Reactions", model.num_reactions()]);
    table.add_row(row!["Metabolites", model.num_metabolites()]);
    table.add_row(row!["Cycles", info.cycle_basis.cols()]);
    table.add_row(row!["Components", info.num_components()]);
    table.add_row(row!["Loop-law reactions", loop_reactions]);
    table.add_row(row!["Rows", rows]);
    table.add_row(row!["Columns", cols]);

    table.printstd();
}

/// Add the loop law to the flux-balance problem of a model and write it out.
pub fn augment_main(args: AugmentArgs) -> Result<()> {
    let AugmentArgs {
        ref input,
        ref output,
        ref basis,
        level,
        ref focus,
        merge,
        ref efm_tool,
        ref efm_program,
        flux_bound,
        energy_bound,
        energy_box,
    } = args;

    let model = read_model(input)?;
    info!(
        "Read {} reactions and {} metabolites from {}",
        model.num_reactions(),
        model.num_metabolites(),
        input.display()
    );

    let preprocessing = preprocessing(level, basis.as_deref())?;
    let focus = focus_reactions(&model, focus)?;
    let scope = match (focus.is_empty(), preprocessing.links_reactions()) {
        (true, _) => LoopScope::All,
        (false, true) => LoopScope::Linked(focus),
        (false, false) => LoopScope::Components(focus),
    };

    let options = LoopLawOptions {
        preprocessing,
        constants: BigM {
            flux: flux_bound,
            energy: energy_bound,
            energy_box,
        },
        scope,
        merge_parallel: merge,
        ..LoopLawOptions::default()
    };

    let enumerator = efm_tool
        .as_ref()
        .map(|dir| CommandEfmEnumerator::new(dir, efm_program.as_str()));
    let provider = provider(basis.as_deref(), &model)?;
    let info = prepare_loop_info(
        &model,
        &options,
        provider.as_ref(),
        enumerator.as_ref().map(|e| e as &dyn EfmEnumerator),
    )?;

    let lp = model.to_linear_program();
    let rxn_index: Vec<usize> = (0..model.num_reactions()).collect();
    let milp = add_loop_law(&lp, &model, &rxn_index, &info, &options)?;

    let names = lp_file::column_names(&model, &rxn_index, &milp);
    let mut writer = BufWriter::new(
        fs::File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    lp_file::write_lp(&mut writer, &milp.lp, &names)?;
    writer.flush()?;
    info!("Wrote {}", output.display());

    print_summary(&model, &milp.info, milp.lp.rows(), milp.lp.cols());

    Ok(())
}

/// Print the connected components of the cycle-capable reactions.
pub fn components_main(args: ComponentsArgs) -> Result<()> {
    let model = read_model(&args.input)?;
    let basis = args.basis.as_deref();
    let options = LoopLawOptions {
        preprocessing: preprocessing(args.level, basis)?,
        ..LoopLawOptions::default()
    };

    let provider = provider(basis, &model)?;
    let info = prepare_loop_info(&model, &options, provider.as_ref(), None)?;

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["Component", "Size", "Reactions"]);

    for label in 1..=info.num_components() {
        let members: Vec<&str> = info
            .components
            .iter()
            .zip(&model.reactions)
            .filter(|(l, _)| **l == label)
            .map(|(_, id)| id.as_str())
            .collect();
        table.add_row(row![label, members.len(), members.join(" ")]);
    }

    table.printstd();
    println!(
        "{} of {} reactions take part in internal cycles",
        info.components.iter().filter(|l| **l > 0).count(),
        model.num_reactions()
    );

    Ok(())
}
