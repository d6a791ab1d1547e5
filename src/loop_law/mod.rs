//! Loop-law augmentation of flux-balance problems.
//!
//! The loop law is added to an LP in two stages:
//!
//! 1. [`prepare_loop_info`] computes everything that only depends on the network:
//!    the cycle basis, the direction in which each reaction may take part in a cycle,
//!    the connected components of the basis support and, at preprocessing level 4,
//!    the EFM-based reaction links. The resulting [`LoopInfo`] can be reused for
//!    any number of augmentations of LPs built on the same model.
//! 2. [`add_loop_law`] validates the reaction → column map, restricts the basis to
//!    the requested [`LoopScope`], appends the big-M rows and columns and optionally
//!    merges parallel variables.
//!
//! # Formulation
//!
//! For every cycle-capable reaction `j` with flux column `v_j`, a binary `a_j` and a
//! continuous energy `g_j` are appended:
//!
//! ```text
//! v_j - Mv·a_j        <= 0
//! v_j - Mv·a_j        >= -Mv
//! (Mg+1)·a_j + g_j    <= Mg
//! (Mg+1)·a_j + g_j    >= 1
//! Nᵗ g                 = 0
//! ```
//!
//! `a_j = 1` allows forward flux and forces `g_j ∈ [-Mg, -1]`, `a_j = 0` allows
//! backward flux and forces `g_j ∈ [1, Mg]`. A cycle can then only carry flux if its
//! energies sum to zero with a common sign, which is impossible.
//!
//! A network without any exchange reaction makes every reaction cycle-capable. `v = 0`
//! is not special-cased there: it stays feasible only while some choice of indicators
//! lets the energies of every cycle sum to zero.

use std::{collections::HashSet, ops::Range, time::Duration};

use anyhow::Result;
use log::{info, warn};
use sprs::{CsMat, TriMat};

use crate::LoopError;
use crate::model::StoichiometricModel;
use crate::nullspace::{
    NullspaceProvider, NullspaceStrategy, ORTHOGONALITY_TOLERANCE, internal_null_basis,
    verify_orthogonality,
};
use crate::program::LinearProgram;

pub mod builder;
pub mod components;
pub mod linker;
pub mod merge;

pub use builder::build_loop_constraints;
pub use components::find_components;
pub use linker::{CommandEfmEnumerator, EfmEnumerator, WorkingDirGuard, link_reactions};
pub use merge::merge_parallel_variables;

/// Directions in which a reaction can carry flux around an internal cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopParticipation {
    pub reverse: bool,
    pub forward: bool,
}

impl LoopParticipation {
    pub fn any(&self) -> bool {
        self.reverse || self.forward
    }

    /// Directions permitted by the flux bounds alone
    pub fn from_bounds(lb: f64, ub: f64) -> Self {
        Self {
            reverse: lb < 0.0,
            forward: ub > 0.0,
        }
    }
}

/// Pairs of reactions sharing an elementary flux mode.
///
/// `Unavailable` is distinct from an all-zero matrix: it means the enumeration
/// was not possible, not that no pairs are linked.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionLinks {
    /// Links were not part of the selected preprocessing
    NotRequested,
    /// The enumerator is missing or failed
    Unavailable,
    /// Symmetric reactions × reactions 0/1 matrix
    Computed(CsMat<u8>),
}

impl ReactionLinks {
    pub fn is_computed(&self) -> bool {
        matches!(self, ReactionLinks::Computed(_))
    }

    /// `None` unless links were computed
    pub fn linked(&self, i: usize, j: usize) -> Option<bool> {
        match self {
            ReactionLinks::Computed(m) => Some(m.get(i, j).is_some_and(|v| *v != 0)),
            _ => None,
        }
    }
}

/// Big-M constants of the indicator formulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BigM {
    /// Bound on any feasible flux magnitude
    pub flux: f64,
    /// Largest energy magnitude allowed by the sign rows
    pub energy: f64,
    /// Box bound of the energy columns
    pub energy_box: f64,
}

impl Default for BigM {
    fn default() -> Self {
        Self {
            flux: 10000.0,
            energy: 100.0,
            energy_box: 1000.0,
        }
    }
}

impl BigM {
    pub fn validate(&self) -> Result<()> {
        let why = if !(self.flux.is_finite() && self.energy.is_finite() && self.energy_box.is_finite()) {
            Some("constants must be finite")
        } else if self.flux <= 0.0 {
            Some("flux bound must be positive")
        } else if self.energy < 1.0 {
            Some("energy bound must be at least 1")
        } else if self.energy_box < 1.0 {
            Some("energy box bound must be at least 1")
        } else {
            None
        };

        match why {
            Some(why) => Err(LoopError::InvalidConstants(why).into()),
            None => Ok(()),
        }
    }
}

/// How the cycle basis is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preprocessing {
    /// Level 1: plain null space of the internal reactions
    PlainNullspace,
    /// Level 2: heuristic sparse null space
    FastSnp,
    /// Level 3: minimal null space from a MILP
    #[default]
    MinimalNullspace,
    /// Level 4: level 3 plus EFM-based reaction links
    EfmLinked,
}

impl Preprocessing {
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            1 => Ok(Preprocessing::PlainNullspace),
            2 => Ok(Preprocessing::FastSnp),
            3 => Ok(Preprocessing::MinimalNullspace),
            4 => Ok(Preprocessing::EfmLinked),
            other => Err(LoopError::InvalidLevel(other).into()),
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Preprocessing::PlainNullspace => 1,
            Preprocessing::FastSnp => 2,
            Preprocessing::MinimalNullspace => 3,
            Preprocessing::EfmLinked => 4,
        }
    }

    pub fn strategy(&self) -> NullspaceStrategy {
        match self {
            Preprocessing::PlainNullspace => NullspaceStrategy::Plain,
            Preprocessing::FastSnp => NullspaceStrategy::FastSnp,
            Preprocessing::MinimalNullspace | Preprocessing::EfmLinked => {
                NullspaceStrategy::MinimalMilp
            }
        }
    }

    pub fn links_reactions(&self) -> bool {
        matches!(self, Preprocessing::EfmLinked)
    }
}

/// Big-M encoding of the loop law.
///
/// Only the indicator/energy encoding is implemented. Two older variants tied the
/// energy sign to the flux through a single row per reaction, or bounded the energy
/// by the indicator alone; neither is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopLawEncoding {
    #[default]
    IndicatorEnergy,
}

/// Which reactions get loop-law rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoopScope {
    /// Every cycle-capable reaction
    #[default]
    All,
    /// Reactions in the same component as one of the focus reactions
    Components(Vec<usize>),
    /// Reactions sharing an elementary flux mode with one of the focus reactions.
    /// Falls back to `Components` when links were not computed.
    Linked(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopLawOptions {
    pub preprocessing: Preprocessing,
    pub constants: BigM,
    pub encoding: LoopLawEncoding,
    pub scope: LoopScope,
    /// Share variables between reactions with (anti)parallel cycle rows
    pub merge_parallel: bool,
    /// Pause between successive enumerator runs
    pub settle_delay: Duration,
}

impl Default for LoopLawOptions {
    fn default() -> Self {
        Self {
            preprocessing: Preprocessing::default(),
            constants: BigM::default(),
            encoding: LoopLawEncoding::default(),
            scope: LoopScope::default(),
            merge_parallel: false,
            settle_delay: Duration::from_millis(250),
        }
    }
}

/// Row ranges of the appended constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopRows {
    pub flux_upper: Range<usize>,
    pub flux_lower: Range<usize>,
    pub energy_upper: Range<usize>,
    pub energy_lower: Range<usize>,
    pub cycle: Range<usize>,
}

/// Position of a reaction's variables among the appended columns.
///
/// A flipped reaction uses `1 - a` and `-g` of its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSlot {
    pub slot: usize,
    pub flipped: bool,
}

/// Where the loop-law rows and columns ended up in the augmented problem
#[derive(Debug, Clone, PartialEq)]
pub struct LoopLayout {
    pub rows: LoopRows,
    pub indicator_columns: Range<usize>,
    pub energy_columns: Range<usize>,
    /// Per model reaction
    pub slots: Vec<Option<LoopSlot>>,
    /// Representative reaction of each slot
    pub slot_reactions: Vec<usize>,
    /// Cycle-basis rows of the representative reactions (slots × cycles)
    pub slot_basis: CsMat<f64>,
}

/// Direction and energy of a reaction read off a solution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopState {
    pub forward: bool,
    pub energy: f64,
}

/// Network-level loop-law data, reusable across augmentations
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInfo {
    /// Reactions × cycles
    pub cycle_basis: CsMat<f64>,
    pub participation: Vec<LoopParticipation>,
    /// Component label per reaction, 0 for reactions outside every cycle
    pub components: Vec<usize>,
    pub links: ReactionLinks,
    pub constants: BigM,
    /// Filled by the builder
    pub layout: Option<LoopLayout>,
}

impl LoopInfo {
    pub fn num_components(&self) -> usize {
        self.components.iter().copied().max().unwrap_or(0)
    }

    /// Reactions with a nonzero basis row that may take part in a cycle
    pub fn cycle_capable(&self) -> Vec<bool> {
        cycle_rows(&self.cycle_basis)
            .into_iter()
            .zip(&self.participation)
            .map(|(nonzero, p)| nonzero && p.any())
            .collect()
    }

    pub fn indicator_column(&self, reaction: usize) -> Option<usize> {
        let layout = self.layout.as_ref()?;
        let slot = (*layout.slots.get(reaction)?)?;
        Some(layout.indicator_columns.start + slot.slot)
    }

    pub fn energy_column(&self, reaction: usize) -> Option<usize> {
        let layout = self.layout.as_ref()?;
        let slot = (*layout.slots.get(reaction)?)?;
        Some(layout.energy_columns.start + slot.slot)
    }

    /// Per-reaction direction and energy from a solution of the augmented problem.
    pub fn decode(&self, x: &[f64]) -> Vec<Option<LoopState>> {
        let Some(layout) = &self.layout else {
            return vec![None; self.components.len()];
        };

        layout
            .slots
            .iter()
            .map(|slot| {
                let slot = (*slot)?;
                let a = *x.get(layout.indicator_columns.start + slot.slot)?;
                let g = *x.get(layout.energy_columns.start + slot.slot)?;
                Some(LoopState {
                    forward: (a > 0.5) != slot.flipped,
                    energy: if slot.flipped { -g } else { g },
                })
            })
            .collect()
    }
}

/// Augmented problem together with the layout of what was added
#[derive(Debug, Clone)]
pub struct AugmentedMilp {
    /// `var_types` is always set
    pub lp: LinearProgram,
    pub info: LoopInfo,
    /// Starting point for solvers; left empty
    pub initial_solution: Vec<f64>,
}

/// Whether each row of `basis` has a nonzero entry
pub(crate) fn cycle_rows(basis: &CsMat<f64>) -> Vec<bool> {
    let mut rows = vec![false; basis.rows()];
    for (&v, (r, _)) in basis.iter() {
        if v != 0.0 {
            rows[r] = true;
        }
    }
    rows
}

/// Compute the network-dependent part of the loop law.
pub fn prepare_loop_info(
    model: &StoichiometricModel,
    options: &LoopLawOptions,
    provider: &dyn NullspaceProvider,
    enumerator: Option<&dyn EfmEnumerator>,
) -> Result<LoopInfo> {
    options.constants.validate()?;

    let strategy = options.preprocessing.strategy();
    info!(
        "Computing cycle space (level {}, {:?})",
        options.preprocessing.level(),
        strategy
    );
    let space = provider.cycle_space(model, strategy)?;
    let basis = space.basis.to_csr();

    let residual = verify_orthogonality(model, &basis)?;
    if residual > ORTHOGONALITY_TOLERANCE {
        return Err(LoopError::InvalidCycleBasis { residual }.into());
    }

    let nonzero = cycle_rows(&basis);
    let participation = match space.participation {
        Some(flags) => {
            if flags.len() != model.num_reactions() {
                return Err(LoopError::DimensionMismatch {
                    what: "loop participation flags",
                    expected: model.num_reactions(),
                    found: flags.len(),
                }
                .into());
            }
            flags
        }
        None => (0..model.num_reactions())
            .map(|r| match nonzero[r] {
                true => LoopParticipation::from_bounds(model.lb[r], model.ub[r]),
                false => LoopParticipation::default(),
            })
            .collect(),
    };

    let components = find_components(&basis);
    info!(
        "Cycle space has {} cycles over {} reactions in {} components",
        basis.cols(),
        nonzero.iter().filter(|x| **x).count(),
        components.iter().copied().max().unwrap_or(0)
    );

    let links = if options.preprocessing.links_reactions() {
        match enumerator {
            Some(enumerator) => link_reactions(
                model,
                &components,
                &participation,
                enumerator,
                options.settle_delay,
            ),
            None => {
                warn!("No EFM enumerator configured, reaction links unavailable");
                ReactionLinks::Unavailable
            }
        }
    } else {
        ReactionLinks::NotRequested
    };

    Ok(LoopInfo {
        cycle_basis: basis,
        participation,
        components,
        links,
        constants: options.constants,
        layout: None,
    })
}

fn check_reaction_index(
    lp: &LinearProgram,
    model: &StoichiometricModel,
    rxn_index: &[usize],
    info: &LoopInfo,
) -> Result<()> {
    let n = model.num_reactions();
    let checks = [
        ("reaction index map", rxn_index.len()),
        ("cycle basis rows", info.cycle_basis.rows()),
        ("loop participation flags", info.participation.len()),
        ("component labels", info.components.len()),
    ];
    for (what, found) in checks {
        if found != n {
            return Err(LoopError::DimensionMismatch {
                what,
                expected: n,
                found,
            }
            .into());
        }
    }

    let mut seen = HashSet::new();
    for (reaction, &column) in rxn_index.iter().enumerate() {
        if column >= lp.cols() {
            return Err(LoopError::IndexOutOfRange {
                reaction,
                column,
                columns: lp.cols(),
            }
            .into());
        }
        if !seen.insert(column) {
            return Err(LoopError::DuplicateColumn { column }.into());
        }
    }

    Ok(())
}

/// Keep only the basis entries of `keep` reactions and drop cycles left empty.
fn restrict_basis(basis: &CsMat<f64>, keep: &[bool]) -> CsMat<f64> {
    let mut used = vec![false; basis.cols()];
    for (&v, (r, c)) in basis.iter() {
        if keep[r] && v != 0.0 {
            used[c] = true;
        }
    }

    let mut new_column = vec![0; basis.cols()];
    let mut cols = 0;
    for (c, &u) in used.iter().enumerate() {
        if u {
            new_column[c] = cols;
            cols += 1;
        }
    }

    let mut restricted = TriMat::new((basis.rows(), cols));
    for (&v, (r, c)) in basis.iter() {
        if keep[r] && used[c] {
            restricted.add_triplet(r, new_column[c], v);
        }
    }
    restricted.to_csr()
}

fn focus_components(info: &LoopInfo, focus: &[usize]) -> Result<Vec<bool>> {
    let mut labels = HashSet::new();
    for &f in focus {
        let label = *info
            .components
            .get(f)
            .ok_or(LoopError::UnknownReaction(f))?;
        if label != 0 {
            labels.insert(label);
        }
    }
    Ok(info.components.iter().map(|l| labels.contains(l)).collect())
}

/// Cycle basis restricted to the reactions selected by `scope`.
fn localise(model: &StoichiometricModel, info: &LoopInfo, scope: &LoopScope) -> Result<CsMat<f64>> {
    match scope {
        LoopScope::All => Ok(info.cycle_basis.clone()),
        LoopScope::Components(focus) => {
            let keep = focus_components(info, focus)?;
            Ok(restrict_basis(&info.cycle_basis, &keep))
        }
        LoopScope::Linked(focus) => {
            if !info.links.is_computed() {
                warn!("Reaction links not available, restricting loop law to focus components");
                return localise(model, info, &LoopScope::Components(focus.clone()));
            }

            let in_component = focus_components(info, focus)?;
            let reactions: Vec<usize> = (0..model.num_reactions())
                .filter(|&r| in_component[r])
                .filter(|&r| focus.iter().any(|&f| info.links.linked(f, r) == Some(true)))
                .collect();
            Ok(internal_null_basis(model, &reactions))
        }
    }
}

/// Append the loop law to `lp`.
///
/// `rxn_index[r]` is the column of reaction `r` in `lp`. All consistency checks run
/// before anything is assembled.
pub fn add_loop_law(
    lp: &LinearProgram,
    model: &StoichiometricModel,
    rxn_index: &[usize],
    info: &LoopInfo,
    options: &LoopLawOptions,
) -> Result<AugmentedMilp> {
    lp.validate()?;
    check_reaction_index(lp, model, rxn_index, info)?;

    let basis = localise(model, info, &options.scope)?;
    let mut info = info.clone();
    info.constants = options.constants;

    let milp = build_loop_constraints(lp, rxn_index, &basis, info, options.encoding)?;
    info!(
        "Loop law added: {} rows, {} columns",
        milp.lp.rows(),
        milp.lp.cols()
    );

    if options.merge_parallel {
        merge_parallel_variables(milp)
    } else {
        Ok(milp)
    }
}
