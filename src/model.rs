//! Stoichiometric model of a metabolic network
//!
//! Models can be built directly from a stoichiometric matrix or read from a small
//! reaction-equation format, one reaction per line:
//!
//! ```text
//! # id: reactants -> products [lb, ub]
//! EX_glc: -> glc            [0, 10]
//! HEX: glc + atp -> g6p + adp
//! PGI: g6p <=> f6p
//! OUT: 2 f6p ->             [0, 1000]
//! ```
//!
//! `->` reactions default to `[0, 1000]`, `<=>` reactions to `[-1000, 1000]`. An
//! empty side makes the reaction an exchange with the environment.

use std::{collections::HashMap, fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use sprs::{CsMat, TriMat};

use crate::LoopError;
use crate::lp_solver::ConstraintSense;
use crate::program::LinearProgram;

/// Default bound magnitude for reactions without explicit bounds
pub const DEFAULT_BOUND: f64 = 1000.0;

/// Metabolic network: reactions, metabolites, stoichiometry and flux bounds.
///
/// `s` is metabolites × reactions and stored column-major, since every consumer
/// walks it reaction by reaction.
#[derive(Debug, Clone)]
pub struct StoichiometricModel {
    pub reactions: Vec<String>,
    pub metabolites: Vec<String>,
    pub s: CsMat<f64>,
    pub lb: Vec<f64>,
    pub ub: Vec<f64>,
}

impl StoichiometricModel {
    pub fn new(
        reactions: Vec<String>,
        metabolites: Vec<String>,
        s: CsMat<f64>,
        lb: Vec<f64>,
        ub: Vec<f64>,
    ) -> Result<Self> {
        let n = reactions.len();
        let checks = [
            ("stoichiometry rows", metabolites.len(), s.rows()),
            ("stoichiometry columns", n, s.cols()),
            ("length of lb", n, lb.len()),
            ("length of ub", n, ub.len()),
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

        Ok(Self {
            reactions,
            metabolites,
            s: s.to_csc(),
            lb,
            ub,
        })
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn num_metabolites(&self) -> usize {
        self.metabolites.len()
    }

    pub fn reaction_index(&self, id: &str) -> Option<usize> {
        self.reactions.iter().position(|r| r == id)
    }

    /// Nonzero stoichiometric coefficients of a reaction as (metabolite, coefficient)
    pub fn column(&self, reaction: usize) -> Vec<(usize, f64)> {
        self.s
            .outer_view(reaction)
            .map(|col| {
                col.iter()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(i, &v)| (i, v))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A reaction whose bounds are both zero can never carry flux.
    pub fn is_blocked(&self, reaction: usize) -> bool {
        self.lb[reaction] == 0.0 && self.ub[reaction] == 0.0
    }

    /// A reaction crossing the system boundary: it only consumes or only produces.
    pub fn is_exchange(&self, reaction: usize) -> bool {
        let column = self.column(reaction);
        column.iter().all(|(_, v)| *v > 0.0) || column.iter().all(|(_, v)| *v < 0.0)
    }

    /// Reactions that may take part in internal cycles (not exchange, not blocked)
    pub fn internal_reactions(&self) -> Vec<usize> {
        (0..self.num_reactions())
            .filter(|&j| !self.is_exchange(j) && !self.is_blocked(j))
            .collect()
    }

    /// Flux balance problem `S v = 0, lb ≤ v ≤ ub` with zero cost.
    ///
    /// Column `j` of the problem is reaction `j` of the model.
    pub fn to_linear_program(&self) -> LinearProgram {
        let (m, n) = (self.num_metabolites(), self.num_reactions());
        LinearProgram {
            a: self.s.to_csr(),
            b: vec![0.0; m],
            c: vec![0.0; n],
            lb: self.lb.clone(),
            ub: self.ub.clone(),
            sense: vec![ConstraintSense::Equal; m],
            quadratic: None,
            var_types: None,
        }
    }
}

lazy_static! {
    static ref REACTION_RE: Regex = Regex::new(
        r"^\s*([^:\s]+)\s*:\s*(.*?)\s*(<=>|->)\s*(.*?)\s*(?:\[\s*([^,\]]+?)\s*,\s*([^\]]+?)\s*\])?\s*$"
    )
    .unwrap();
    static ref TERM_RE: Regex =
        Regex::new(r"^(?:([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s+)?(\S+)$").unwrap();
    static ref PLUS_RE: Regex = Regex::new(r"\s+\+\s+").unwrap();
}

fn parse_error(line: usize, message: impl Into<String>) -> anyhow::Error {
    LoopError::Parse {
        line,
        message: message.into(),
    }
    .into()
}

fn parse_side(
    side: &str,
    sign: f64,
    line: usize,
    metabolites: &mut Vec<String>,
    index: &mut HashMap<String, usize>,
) -> Result<Vec<(usize, f64)>> {
    if side.is_empty() {
        return Ok(Vec::new());
    }

    PLUS_RE
        .split(side)
        .map(|term| {
            let caps = TERM_RE
                .captures(term.trim())
                .ok_or_else(|| parse_error(line, format!("cannot read species term '{term}'")))?;
            let coefficient = match caps.get(1) {
                Some(c) => c
                    .as_str()
                    .parse::<f64>()
                    .map_err(|e| parse_error(line, e.to_string()))?,
                None => 1.0,
            };
            let name = caps[2].to_string();
            let next = metabolites.len();
            let i = *index.entry(name.clone()).or_insert_with(|| {
                metabolites.push(name);
                next
            });
            Ok((i, sign * coefficient))
        })
        .collect()
}

impl FromStr for StoichiometricModel {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut reactions = Vec::new();
        let mut metabolites = Vec::new();
        let mut met_index = HashMap::new();
        let mut entries = Vec::new();
        let (mut lb, mut ub) = (Vec::new(), Vec::new());

        for (lineno, raw) in input.lines().enumerate() {
            let line = lineno + 1;
            let text = raw.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }

            let caps = REACTION_RE
                .captures(text)
                .ok_or_else(|| parse_error(line, "expected 'id: reactants -> products'"))?;
            let id = caps[1].to_string();
            if reactions.contains(&id) {
                return Err(parse_error(line, format!("duplicate reaction '{id}'")));
            }
            let reversible = &caps[3] == "<=>";

            let j = reactions.len();
            for side in [(&caps[2], -1.0), (&caps[4], 1.0)] {
                for (i, v) in parse_side(side.0, side.1, line, &mut metabolites, &mut met_index)? {
                    entries.push((i, j, v));
                }
            }

            let bounds = match (caps.get(5), caps.get(6)) {
                (Some(l), Some(u)) => {
                    let read = |s: &str| {
                        s.parse::<f64>()
                            .map_err(|e| parse_error(line, format!("bound '{s}': {e}")))
                    };
                    (read(l.as_str())?, read(u.as_str())?)
                }
                _ if reversible => (-DEFAULT_BOUND, DEFAULT_BOUND),
                _ => (0.0, DEFAULT_BOUND),
            };
            if bounds.0 > bounds.1 {
                return Err(parse_error(line, "lower bound above upper bound"));
            }

            reactions.push(id);
            lb.push(bounds.0);
            ub.push(bounds.1);
        }

        let mut s = TriMat::new((metabolites.len(), reactions.len()));
        for (i, j, v) in entries {
            s.add_triplet(i, j, v);
        }

        Self::new(reactions, metabolites, s.to_csc(), lb, ub)
    }
}

/// Read a model in the reaction-equation format.
pub fn read_model(path: &Path) -> Result<StoichiometricModel> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    contents
        .parse()
        .with_context(|| format!("parsing {}", path.display()))
}
