//! CPLEX LP output of augmented problems.

use std::collections::HashSet;
use std::io::{self, Write};

use lazy_static::*;
use regex::Regex;
use sprs::CsMat;

use crate::loop_law::AugmentedMilp;
use crate::lp_solver::{ConstraintSense, VariableType};
use crate::model::StoichiometricModel;
use crate::program::LinearProgram;

/// Reduce an identifier to the characters every LP reader accepts.
pub fn sanitize(s: &str) -> String {
    lazy_static! {
        static ref INVALID_RE: Regex = Regex::new(r"[^A-Za-z0-9_]").unwrap();
    }

    INVALID_RE.replace_all(s, "_").into_owned()
}

/// Column names: `v_<id>` for reactions, `a_<id>`/`g_<id>` for their loop-law
/// variables and `x<j>` for anything else. Clashes get the column index appended.
pub fn column_names(
    model: &StoichiometricModel,
    rxn_index: &[usize],
    milp: &AugmentedMilp,
) -> Vec<String> {
    let mut names: Vec<Option<String>> = vec![None; milp.lp.cols()];

    for (r, &j) in rxn_index.iter().enumerate() {
        names[j] = Some(format!("v_{}", sanitize(&model.reactions[r])));
    }
    if let Some(layout) = &milp.info.layout {
        for (slot, &r) in layout.slot_reactions.iter().enumerate() {
            let id = sanitize(&model.reactions[r]);
            names[layout.indicator_columns.start + slot] = Some(format!("a_{id}"));
            names[layout.energy_columns.start + slot] = Some(format!("g_{id}"));
        }
    }

    let mut seen = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(j, name)| {
            let name = name.unwrap_or_else(|| format!("x{j}"));
            if seen.insert(name.clone()) {
                name
            } else {
                let unique = format!("{name}_{j}");
                seen.insert(unique.clone());
                unique
            }
        })
        .collect()
}

fn write_terms<W: Write>(
    writer: &mut W,
    terms: impl Iterator<Item = (usize, f64)>,
    names: &[String],
) -> io::Result<bool> {
    let mut any = false;
    for (j, v) in terms.filter(|(_, v)| *v != 0.0) {
        write!(writer, " {:+} {}", v, names[j])?;
        any = true;
    }
    Ok(any)
}

fn write_quadratic<W: Write>(writer: &mut W, f: &CsMat<f64>, names: &[String]) -> io::Result<()> {
    // ½ xᵀFx: diagonal terms as x^2, off-diagonal pairs folded into i < j
    let mut terms = std::collections::BTreeMap::new();
    for (&v, (i, j)) in f.iter() {
        *terms.entry((i.min(j), i.max(j))).or_insert(0.0) += v;
    }

    let mut terms = terms.into_iter().filter(|(_, v)| *v != 0.0).peekable();
    if terms.peek().is_none() {
        return Ok(());
    }

    write!(writer, " + [")?;
    for ((i, j), v) in terms {
        if i == j {
            write!(writer, " {:+} {} ^2", v, names[i])?;
        } else {
            write!(writer, " {:+} {} * {}", v, names[i], names[j])?;
        }
    }
    write!(writer, " ] / 2")
}

fn write_bound<W: Write>(writer: &mut W, name: &str, lb: f64, ub: f64) -> io::Result<()> {
    match (lb.is_finite(), ub.is_finite()) {
        (false, false) => writeln!(writer, " {name} free"),
        (true, false) => writeln!(writer, " {name} >= {lb}"),
        (false, true) => writeln!(writer, " -inf <= {name} <= {ub}"),
        (true, true) if lb == ub => writeln!(writer, " {name} = {lb}"),
        (true, true) => writeln!(writer, " {lb} <= {name} <= {ub}"),
    }
}

/// Write `lp` in CPLEX LP format using `names` for the columns.
pub fn write_lp<W: Write>(writer: &mut W, lp: &LinearProgram, names: &[String]) -> io::Result<()> {
    writeln!(writer, "\\ {} rows, {} columns", lp.rows(), lp.cols())?;
    writeln!(writer, "Minimize")?;
    write!(writer, " obj:")?;
    let linear = write_terms(writer, lp.c.iter().copied().enumerate(), names)?;
    if !linear && lp.quadratic.is_none() {
        if let Some(first) = names.first() {
            write!(writer, " 0 {first}")?;
        }
    }
    if let Some(f) = &lp.quadratic {
        write_quadratic(writer, f, names)?;
    }
    writeln!(writer)?;

    writeln!(writer, "Subject To")?;
    let a = lp.a.to_csr();
    for (i, row) in a.outer_iterator().enumerate() {
        write!(writer, " c{i}:")?;
        if !write_terms(writer, row.iter().map(|(j, &v)| (j, v)), names)? {
            if let Some(first) = names.first() {
                write!(writer, " 0 {first}")?;
            }
        }
        let sense = match lp.sense[i] {
            ConstraintSense::LessEqual => "<=",
            ConstraintSense::Equal => "=",
            ConstraintSense::GreaterEqual => ">=",
        };
        writeln!(writer, " {} {}", sense, lp.b[i])?;
    }

    writeln!(writer, "Bounds")?;
    let types = lp.variable_types();
    for (j, name) in names.iter().enumerate() {
        if types[j] != VariableType::Binary {
            write_bound(writer, name, lp.lb[j], lp.ub[j])?;
        }
    }

    for (section, kind) in [("Generals", VariableType::Integer), ("Binaries", VariableType::Binary)] {
        let columns: Vec<&String> = names
            .iter()
            .zip(&types)
            .filter(|(_, t)| **t == kind)
            .map(|(name, _)| name)
            .collect();
        if !columns.is_empty() {
            writeln!(writer, "{section}")?;
            for name in columns {
                writeln!(writer, " {name}")?;
            }
        }
    }

    writeln!(writer, "End")
}
