//! EFM-based reaction links.
//!
//! Each connected component is handed to an external elementary-flux-mode
//! enumerator that only reports sign patterns. Two reactions are linked when some
//! mode uses both. Enumeration failures never abort the pipeline: the whole
//! result becomes [`ReactionLinks::Unavailable`] and the caller falls back to
//! component-wide constraints.

use std::{
    collections::{BTreeMap, BTreeSet},
    env,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Mutex,
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use itertools::iproduct;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use sprs::{CsMat, TriMat};

use super::{LoopParticipation, ReactionLinks};
use crate::model::StoichiometricModel;

lazy_static! {
    /// Enumerator runs are strictly sequential across the process.
    static ref EFM_LOCK: Mutex<()> = Mutex::new(());
}

/// External elementary-flux-mode enumeration in sign-only mode
pub trait EfmEnumerator {
    /// Whether a usable installation exists. Must not fail.
    fn is_available(&self) -> bool;

    /// Directory to run the enumerator from, if it needs one
    fn working_dir(&self) -> Option<&Path> {
        None
    }

    /// Sign vectors (-1, 0, 1) over the columns of `stoichiometry`, one per mode.
    fn enumerate(&self, stoichiometry: &CsMat<f64>, reversible: &[bool]) -> Result<Vec<Vec<i8>>>;
}

/// Switches the process working directory and restores it when dropped.
pub struct WorkingDirGuard {
    previous: PathBuf,
}

impl WorkingDirGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let previous = env::current_dir().context("reading current directory")?;
        env::set_current_dir(dir).with_context(|| format!("entering {}", dir.display()))?;
        Ok(Self { previous })
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.previous) {
            error!(
                "Failed to restore working directory {}: {}",
                self.previous.display(),
                e
            );
        }
    }
}

/// Enumerator run as `./<program> --signs` from its installation directory.
///
/// The program reads `m n`, a line of `n` reversibility flags (0/1) and `m` rows of
/// the dense stoichiometry from stdin, and prints one line of `n` signs per mode.
#[derive(Debug, Clone)]
pub struct CommandEfmEnumerator {
    pub install_dir: PathBuf,
    pub program: String,
}

impl CommandEfmEnumerator {
    pub fn new(install_dir: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            install_dir: install_dir.into(),
            program: program.into(),
        }
    }

    fn input(stoichiometry: &CsMat<f64>, reversible: &[bool]) -> String {
        let (m, n) = stoichiometry.shape();
        let mut dense = vec![vec![0.0; n]; m];
        for (&v, (i, j)) in stoichiometry.iter() {
            dense[i][j] = v;
        }

        let flags: Vec<&str> = reversible.iter().map(|&r| if r { "1" } else { "0" }).collect();
        let mut input = format!("{m} {n}\n{}\n", flags.join(" "));
        for row in dense {
            let row: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            input.push_str(&row.join(" "));
            input.push('\n');
        }
        input
    }
}

impl EfmEnumerator for CommandEfmEnumerator {
    fn is_available(&self) -> bool {
        self.install_dir.join(&self.program).is_file()
    }

    fn working_dir(&self) -> Option<&Path> {
        Some(&self.install_dir)
    }

    fn enumerate(&self, stoichiometry: &CsMat<f64>, reversible: &[bool]) -> Result<Vec<Vec<i8>>> {
        let program = format!("./{}", self.program);
        let mut child = Command::new(&program)
            .arg("--signs")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let Some(mut stdin) = child.stdin.take() else {
            // reap before reporting
            let _ = child.kill();
            let _ = child.wait();
            bail!("no stdin for {program}");
        };
        let input = Self::input(stoichiometry, reversible);

        // the tool may fill its output pipes before reading all of its input
        let (written, out) = thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(input.as_bytes()));
            let out = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            (written, out)
        });
        let out = out.with_context(|| format!("waiting for {program}"))?;

        if !out.status.success() {
            bail!(
                "{} exited with {}: {}",
                program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }

        written.with_context(|| format!("writing problem to {program}"))?;

        String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split_whitespace()
                    .map(|s| match s.parse::<i8>() {
                        Ok(sign @ -1..=1) => Ok(sign),
                        _ => Err(anyhow!("invalid sign '{s}' in enumerator output")),
                    })
                    .collect::<Result<Vec<i8>>>()
            })
            .collect()
    }
}

/// Stoichiometry of one component over the metabolites it touches, with
/// reverse-only reactions negated, and the reversibility flags.
fn component_stoichiometry(
    model: &StoichiometricModel,
    members: &[usize],
    participation: &[LoopParticipation],
) -> (CsMat<f64>, Vec<bool>) {
    let metabolites: BTreeSet<usize> = members
        .iter()
        .flat_map(|&r| model.column(r))
        .map(|(i, _)| i)
        .collect();
    let local: BTreeMap<usize, usize> = metabolites
        .iter()
        .enumerate()
        .map(|(k, &i)| (i, k))
        .collect();

    let mut sub = TriMat::new((local.len(), members.len()));
    for (k, &r) in members.iter().enumerate() {
        let p = participation[r];
        let sign = if p.reverse && !p.forward { -1.0 } else { 1.0 };
        for (i, v) in model.column(r) {
            sub.add_triplet(local[&i], k, sign * v);
        }
    }

    let reversible = members
        .iter()
        .map(|&r| participation[r].reverse && participation[r].forward)
        .collect();
    (sub.to_csr(), reversible)
}

fn enumerate_links(
    model: &StoichiometricModel,
    components: &[usize],
    participation: &[LoopParticipation],
    enumerator: &dyn EfmEnumerator,
    settle_delay: Duration,
) -> Result<CsMat<u8>> {
    let _lock = EFM_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let n = model.num_reactions();
    let count = components.iter().copied().max().unwrap_or(0);
    let mut pairs = BTreeSet::new();

    for label in 1..=count {
        let members: Vec<usize> = (0..n).filter(|&r| components[r] == label).collect();
        let (sub, reversible) = component_stoichiometry(model, &members, participation);

        if label > 1 {
            thread::sleep(settle_delay);
        }

        let modes = {
            let _cwd = match enumerator.working_dir() {
                Some(dir) => Some(WorkingDirGuard::enter(dir)?),
                None => None,
            };
            enumerator
                .enumerate(&sub, &reversible)
                .with_context(|| format!("enumerating modes of component {label}"))?
        };
        debug!(
            "Component {}: {} reactions, {} metabolites, {} modes",
            label,
            members.len(),
            sub.rows(),
            modes.len()
        );

        for mode in &modes {
            if mode.len() != members.len() {
                bail!(
                    "mode of length {} for component {} with {} reactions",
                    mode.len(),
                    label,
                    members.len()
                );
            }

            let support: Vec<usize> = mode
                .iter()
                .zip(&members)
                .filter(|(sign, _)| **sign != 0)
                .map(|(_, &r)| r)
                .collect();
            pairs.extend(iproduct!(support.iter().copied(), support.iter().copied()));
        }
    }

    let mut links = TriMat::new((n, n));
    for (i, j) in pairs {
        links.add_triplet(i, j, 1u8);
    }
    Ok(links.to_csr())
}

/// Link reactions that share an elementary flux mode within their component.
pub fn link_reactions(
    model: &StoichiometricModel,
    components: &[usize],
    participation: &[LoopParticipation],
    enumerator: &dyn EfmEnumerator,
    settle_delay: Duration,
) -> ReactionLinks {
    if !enumerator.is_available() {
        warn!("EFM enumerator not available, reaction links not computed");
        return ReactionLinks::Unavailable;
    }

    info!("Enumerating elementary flux modes");
    match enumerate_links(model, components, participation, enumerator, settle_delay) {
        Ok(links) => ReactionLinks::Computed(links),
        Err(e) => {
            error!("EFM enumeration failed, discarding reaction links: {e:#}");
            ReactionLinks::Unavailable
        }
    }
}
