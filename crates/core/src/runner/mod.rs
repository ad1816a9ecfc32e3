//! One comparison of a submission set: a primary engine pass over every submission, top-K
//! selection, then an isolated no-baseline pass per selected pair to separate common code.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{Error, IoContext, Result};
use crate::pair::{Pair, PairSide};
use crate::report::{ReportLine, read_report};
use crate::submission::{Submission, SubmissionSet};
use crate::types::{MatchRegion, NOBASE_THRESHOLD, RunnerOptions, SubmissionKind};
use crate::util::timed;

mod engine;


pub use engine::{ComparisonEngine, EngineRun, MossEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Init,
    Manifested,
    Compared,
    TopSelected,
    Reconciled,
    Done,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Manifested => "manifested",
            Self::Compared => "compared",
            Self::TopSelected => "top-selected",
            Self::Reconciled => "reconciled",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

pub struct ComparisonRunner<'e> {
    engine: &'e dyn ComparisonEngine,
    options: RunnerOptions,
    workspace: TempDir,
    submits: SubmissionSet,
    state: RunnerState,
}

impl<'e> ComparisonRunner<'e> {
    /// Creates a runner with a private `moss_*` workspace, removed when the runner is dropped.
    pub fn new(engine: &'e dyn ComparisonEngine, options: RunnerOptions) -> Result<Self> {
        options.validate()?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("moss_");
        let workspace = match &options.temp_root {
            Some(root) => {
                fs::create_dir_all(root).at(root)?;
                builder.tempdir_in(root).at(root)?
            }
            None => builder.tempdir().at(std::env::temp_dir())?,
        };
        let submits = SubmissionSet::new(options.language, workspace.path());

        Ok(Self {
            engine,
            options,
            workspace,
            submits,
            state: RunnerState::Init,
        })
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn submissions(&self) -> &SubmissionSet {
        &self.submits
    }

    pub fn add(&mut self, dir: &Path, kind: SubmissionKind, name: Option<&str>) -> Result<()> {
        self.expect_state(RunnerState::Init, "add submissions")?;
        self.submits.add(dir, kind, name)?;
        Ok(())
    }

    pub fn add_all(
        &mut self,
        dir: &Path,
        kind: SubmissionKind,
        prefix: Option<&str>,
        skip: &[String],
    ) -> Result<usize> {
        self.expect_state(RunnerState::Init, "add submissions")?;
        self.submits.add_all(dir, kind, prefix, skip)
    }

    /// Drives the runner from `Init` to `Done` and returns the selected, reconciled pairs.
    pub fn run(&mut self) -> Result<Vec<Pair>> {
        self.expect_state(RunnerState::Init, "run")?;
        info!(
            submissions = self.submits.len(),
            starter = self.submits.count(SubmissionKind::Starter),
            current = self.submits.count(SubmissionKind::Current),
            archive = self.submits.count(SubmissionKind::Archive),
            "starting comparison"
        );

        let manifest = self.workspace.path().join("manifest");
        timed("manifest", || self.submits.write_manifest(&manifest, None))?;
        self.state = RunnerState::Manifested;

        let pairs = timed("compare", || self.compare(&manifest))?;
        self.state = RunnerState::Compared;

        let npairs = self.options.npairs;
        let mut pairs = timed("select top pairs", || Ok(select_top_pairs(pairs, npairs)))?;
        self.state = RunnerState::TopSelected;

        timed("reconcile", || {
            for (idx, pair) in pairs.iter_mut().enumerate() {
                self.reconcile(idx, pair)?;
            }
            Ok(())
        })?;
        self.state = RunnerState::Reconciled;

        self.state = RunnerState::Done;
        Ok(pairs)
    }

    fn expect_state(&self, want: RunnerState, action: &str) -> Result<()> {
        if self.state != want {
            return Err(Error::config(format!(
                "cannot {action}: runner is {}, expected {want}",
                self.state
            )));
        }
        Ok(())
    }

    fn invoke(&self, manifest: &Path, results: PathBuf, threshold: u32) -> Result<Vec<ReportLine>> {
        self.engine.compare(&EngineRun {
            workdir: self.workspace.path(),
            manifest,
            results: &results,
            threshold,
        })?;
        read_report(&results)
    }

    fn record_stats(&mut self, line: &ReportLine) -> Result<[Submission; 2]> {
        let raw = line.to_string();
        let a = self
            .submits
            .record_engine_stats(&line.names[0], line.total_tokens[0], line.total_lines[0], &raw)?
            .clone();
        let b = self
            .submits
            .record_engine_stats(&line.names[1], line.total_tokens[1], line.total_lines[1], &raw)?
            .clone();
        Ok([a, b])
    }

    fn compare(&mut self, manifest: &Path) -> Result<Vec<Pair>> {
        let results = self.workspace.path().join("results");
        let lines = self.invoke(manifest, results, self.options.threshold)?;

        let has_submit_num = self.options.has_submit_num;
        let mut pairs = Vec::with_capacity(lines.len());
        for line in lines {
            let [a, b] = self.record_stats(&line)?;
            pairs.push(Pair::new(
                PairSide::from_submission(&a, has_submit_num),
                PairSide::from_submission(&b, has_submit_num),
                line.tokens,
                line.regions,
            ));
        }
        debug!(pairs = pairs.len(), "parsed engine report");
        Ok(pairs)
    }

    /// Runs the pair alone at the no-baseline threshold and classifies its lines.
    fn reconcile(&mut self, idx: usize, pair: &mut Pair) -> Result<()> {
        let [name_a, name_b] = pair.names();
        let (Some(a), Some(b)) = (
            self.submits.get(name_a).cloned(),
            self.submits.get(name_b).cloned(),
        ) else {
            return Err(Error::protocol(
                pair.to_string(),
                "selected pair names an unregistered submission",
            ));
        };

        let manifest = self.workspace.path().join(format!("manifest.{idx}"));
        self.submits.write_manifest(&manifest, Some([&a, &b]))?;
        let results = self.workspace.path().join(format!("results.{idx}"));
        let lines = self.invoke(&manifest, results, NOBASE_THRESHOLD)?;

        match lines.as_slice() {
            [] => pair.find_common(0, &[])?,
            [line] => {
                self.record_stats(line)?;
                let regions = oriented_regions(line, &a.name, &b.name).ok_or_else(|| {
                    Error::protocol(line.to_string(), format!("expected pair {pair}"))
                })?;
                pair.find_common(line.tokens, &regions)?;
            }
            [_, extra, ..] => {
                return Err(Error::protocol(
                    extra.to_string(),
                    "no-baseline run of a single pair reported more than one pair",
                ));
            }
        }
        pair.calc_percent()?;
        debug!(pair = %pair, "reconciled pair");
        Ok(())
    }
}

/// Regions of `line` with side `a` first, or `None` when the line is about a different pair.
fn oriented_regions(line: &ReportLine, a: &str, b: &str) -> Option<Vec<MatchRegion>> {
    let [x, y] = &line.names;
    if x == a && y == b {
        return Some(line.regions.clone());
    }
    if x == b && y == a {
        return Some(
            line.regions
                .iter()
                .map(|r| MatchRegion::new(r.b, r.a, r.tokens))
                .collect(),
        );
    }
    None
}

/// Orders pairs by matched tokens (stable for ties) and keeps them until `k` non-self pairs
/// are taken. Self pairs stay in the output but do not count toward `k`.
pub fn select_top_pairs(mut pairs: Vec<Pair>, k: usize) -> Vec<Pair> {
    pairs.sort_by(|x, y| y.tokens.matched.cmp(&x.tokens.matched));

    let mut out = Vec::new();
    let mut taken = 0;
    for pair in pairs {
        if taken >= k {
            break;
        }
        if !pair.is_self {
            taken += 1;
        }
        out.push(pair);
    }
    out
}
