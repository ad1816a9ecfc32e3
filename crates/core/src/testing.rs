//! In-process stand-ins for the comparison engine, shared by unit tests.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, IoContext, Result};
use crate::report::ReportLine;
use crate::runner::{ComparisonEngine, EngineRun};
use crate::types::{MatchRegion, NOBASE_THRESHOLD, Range};

pub(crate) fn region(a: (u32, u32), b: (u32, u32), tokens: i64) -> MatchRegion {
    MatchRegion::new(Range::new(a.0, a.1), Range::new(b.0, b.1), tokens)
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    fs::write(path, contents).at(path)
}

/// A scripted match between the submissions whose names end with `a` and `b`.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedMatch {
    pub a: String,
    pub b: String,
    pub tokens: i64,
    pub regions: Vec<MatchRegion>,
    /// Result of the isolated no-baseline run; defaults to the primary match.
    pub nobase: Option<(i64, Vec<MatchRegion>)>,
}

impl ScriptedMatch {
    pub fn new(a: &str, b: &str, tokens: i64, regions: Vec<MatchRegion>) -> Self {
        Self {
            a: a.to_string(),
            b: b.to_string(),
            tokens,
            regions,
            nobase: None,
        }
    }

    pub fn with_nobase(mut self, tokens: i64, regions: Vec<MatchRegion>) -> Self {
        self.nobase = Some((tokens, regions));
        self
    }
}

struct ManifestEntry {
    name: String,
    lines: i64,
}

/// Reads the manifest like the real engine and reports the scripted matches it covers.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    matches: Vec<ScriptedMatch>,
    /// Per-submission token totals keyed by name suffix; 100 when absent.
    tokens: Vec<(String, i64)>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedEngine {
    pub fn new(matches: Vec<ScriptedMatch>) -> Self {
        Self {
            matches,
            ..Self::default()
        }
    }

    pub fn with_tokens(mut self, suffix: &str, tokens: i64) -> Self {
        self.tokens.push((suffix.to_string(), tokens));
        self
    }

    /// Thresholds of every invocation so far, in call order.
    pub fn calls(&self) -> Vec<u32> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn tokens_for(&self, name: &str) -> i64 {
        self.tokens
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix.as_str()))
            .map_or(100, |&(_, tokens)| tokens)
    }

    fn read_manifest(run: &EngineRun<'_>) -> Result<Vec<ManifestEntry>> {
        let text = fs::read_to_string(run.manifest).at(run.manifest)?;
        let mut out = Vec::new();
        for line in text.lines() {
            let mut fields = line.splitn(4, ' ');
            let (Some(copy), Some(_id), Some(_lang), Some(name)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::protocol(line, "bad manifest line"));
            };
            let path = run.workdir.join(copy);
            let body = fs::read_to_string(&path).at(&path)?;
            out.push(ManifestEntry {
                name: name.to_string(),
                lines: body.lines().count() as i64 + 1,
            });
        }
        Ok(out)
    }

    fn line(
        &self,
        a: &ManifestEntry,
        b: &ManifestEntry,
        tokens: i64,
        regions: Vec<MatchRegion>,
    ) -> ReportLine {
        let totals = [self.tokens_for(&a.name), self.tokens_for(&b.name)];
        let pct = |total: i64| if total > 0 { tokens * 100 / total } else { 0 };
        ReportLine {
            names: [a.name.clone(), b.name.clone()],
            tokens,
            lines: regions.iter().map(|r| i64::from(r.a.len())).sum(),
            total_tokens: totals,
            total_lines: [a.lines, b.lines],
            percent_matched: [pct(totals[0]), pct(totals[1])],
            regions,
        }
    }
}

impl ComparisonEngine for ScriptedEngine {
    fn compare(&self, run: &EngineRun<'_>) -> Result<()> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(run.threshold),
            Err(poisoned) => poisoned.into_inner().push(run.threshold),
        }

        let entries = Self::read_manifest(run)?;
        let find = |suffix: &str| entries.iter().find(|e| e.name.ends_with(suffix));

        let mut out = String::new();
        for m in &self.matches {
            let (Some(a), Some(b)) = (find(&m.a), find(&m.b)) else {
                continue;
            };
            if std::ptr::eq(a, b) {
                continue;
            }
            let (tokens, regions) = match (&m.nobase, run.threshold == NOBASE_THRESHOLD) {
                (Some((tokens, regions)), true) => (*tokens, regions.clone()),
                _ => (m.tokens, m.regions.clone()),
            };
            out.push_str(&self.line(a, b, tokens, regions).to_string());
            out.push('\n');
        }
        fs::write(run.results, out).at(run.results)
    }
}

/// Fails every invocation the way a misconfigured engine would.
pub(crate) struct FailingEngine;

impl ComparisonEngine for FailingEngine {
    fn compare(&self, _run: &EngineRun<'_>) -> Result<()> {
        Err(Error::EngineInvocation {
            binary: "fake".to_string(),
            stderr: "boom".to_string(),
        })
    }
}

/// Writes the same canned result text for every invocation.
pub(crate) struct CannedEngine(pub String);

impl ComparisonEngine for CannedEngine {
    fn compare(&self, run: &EngineRun<'_>) -> Result<()> {
        fs::write(run.results, &self.0).at(run.results)
    }
}
