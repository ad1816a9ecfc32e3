use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Names containing this sequence would be ambiguous in the engine's pair lines.
pub const PAIR_SEPARATOR: &str = " + ";

/// First numeric manifest ID handed to archive submissions.
pub const ARCHIVE_ID_OFFSET: u32 = 1_000_000;

/// Threshold used for reconciliation runs; large enough that nothing is filtered as boilerplate.
pub const NOBASE_THRESHOLD: u32 = 1_000_000;

pub const DEFAULT_THRESHOLD: u32 = 1_000_000;

pub const DEFAULT_NPAIRS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubmissionKind {
    Starter,
    Current,
    Archive,
}

impl SubmissionKind {
    pub(crate) fn slot(self) -> usize {
        match self {
            Self::Starter => 0,
            Self::Current => 1,
            Self::Archive => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "STARTER",
            Self::Current => "CURRENT",
            Self::Archive => "ARCHIVE",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Ascii,
    C,
    Cc,
    Java,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::C => "c",
            Self::Cc => "cc",
            Self::Java => "java",
        }
    }

    /// File globs read from a submission directory.
    pub fn file_globs(self) -> &'static [&'static str] {
        match self {
            Self::Ascii => &["*"],
            Self::C => &["*.c", "*.h"],
            Self::Cc => &["*.cc", "*.cpp", "*.h"],
            Self::Java => &["*.java"],
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "c" => Ok(Self::C),
            "cc" | "cpp" | "c++" => Ok(Self::Cc),
            "java" => Ok(Self::Java),
            other => Err(Error::config(format!("unsupported language: {other}"))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive, 1-indexed line interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchRegion {
    pub a: Range,
    pub b: Range,
    pub tokens: i64,
}

impl MatchRegion {
    pub fn new(a: Range, b: Range, tokens: i64) -> Self {
        Self { a, b, tokens }
    }

    pub fn side(&self, side: usize) -> Range {
        if side == 0 { self.a } else { self.b }
    }
}

/// What a highlighted line segment belongs to after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTag {
    /// Index into the pair's sorted match regions.
    Match(usize),
    /// Matched only when boilerplate is not filtered.
    Common,
    /// Not covered by any region.
    Unmatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HighlightRegion {
    pub range: Range,
    pub tag: RegionTag,
}

/// A point in a student's history, keyed by commit identity and time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot {
    pub hash: String,
    pub timestamp: i64,
}

impl Snapshot {
    pub fn dir_name(&self, student: &str) -> String {
        format!("{student}_{}_{}", self.timestamp, self.hash)
    }
}

/// Best match for one student at one snapshot, or across all snapshots.
///
/// `other` is `None` when no genuine opposing match exists; it is persisted as an empty field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub student: String,
    pub other: Option<String>,
    pub snapshot: String,
    pub score: f64,
}

impl MatchRecord {
    pub fn placeholder(student: impl Into<String>, snapshot: impl Into<String>) -> Self {
        Self {
            student: student.into(),
            other: None,
            snapshot: snapshot.into(),
            score: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub language: Language,
    pub threshold: u32,
    pub npairs: usize,
    /// Parent for per-run workspaces; the system temp dir when unset.
    pub temp_root: Option<PathBuf>,
    /// Archive directory names carry a `_<submission>` suffix after the author.
    pub has_submit_num: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            language: Language::Java,
            threshold: DEFAULT_THRESHOLD,
            npairs: DEFAULT_NPAIRS,
            temp_root: None,
            has_submit_num: true,
        }
    }
}

impl RunnerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.threshold <= 1 {
            return Err(Error::config(format!(
                "threshold must be > 1 (got {})",
                self.threshold
            )));
        }
        if self.npairs == 0 {
            return Err(Error::config("npairs must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub out_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub final_submissions_prefix: String,
    pub online_dir: PathBuf,
    pub starter_dir: PathBuf,
    /// Source file extension that is split into per-file submissions.
    pub extension: String,
    pub workers: usize,
    pub runner: RunnerOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            temp_dir: PathBuf::from("temp"),
            final_submissions_prefix: "final_submissions".to_string(),
            online_dir: PathBuf::from("online"),
            starter_dir: PathBuf::from("starter"),
            extension: "java".to_string(),
            workers: 1,
            runner: RunnerOptions::default(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        self.runner.validate()?;
        if self.workers == 0 {
            return Err(Error::config("workers must be >= 1"));
        }
        if self.extension.is_empty() {
            return Err(Error::config("extension must not be empty"));
        }
        Ok(())
    }
}
