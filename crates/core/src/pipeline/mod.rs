//! Per-student walk over snapshots, with results checkpointed as they are produced.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::error::{IoContext, Result};
use crate::history::VersionHistory;
use crate::pair::Pair;
use crate::runner::{ComparisonEngine, ComparisonRunner};
use crate::types::{MatchRecord, PipelineOptions, RunnerOptions, Snapshot, SubmissionKind};
use crate::util::{files_with_extension, per_file_dir_name, remove_dir_if_exists};

mod course;


pub use course::{CoursePipeline, setup_final_submissions};

/// Collaborators shared by every pipeline of a run.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub options: &'a PipelineOptions,
    pub history: &'a dyn VersionHistory,
    pub engine: &'a dyn ComparisonEngine,
    pub store: &'a dyn CheckpointStore,
}

/// What every snapshot of a course is compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareSet {
    pub final_submissions: PathBuf,
    pub online: Option<PathBuf>,
    pub starter: Option<PathBuf>,
}

impl CompareSet {
    /// Online and starter dirs that do not exist are left out.
    pub fn new(final_submissions: PathBuf, online: &Path, starter: &Path) -> Self {
        Self {
            final_submissions,
            online: online.is_dir().then(|| online.to_path_buf()),
            starter: starter.is_dir().then(|| starter.to_path_buf()),
        }
    }
}

pub struct StudentPipeline<'a> {
    ctx: PipelineContext<'a>,
    compare_set: &'a CompareSet,
    course: String,
    student: String,
    repo: PathBuf,
}

impl<'a> StudentPipeline<'a> {
    pub fn new(
        ctx: PipelineContext<'a>,
        compare_set: &'a CompareSet,
        course: &str,
        course_dir: &Path,
        student: &str,
    ) -> Self {
        Self {
            ctx,
            compare_set,
            course: course.to_string(),
            student: student.to_string(),
            repo: course_dir.join(student),
        }
    }

    pub fn student(&self) -> &str {
        &self.student
    }

    /// Expanded snapshots of this student live here until the student is done.
    pub fn repo_dir(&self) -> PathBuf {
        self.ctx.options.temp_dir.join(format!("repo_{}", self.student))
    }

    /// The student's top match across snapshots, or `None` when the repository has none.
    pub fn run(&self) -> Result<Option<MatchRecord>> {
        let top_key = CheckpointKey::student_top(&self.course, &self.student);
        if let Some(top) = self.ctx.store.load(&top_key)?.and_then(|rows| rows.into_iter().next()) {
            info!(student = %self.student, "already processed");
            return Ok(Some(top));
        }

        let snapshots = self.ctx.history.list_snapshots(&self.repo)?;
        if snapshots.is_empty() {
            warn!(student = %self.student, "no snapshots");
            return Ok(None);
        }

        let repo_dir = self.repo_dir();
        let mut results = Vec::with_capacity(snapshots.len());
        for (idx, snapshot) in snapshots.iter().enumerate() {
            let name = snapshot.dir_name(&self.student);
            info!(
                student = %self.student,
                snapshot = %name,
                "snapshot {}/{}",
                idx + 1,
                snapshots.len()
            );

            let key = CheckpointKey::snapshot(&self.course, &self.student, &name);
            let cached = self.ctx.store.load(&key)?.and_then(|rows| rows.into_iter().next());
            let record = match cached {
                Some(record) => record,
                None => {
                    let record = self.compare_snapshot(snapshot, &name, &repo_dir)?;
                    self.ctx.store.save(&key, std::slice::from_ref(&record))?;
                    record
                }
            };
            results.push(record);
        }

        let Some(top) = argmax_record(results) else {
            return Ok(None);
        };
        self.ctx.store.save(&top_key, std::slice::from_ref(&top))?;

        if let Err(err) = self.ctx.history.reset_to_latest(&self.repo) {
            warn!(student = %self.student, error = %err, "failed to reset repository");
        }
        remove_dir_if_exists(&repo_dir)?;
        Ok(Some(top))
    }

    fn runner_options(&self) -> RunnerOptions {
        let mut options = self.ctx.options.runner.clone();
        if options.temp_root.is_none() {
            options.temp_root = Some(self.ctx.options.temp_dir.clone());
        }
        options
    }

    fn compare_snapshot(
        &self,
        snapshot: &Snapshot,
        name: &str,
        repo_dir: &Path,
    ) -> Result<MatchRecord> {
        let snapshot_dir = self
            .ctx
            .history
            .materialize(&self.repo, snapshot, &repo_dir.join(name))?;
        let split_dir = repo_dir.join(format!("{name}.split"));
        let files = split_snapshot(
            &snapshot_dir,
            &split_dir,
            &self.student,
            &self.ctx.options.extension,
        )?;
        if files == 0 {
            debug!(snapshot = %name, "no source files, nothing to compare");
            remove_dir_if_exists(&split_dir)?;
            return Ok(MatchRecord::placeholder(&self.student, name));
        }

        let mut runner = ComparisonRunner::new(self.ctx.engine, self.runner_options())?;
        if let Some(starter) = &self.compare_set.starter {
            runner.add(starter, SubmissionKind::Starter, None)?;
        }
        runner.add_all(&split_dir, SubmissionKind::Current, Some(name), &[])?;
        runner.add_all(&self.compare_set.final_submissions, SubmissionKind::Archive, None, &[])?;
        if let Some(online) = &self.compare_set.online {
            runner.add_all(online, SubmissionKind::Archive, None, &[])?;
        }

        let pairs = runner.run()?;
        drop(runner);
        remove_dir_if_exists(&split_dir)?;

        let opposing = pairs
            .iter()
            .filter_map(|pair| self.opposing_record(pair, name))
            .collect();
        Ok(argmax_record(opposing).unwrap_or_else(|| MatchRecord::placeholder(&self.student, name)))
    }

    /// A record when `pair` puts this snapshot against another author's archived work.
    fn opposing_record(&self, pair: &Pair, snapshot: &str) -> Option<MatchRecord> {
        if pair.is_self {
            return None;
        }
        let archive = match (pair.sides[0].kind(), pair.sides[1].kind()) {
            (SubmissionKind::Current, SubmissionKind::Archive) => &pair.sides[1],
            (SubmissionKind::Archive, SubmissionKind::Current) => &pair.sides[0],
            _ => return None,
        };
        Some(MatchRecord {
            student: self.student.clone(),
            other: Some(archive.student.clone()),
            snapshot: snapshot.to_string(),
            score: pair.tokens.matched as f64,
        })
    }
}

/// Highest score wins; the first of equal scores is kept.
pub(crate) fn argmax_record(records: Vec<MatchRecord>) -> Option<MatchRecord> {
    let mut best: Option<MatchRecord> = None;
    for record in records {
        if best.as_ref().is_none_or(|b| record.score > b.score) {
            best = Some(record);
        }
    }
    best
}

/// Copies each `.<extension>` file of `snapshot_dir` into its own `<author>_<stem>` dir under
/// `split_dir`, returning how many files were split.
pub(crate) fn split_snapshot(
    snapshot_dir: &Path,
    split_dir: &Path,
    author: &str,
    extension: &str,
) -> Result<usize> {
    remove_dir_if_exists(split_dir)?;
    fs::create_dir_all(split_dir).at(split_dir)?;

    let files = files_with_extension(snapshot_dir, extension)?;
    for file in &files {
        let dir = split_dir.join(per_file_dir_name(author, file));
        fs::create_dir_all(&dir).at(&dir)?;
        let dest = dir.join(file);
        fs::copy(snapshot_dir.join(file), &dest).at(&dest)?;
    }
    Ok(files.len())
}
