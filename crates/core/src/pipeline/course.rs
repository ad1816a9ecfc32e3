use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::checkpoint::CheckpointKey;
use crate::error::{Error, IoContext, Result};
use crate::history::VersionHistory;
use crate::progress::ProgressCounter;
use crate::types::MatchRecord;
use crate::util::{
    base_name, files_with_extension, per_file_dir_name, remove_dir_if_exists, sorted_subdirs,
};

use super::{CompareSet, PipelineContext, StudentPipeline};

/// Runs every student of a course and persists the course's top matches.
pub struct CoursePipeline<'a> {
    ctx: PipelineContext<'a>,
}

impl<'a> CoursePipeline<'a> {
    pub fn new(ctx: PipelineContext<'a>) -> Self {
        Self { ctx }
    }

    /// Top match per student, in student order.
    ///
    /// A course with saved top matches is not rerun. The course checkpoint is only written when
    /// every student finished, so skipped students are retried on the next run.
    pub fn run(&self, course_dir: &Path) -> Result<Vec<MatchRecord>> {
        let options = self.ctx.options;
        options.validate()?;
        let course = base_name(course_dir);
        if course.is_empty() {
            return Err(Error::config(format!(
                "course dir {} has no name",
                course_dir.display()
            )));
        }

        let key = CheckpointKey::course(&course);
        if let Some(records) = self.ctx.store.load(&key)?.filter(|rows| !rows.is_empty()) {
            info!(course = %course, "already processed");
            return Ok(records);
        }

        let start = Instant::now();
        let final_submissions = setup_final_submissions(
            course_dir,
            &options.final_submissions_prefix,
            &options.extension,
            self.ctx.history,
        )?;
        let compare_set =
            CompareSet::new(final_submissions, &options.online_dir, &options.starter_dir);

        let students: Vec<String> = sorted_subdirs(course_dir)?
            .into_iter()
            .filter(|name| !name.starts_with('.'))
            .collect();
        let counter = ProgressCounter::new(students.len() as u64);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .map_err(|err| Error::config(format!("failed to build worker pool: {err}")))?;

        let outcomes: Vec<Result<Option<MatchRecord>>> = pool.install(|| {
            students
                .par_iter()
                .map(|student| {
                    let done = counter.incr_and_get();
                    info!(
                        course = %course,
                        student = %student,
                        "student {done}/{}",
                        counter.total()
                    );
                    StudentPipeline::new(self.ctx, &compare_set, &course, course_dir, student).run()
                })
                .collect()
        });

        let mut top = Vec::new();
        let mut skipped = 0usize;
        for (student, outcome) in students.iter().zip(outcomes) {
            match outcome {
                Ok(Some(record)) => top.push(record),
                Ok(None) => {}
                Err(err @ Error::Config { .. }) => return Err(err),
                Err(err) => {
                    warn!(student = %student, error = %err, "skipping student");
                    skipped += 1;
                }
            }
        }

        if skipped == 0 {
            self.ctx.store.save(&key, &top)?;
        } else {
            warn!(
                course = %course,
                skipped,
                "course incomplete, top matches not checkpointed"
            );
        }
        remove_dir_if_exists(&options.temp_dir)?;
        info!(
            course = %course,
            students = students.len(),
            skipped,
            matches = top.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "course done"
        );
        Ok(top)
    }
}

/// Builds `<data>/<prefix>_<course>` once: each student's latest source files, one
/// `<student>_<stem>` dir per file. An existing archive is reused.
pub fn setup_final_submissions(
    course_dir: &Path,
    prefix: &str,
    extension: &str,
    history: &dyn VersionHistory,
) -> Result<PathBuf> {
    let course = base_name(course_dir);
    let data_dir = match course_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let final_dir = data_dir.join(format!("{prefix}_{course}"));
    if final_dir.exists() {
        info!(dir = %final_dir.display(), "final submissions already prepared");
        return Ok(final_dir);
    }
    info!(dir = %final_dir.display(), "preparing final submissions");

    let staging = tempfile::Builder::new()
        .prefix(".final_submissions_")
        .tempdir_in(data_dir)
        .at(data_dir)?;

    for student in sorted_subdirs(course_dir)? {
        if student.starts_with('.') {
            continue;
        }
        let student_dir = course_dir.join(&student);
        if let Err(err) = history.reset_to_latest(&student_dir) {
            warn!(student = %student, error = %err, "using working tree as is");
        }
        for file in files_with_extension(&student_dir, extension)? {
            let dir = staging.path().join(per_file_dir_name(&student, &file));
            fs::create_dir_all(&dir).at(&dir)?;
            let dest = dir.join(&file);
            fs::copy(student_dir.join(&file), &dest).at(&dest)?;
        }
    }

    fs::rename(staging.path(), &final_dir).at(&final_dir)?;
    Ok(final_dir)
}
