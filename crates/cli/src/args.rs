use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tmoss_core::{DEFAULT_NPAIRS, DEFAULT_THRESHOLD, Language, PipelineOptions, RunnerOptions};

use crate::path::resolve_path;

#[derive(Debug, Parser)]
#[command(
    name = "tmoss",
    version,
    about = "Temporal similarity checking of student repositories",
    long_about = "Compares every snapshot of every student repository in a course against the \
                  course's final submissions, online solutions and starter code, and records \
                  each student's most suspicious match.\n\n\
                  Results are checkpointed under --out, so an interrupted run resumes where it \
                  stopped."
)]
pub(crate) struct Cli {
    /// Course directories, each holding one git repository per student.
    #[arg(value_name = "COURSE_DIR", required = true)]
    pub(crate) courses: Vec<PathBuf>,

    /// Destination for per-snapshot, per-student and per-course matches.
    #[arg(long, short = 'o', value_name = "DIR", default_value = "out")]
    pub(crate) out: PathBuf,

    /// Scratch space for expanded snapshots and engine workspaces.
    #[arg(long, value_name = "DIR", default_value = "temp")]
    pub(crate) temp: PathBuf,

    /// Prefix of the per-course final submissions archive, created next to the course dir.
    #[arg(long = "final-submissions", value_name = "PREFIX", default_value = "final_submissions")]
    pub(crate) final_submissions: String,

    /// Archive of online solutions; skipped when missing.
    #[arg(long, short = 'x', value_name = "DIR", default_value = "online")]
    pub(crate) online: PathBuf,

    /// Starter code; skipped when missing.
    #[arg(long, short = 's', value_name = "DIR", default_value = "starter")]
    pub(crate) starter: PathBuf,

    /// Extension of the student source files.
    #[arg(long, value_name = "EXT", default_value = "java")]
    pub(crate) extension: String,

    /// Engine language (default: derived from --extension).
    #[arg(long, value_name = "LANG")]
    pub(crate) language: Option<String>,

    /// Branch whose history is walked and restored after each student.
    #[arg(long, value_name = "BRANCH", default_value = "master")]
    pub(crate) branch: String,

    /// Students processed in parallel.
    #[arg(long, short = 'j', value_name = "N", default_value_t = 1)]
    pub(crate) jobs: usize,

    /// Boilerplate threshold of the primary comparison.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_THRESHOLD)]
    pub(crate) threshold: u32,

    /// Non-self pairs reconciled per snapshot.
    #[arg(long, value_name = "K", default_value_t = DEFAULT_NPAIRS)]
    pub(crate) pairs: usize,

    /// Output JSON.
    #[arg(long)]
    pub(crate) json: bool,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub(crate) verbose: u8,
}

impl Cli {
    pub(crate) fn pipeline_options(&self) -> tmoss_core::Result<PipelineOptions> {
        let extension = self.extension.trim_start_matches('.').to_string();
        let language: Language = self.language.as_deref().unwrap_or(&extension).parse()?;

        let options = PipelineOptions {
            out_dir: resolve(&self.out)?,
            temp_dir: resolve(&self.temp)?,
            final_submissions_prefix: self.final_submissions.clone(),
            online_dir: resolve(&self.online)?,
            starter_dir: resolve(&self.starter)?,
            extension,
            workers: self.jobs,
            runner: RunnerOptions {
                language,
                threshold: self.threshold,
                npairs: self.pairs,
                ..RunnerOptions::default()
            },
        };
        options.validate()?;
        Ok(options)
    }

    pub(crate) fn course_dirs(&self) -> tmoss_core::Result<Vec<PathBuf>> {
        self.courses.iter().map(|p| resolve(p)).collect()
    }
}

fn resolve(path: &std::path::Path) -> tmoss_core::Result<PathBuf> {
    resolve_path(path).map_err(|source| tmoss_core::Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
