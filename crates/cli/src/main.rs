mod args;
mod json;
mod logging;
mod path;
mod text;

use std::path::Path;

use clap::Parser;
use tmoss_core::{
    CoursePipeline, CsvCheckpointStore, GitHistory, MossEngine, PipelineContext,
};
use tracing::info;

use crate::args::Cli;
use crate::json::{JsonCourse, write_json};
use crate::text::format_text;

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn course_name(course_dir: &Path) -> String {
    course_dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run(cli: &Cli) -> tmoss_core::Result<()> {
    let options = cli.pipeline_options()?;
    let course_dirs = cli.course_dirs()?;

    let history = GitHistory::default().with_branch(&cli.branch);
    let engine = MossEngine::default();
    let store = CsvCheckpointStore::new(&options.out_dir);
    info!(
        engine = %engine.binary().to_string_lossy(),
        branch = history.branch(),
        out = %options.out_dir.display(),
        workers = options.workers,
        "starting"
    );

    let pipeline = CoursePipeline::new(PipelineContext {
        options: &options,
        history: &history,
        engine: &engine,
        store: &store,
    });

    let mut courses = Vec::with_capacity(course_dirs.len());
    for course_dir in &course_dirs {
        let records = pipeline.run(course_dir)?;
        courses.push((course_name(course_dir), records));
    }

    if cli.json {
        let courses: Vec<JsonCourse> = courses
            .into_iter()
            .map(|(course, records)| JsonCourse::new(&course, records))
            .collect();
        write_json(&courses).map_err(|source| tmoss_core::Error::Io {
            path: "<stdout>".into(),
            source,
        })?;
    } else {
        for (course, records) in &courses {
            print!("{}", format_text(course, records));
        }
    }
    Ok(())
}
