mod checkpoint;
mod error;
mod history;
mod pair;
mod pipeline;
mod progress;
mod report;
mod runner;
mod submission;
mod types;
mod util;

#[cfg(test)]
mod testing;

pub use checkpoint::{CheckpointKey, CheckpointStore, CsvCheckpointStore, MemoryCheckpointStore};
pub use error::{Error, Result};
pub use history::{GitHistory, VersionHistory};
pub use pair::{Pair, PairSide, TokenCounts};
pub use pipeline::{
    CompareSet, CoursePipeline, PipelineContext, StudentPipeline, setup_final_submissions,
};
pub use progress::ProgressCounter;
pub use report::{ReportLine, parse_line, parse_regions, parse_report, read_report};
pub use runner::{
    ComparisonEngine, ComparisonRunner, EngineRun, MossEngine, RunnerState, select_top_pairs,
};
pub use submission::{Submission, SubmissionId, SubmissionSet};

pub use types::{
    ARCHIVE_ID_OFFSET, DEFAULT_NPAIRS, DEFAULT_THRESHOLD, HighlightRegion, Language, MatchRecord,
    MatchRegion, NOBASE_THRESHOLD, PAIR_SEPARATOR, PipelineOptions, Range, RegionTag,
    RunnerOptions, Snapshot, SubmissionKind,
};
