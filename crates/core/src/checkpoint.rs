//! Persisted results at course, student and snapshot granularity.
//!
//! A checkpoint that exists is never recomputed, so an interrupted run only redoes missing
//! granules.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, IoContext, Result};
use crate::types::MatchRecord;

const TOP_MATCHES_FILE: &str = "top_matches.csv";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckpointKey {
    /// Top match of every student in a course.
    Course { course: String },
    /// One student's best match across all snapshots.
    StudentTop { course: String, student: String },
    /// One student's best match at one snapshot.
    Snapshot {
        course: String,
        student: String,
        snapshot: String,
    },
}

impl CheckpointKey {
    pub fn course(course: &str) -> Self {
        Self::Course {
            course: course.to_string(),
        }
    }

    pub fn student_top(course: &str, student: &str) -> Self {
        Self::StudentTop {
            course: course.to_string(),
            student: student.to_string(),
        }
    }

    pub fn snapshot(course: &str, student: &str, snapshot: &str) -> Self {
        Self::Snapshot {
            course: course.to_string(),
            student: student.to_string(),
            snapshot: snapshot.to_string(),
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course { course } => write!(f, "{course}"),
            Self::StudentTop { course, student } => write!(f, "{course}/{student}"),
            Self::Snapshot {
                course,
                student,
                snapshot,
            } => write!(f, "{course}/{student}/{snapshot}"),
        }
    }
}

pub trait CheckpointStore: Send + Sync {
    fn exists(&self, key: &CheckpointKey) -> bool;

    /// `None` when nothing was saved under `key`.
    fn load(&self, key: &CheckpointKey) -> Result<Option<Vec<MatchRecord>>>;

    fn save(&self, key: &CheckpointKey, records: &[MatchRecord]) -> Result<()>;
}

/// Header-less, unquoted CSV rows of `student,other,snapshot,score` under one output dir:
///
/// ```text
/// <out>/<course>/top_matches.csv
/// <out>/<course>/<student>/top_matches.csv
/// <out>/<course>/<student>/<snapshot>.csv
/// ```
#[derive(Debug, Clone)]
pub struct CsvCheckpointStore {
    root: PathBuf,
}

impl CsvCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &CheckpointKey) -> PathBuf {
        match key {
            CheckpointKey::Course { course } => self.root.join(course).join(TOP_MATCHES_FILE),
            CheckpointKey::StudentTop { course, student } => {
                self.root.join(course).join(student).join(TOP_MATCHES_FILE)
            }
            CheckpointKey::Snapshot {
                course,
                student,
                snapshot,
            } => self
                .root
                .join(course)
                .join(student)
                .join(format!("{snapshot}.csv")),
        }
    }
}

fn checkpoint_error(path: &Path, source: csv::Error) -> Error {
    Error::Checkpoint {
        path: path.to_path_buf(),
        source,
    }
}

/// Rows are written unquoted, so fields must not contain separators.
fn check_writable(record: &MatchRecord) -> Result<()> {
    let fields = [
        record.student.as_str(),
        record.other.as_deref().unwrap_or_default(),
        record.snapshot.as_str(),
    ];
    for field in fields {
        if field.contains([',', '\n', '\r', '"']) {
            return Err(Error::config(format!(
                "cannot persist {field:?}: names must not contain commas, quotes or newlines"
            )));
        }
    }
    Ok(())
}

impl CheckpointStore for CsvCheckpointStore {
    fn exists(&self, key: &CheckpointKey) -> bool {
        self.path(key).is_file()
    }

    fn load(&self, key: &CheckpointKey) -> Result<Option<Vec<MatchRecord>>> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|err| checkpoint_error(&path, err))?;
        let mut records = Vec::new();
        for row in reader.deserialize::<MatchRecord>() {
            records.push(row.map_err(|err| checkpoint_error(&path, err))?);
        }
        debug!(key = %key, rows = records.len(), "loaded checkpoint");
        Ok(Some(records))
    }

    fn save(&self, key: &CheckpointKey, records: &[MatchRecord]) -> Result<()> {
        for record in records {
            check_writable(record)?;
        }

        let path = self.path(key);
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).at(parent)?;

        // Written next to the target and renamed into place, so a checkpoint is all or nothing.
        let tmp = tempfile::NamedTempFile::new_in(parent).at(parent)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .quote_style(csv::QuoteStyle::Never)
                .from_writer(tmp.as_file());
            for record in records {
                writer
                    .serialize(record)
                    .map_err(|err| checkpoint_error(&path, err))?;
            }
            writer.flush().at(&path)?;
        }
        tmp.persist(&path).map_err(|err| Error::io(&path, err.error))?;

        debug!(key = %key, rows = records.len(), path = %path.display(), "saved checkpoint");
        Ok(())
    }
}

/// Keeps checkpoints in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<CheckpointKey, Vec<MatchRecord>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut HashMap<CheckpointKey, Vec<MatchRecord>>) -> R,
    ) -> R {
        match self.entries.lock() {
            Ok(mut entries) => f(&mut entries),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn exists(&self, key: &CheckpointKey) -> bool {
        self.with_entries(|entries| entries.contains_key(key))
    }

    fn load(&self, key: &CheckpointKey) -> Result<Option<Vec<MatchRecord>>> {
        Ok(self.with_entries(|entries| entries.get(key).cloned()))
    }

    fn save(&self, key: &CheckpointKey, records: &[MatchRecord]) -> Result<()> {
        for record in records {
            check_writable(record)?;
        }
        self.with_entries(|entries| entries.insert(key.clone(), records.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(student: &str, other: Option<&str>, snapshot: &str, score: f64) -> MatchRecord {
        MatchRecord {
            student: student.to_string(),
            other: other.map(str::to_string),
            snapshot: snapshot.to_string(),
            score,
        }
    }

    #[test]
    fn csv_store_lays_out_three_granularities() {
        let store = CsvCheckpointStore::new("out");
        assert_eq!(
            store.path(&CheckpointKey::course("cs106a")),
            Path::new("out/cs106a/top_matches.csv")
        );
        assert_eq!(
            store.path(&CheckpointKey::student_top("cs106a", "jane")),
            Path::new("out/cs106a/jane/top_matches.csv")
        );
        assert_eq!(
            store.path(&CheckpointKey::snapshot("cs106a", "jane", "jane_100_abc")),
            Path::new("out/cs106a/jane/jane_100_abc.csv")
        );
    }

    #[test]
    fn csv_store_round_trips_rows_without_header() -> Result<()> {
        let root = tempfile::tempdir().at("tempdir")?;
        let store = CsvCheckpointStore::new(root.path());
        let key = CheckpointKey::snapshot("cs", "jane", "jane_100_abc");

        assert!(!store.exists(&key));
        assert_eq!(store.load(&key)?, None);

        let rows = vec![
            record("jane", Some("bob"), "jane_100_abc", 40.0),
            record("jane", None, "jane_200_def", 0.0),
        ];
        store.save(&key, &rows)?;
        assert!(store.exists(&key));

        let text = fs::read_to_string(store.path(&key)).at("checkpoint")?;
        assert_eq!(text, "jane,bob,jane_100_abc,40.0\njane,,jane_200_def,0.0\n");
        assert_eq!(store.load(&key)?, Some(rows));
        Ok(())
    }

    #[test]
    fn csv_store_overwrites_atomically() -> Result<()> {
        let root = tempfile::tempdir().at("tempdir")?;
        let store = CsvCheckpointStore::new(root.path());
        let key = CheckpointKey::course("cs");
        store.save(&key, &[record("a", Some("b"), "s", 1.0)])?;
        store.save(&key, &[record("c", None, "t", 0.0)])?;

        assert_eq!(store.load(&key)?, Some(vec![record("c", None, "t", 0.0)]));
        let leftovers = fs::read_dir(root.path().join("cs")).at("course dir")?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn names_with_commas_are_rejected() -> Result<()> {
        let root = tempfile::tempdir().at("tempdir")?;
        let store = CsvCheckpointStore::new(root.path());
        let key = CheckpointKey::student_top("cs", "jane");
        let bad = record("jane", Some("doe, john"), "s", 3.0);

        assert!(matches!(store.save(&key, &[bad.clone()]), Err(Error::Config { .. })));
        assert!(!store.exists(&key));
        assert!(matches!(
            MemoryCheckpointStore::new().save(&key, &[bad]),
            Err(Error::Config { .. })
        ));
        Ok(())
    }

    #[test]
    fn malformed_rows_are_checkpoint_errors() -> Result<()> {
        let root = tempfile::tempdir().at("tempdir")?;
        let store = CsvCheckpointStore::new(root.path());
        let key = CheckpointKey::course("cs");
        let path = store.path(&key);
        fs::create_dir_all(root.path().join("cs")).at("course dir")?;
        fs::write(&path, "jane,bob,snap,not-a-number\n").at(&path)?;

        assert!(matches!(store.load(&key), Err(Error::Checkpoint { .. })));
        Ok(())
    }

    #[test]
    fn memory_store_keeps_keys_apart() -> Result<()> {
        let store = MemoryCheckpointStore::new();
        let top = CheckpointKey::student_top("cs", "jane");
        let snap = CheckpointKey::snapshot("cs", "jane", "s1");
        store.save(&snap, &[record("jane", None, "s1", 0.0)])?;

        assert!(store.exists(&snap));
        assert!(!store.exists(&top));
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&top)?, None);
        Ok(())
    }
}
