//! Access to a student's repository history.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::Snapshot;

mod git;

#[cfg(test)]
mod tests;

pub use git::GitHistory;

pub trait VersionHistory: Send + Sync {
    /// Snapshots of `repo`, oldest first.
    fn list_snapshots(&self, repo: &Path) -> Result<Vec<Snapshot>>;

    /// Copies `snapshot` of `repo` into `dest` and returns it. A `dest` that already exists is
    /// reused as is.
    fn materialize(&self, repo: &Path, snapshot: &Snapshot, dest: &Path) -> Result<PathBuf>;

    /// Puts `repo` back on its latest commit.
    fn reset_to_latest(&self, repo: &Path) -> Result<()>;
}
