use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ignore::WalkBuilder;
use tracing::debug;

use crate::error::{Error, IoContext, Result};
use crate::types::Snapshot;
use crate::util::validate_bin_override;

use super::VersionHistory;

const ENV_GIT_BIN: &str = "TMOSS_GIT_BIN";
const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Clone)]
pub struct GitHistory {
    git: OsString,
    branch: String,
}

impl Default for GitHistory {
    fn default() -> Self {
        let git = std::env::var_os(ENV_GIT_BIN)
            .and_then(validate_bin_override)
            .unwrap_or_else(|| OsString::from("git"));
        Self {
            git,
            branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

impl GitHistory {
    pub fn new(git: impl Into<OsString>) -> Self {
        Self {
            git: git.into(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn git(&self, repo: &Path, args: &[&str]) -> Result<String> {
        debug!(repo = %repo.display(), ?args, "running git");
        let output = Command::new(&self.git)
            .arg("-C")
            .arg(repo)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| history_error(repo, format!("failed to run git: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(history_error(
                repo,
                format!(
                    "git {} failed (status={:?}): {}",
                    args.join(" "),
                    output.status.code(),
                    stderr.trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VersionHistory for GitHistory {
    fn list_snapshots(&self, repo: &Path) -> Result<Vec<Snapshot>> {
        let log = self.git(repo, &["log", "--pretty=format:%h %ct", &self.branch])?;
        parse_log(repo, &log)
    }

    fn materialize(&self, repo: &Path, snapshot: &Snapshot, dest: &Path) -> Result<PathBuf> {
        if dest.exists() {
            debug!(dest = %dest.display(), "snapshot already materialized");
            return Ok(dest.to_path_buf());
        }
        self.git(repo, &["checkout", "-q", &snapshot.hash])?;

        // Staged so a partial copy never appears at `dest`.
        let parent = dest.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).at(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".materialize_")
            .tempdir_in(parent)
            .at(parent)?;
        copy_visible_tree(repo, staging.path())?;
        fs::rename(staging.path(), dest).at(dest)?;

        debug!(hash = %snapshot.hash, dest = %dest.display(), "materialized snapshot");
        Ok(dest.to_path_buf())
    }

    fn reset_to_latest(&self, repo: &Path) -> Result<()> {
        self.git(repo, &["checkout", "-q", "-f", &self.branch])?;
        Ok(())
    }
}

fn history_error(repo: &Path, message: String) -> Error {
    Error::History {
        repo: repo.to_path_buf(),
        message,
    }
}

/// Parses `<hash> <unix-ts>` lines (newest first, as git prints them) into oldest-first order.
pub(super) fn parse_log(repo: &Path, log: &str) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();
    for line in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((hash, ts)) = line.split_once(' ') else {
            return Err(history_error(repo, format!("malformed log line: {line:?}")));
        };
        let timestamp = ts
            .trim()
            .parse::<i64>()
            .map_err(|_| history_error(repo, format!("bad commit timestamp: {line:?}")))?;
        snapshots.push(Snapshot {
            hash: hash.to_string(),
            timestamp,
        });
    }
    snapshots.reverse();
    snapshots.sort_by_key(|s| s.timestamp);
    Ok(snapshots)
}

/// Copies every non-hidden file and directory under `src` into `dest`.
fn copy_visible_tree(src: &Path, dest: &Path) -> Result<()> {
    let walker = WalkBuilder::new(src)
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .build();

    for result in walker {
        let entry = result.map_err(|err| history_error(src, format!("walk failed: {err}")))?;
        if entry.depth() == 0 {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(rel);
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).at(&target)?;
        }
    }
    Ok(())
}
