use std::fs;
use std::path::Path;

use super::git::parse_log;
use super::*;
use crate::error::{Error, IoContext};
use crate::testing::write_file;

#[test]
fn log_is_returned_oldest_first() -> Result<()> {
    let log = "c3 300\nb2 200\na1 100\n";
    let snapshots = parse_log(Path::new("repo"), log)?;
    let hashes: Vec<&str> = snapshots.iter().map(|s| s.hash.as_str()).collect();
    assert_eq!(hashes, vec!["a1", "b2", "c3"]);
    Ok(())
}

#[test]
fn equal_timestamps_keep_commit_order() -> Result<()> {
    let snapshots = parse_log(Path::new("repo"), "new 100\nold 100\n")?;
    assert_eq!(snapshots[0].hash, "old");
    assert_eq!(snapshots[1].hash, "new");
    Ok(())
}

#[test]
fn malformed_log_is_a_history_error() {
    assert!(matches!(
        parse_log(Path::new("repo"), "deadbeef\n"),
        Err(Error::History { .. })
    ));
    assert!(matches!(
        parse_log(Path::new("repo"), "deadbeef yesterday\n"),
        Err(Error::History { .. })
    ));
}

#[test]
fn snapshot_dir_name_carries_student_time_and_hash() {
    let snapshot = Snapshot {
        hash: "abc123".to_string(),
        timestamp: 1_700_000_000,
    };
    assert_eq!(snapshot.dir_name("jane"), "jane_1700000000_abc123");
}

#[test]
fn missing_git_is_a_history_error() -> Result<()> {
    let root = tempfile::tempdir().at("tempdir")?;
    let history = GitHistory::new(root.path().join("no-git")).with_branch("main");
    assert_eq!(history.branch(), "main");
    assert!(matches!(
        history.list_snapshots(root.path()),
        Err(Error::History { .. })
    ));
    Ok(())
}

#[cfg(unix)]
mod fake_git {
    use std::path::PathBuf;

    use super::*;

    fn sh_single_quote(s: &str) -> String {
        let escaped = s.replace('\'', r#"'"'"'"#);
        format!("'{escaped}'")
    }

    /// Answers `log` with canned output and appends every other command to `calls`.
    fn fake_git(dir: &Path, calls: &Path) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let calls = sh_single_quote(&calls.to_string_lossy());
        let script = format!(
            r#"#!/bin/sh
set -eu

if [ "${{1:-}}" = "-C" ]; then
  shift 2
fi

cmd="${{1:-}}"
shift
case "$cmd" in
  log)
    printf 'bbb 200\naaa 100'
    ;;
  checkout)
    echo "checkout $*" >> {calls}
    ;;
  *)
    echo "unsupported: $cmd" >&2
    exit 2
    ;;
esac
"#
        );
        let path = dir.join("fake_git.sh");
        fs::write(&path, script).at(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).at(&path)?;
        Ok(path)
    }

    fn recorded(calls: &Path) -> Vec<String> {
        fs::read_to_string(calls)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn git_history_lists_and_materializes_once() -> Result<()> {
        let root = tempfile::tempdir().at("tempdir")?;
        let repo = root.path().join("repo");
        write_file(&repo.join("Main.java"), "class Main {}\n")?;
        write_file(&repo.join("lib").join("Util.java"), "class Util {}\n")?;
        write_file(&repo.join(".git").join("HEAD"), "ref: refs/heads/master\n")?;
        write_file(&repo.join(".hidden.java"), "secret\n")?;

        let calls = root.path().join("calls.txt");
        let history = GitHistory::new(fake_git(root.path(), &calls)?);

        let snapshots = history.list_snapshots(&repo)?;
        assert_eq!(
            snapshots,
            vec![
                Snapshot { hash: "aaa".to_string(), timestamp: 100 },
                Snapshot { hash: "bbb".to_string(), timestamp: 200 },
            ]
        );

        let dest = root.path().join("work").join(snapshots[0].dir_name("jane"));
        let out = history.materialize(&repo, &snapshots[0], &dest)?;
        assert_eq!(out, dest);
        assert!(dest.join("Main.java").is_file());
        assert!(dest.join("lib").join("Util.java").is_file());
        assert!(!dest.join(".git").exists());
        assert!(!dest.join(".hidden.java").exists());

        history.materialize(&repo, &snapshots[0], &dest)?;
        history.reset_to_latest(&repo)?;
        assert_eq!(
            recorded(&calls),
            vec!["checkout -q aaa".to_string(), "checkout -q -f master".to_string()]
        );
        Ok(())
    }
}
