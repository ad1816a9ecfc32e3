use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::error::{IoContext, Result};

/// Runs `f` and logs how long the stage took.
pub(crate) fn timed<T>(stage: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let out = f()?;
    info!(
        stage,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "{stage} done"
    );
    Ok(out)
}

pub(crate) fn strip_underscores(raw: &str) -> String {
    raw.chars().filter(|&c| c != '_').collect()
}

/// `<author>_<stem>` with underscores removed from both parts.
pub(crate) fn per_file_dir_name(author: &str, file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!("{}_{}", strip_underscores(author), strip_underscores(stem))
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).at(path),
    }
}

/// Immediate subdirectory names, sorted.
pub(crate) fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        let file_type = entry.file_type().at(entry.path())?;
        if !file_type.is_dir() {
            continue;
        }
        out.push(entry.file_name().to_string_lossy().into_owned());
    }
    out.sort();
    Ok(out)
}

/// Regular files directly in `dir` whose name ends with `.<extension>`, sorted by name.
pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let suffix = format!(".{extension}");
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        let file_type = entry.file_type().at(entry.path())?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(&suffix) {
            out.push(name);
        }
    }
    out.sort();
    Ok(out)
}

/// Accepts a binary override only when it is an absolute path to an executable regular file
/// that is not world-writable.
pub(crate) fn validate_bin_override(raw: OsString) -> Option<OsString> {
    if raw.to_string_lossy().is_empty() {
        return None;
    }

    let path = Path::new(&raw);
    if !path.is_absolute() {
        return None;
    }

    let meta = fs::symlink_metadata(path).ok()?;
    if meta.file_type().is_symlink() || !meta.is_file() {
        return None;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = meta.permissions().mode();
        if mode & 0o111 == 0 {
            return None;
        }
        if mode & 0o002 != 0 {
            return None;
        }
    }

    Some(raw)
}
