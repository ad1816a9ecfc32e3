use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Absolute form of `p`. Existing paths are canonicalized; paths that do not exist yet
/// (`--out`, `--temp`) are only normalized lexically.
pub(crate) fn resolve_path(p: &Path) -> io::Result<PathBuf> {
    let base = if p.is_absolute() {
        PathBuf::new()
    } else {
        env::current_dir()?
    };
    let normalized = lexical_normalize(&base.join(p));
    Ok(fs::canonicalize(&normalized).unwrap_or(normalized))
}

/// Drops `.` and folds `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<OsString> = Vec::new();
    let mut floor = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                if matches!(component, Component::Prefix(_)) {
                    parts.clear();
                }
                parts.push(component.as_os_str().to_owned());
                floor = parts.len();
            }
            Component::CurDir => {}
            Component::ParentDir if parts.len() > floor => {
                parts.pop();
            }
            Component::ParentDir if floor == 0 => parts.push(component.as_os_str().to_owned()),
            Component::ParentDir => {}
            Component::Normal(part) => parts.push(part.to_owned()),
        }
    }
    parts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dots_are_folded() {
        assert_eq!(
            lexical_normalize(Path::new("/data/./cs/../final_submissions_cs")),
            PathBuf::from("/data/final_submissions_cs")
        );
        assert_eq!(lexical_normalize(Path::new("/../out")), PathBuf::from("/out"));
        assert_eq!(lexical_normalize(Path::new("../temp")), PathBuf::from("../temp"));
    }

    #[test]
    fn missing_paths_resolve_to_absolute() {
        let resolved = resolve_path(Path::new("no_such_dir/out")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("no_such_dir/out"));
    }
}
