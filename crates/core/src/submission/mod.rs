use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};
use crate::types::{ARCHIVE_ID_OFFSET, Language, PAIR_SEPARATOR, SubmissionKind};
use crate::util::sorted_subdirs;


const FILE_HEADER_PREFIX: &str = ">>>> file: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId {
    pub kind: SubmissionKind,
    pub index: u32,
}

/// One labeled group of source files, concatenated into a single working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub kind: SubmissionKind,
    pub index: u32,
    pub name: String,
    /// Set from the first engine report that mentions this submission.
    pub tokens: Option<i64>,
    /// Physical lines of the working copy, including one header line per file.
    pub lines: u32,
}

impl Submission {
    pub fn id(&self) -> SubmissionId {
        SubmissionId {
            kind: self.kind,
            index: self.index,
        }
    }

    /// Working copy file name, relative to the run's workspace.
    pub fn working_copy_name(&self) -> String {
        format!("{}_{}", self.kind.slot(), self.index)
    }

    pub fn manifest_id(&self) -> u32 {
        match self.kind {
            SubmissionKind::Starter => 0,
            SubmissionKind::Current => self.index + 1,
            // Archived submissions share one ID so the engine never pairs them with each other.
            SubmissionKind::Archive => ARCHIVE_ID_OFFSET,
        }
    }

    pub fn manifest_line(&self, language: Language, id: Option<u32>) -> String {
        let id = id.unwrap_or_else(|| self.manifest_id());
        format!(
            "{} {id} {} {}\n",
            self.working_copy_name(),
            language.as_str(),
            self.name
        )
    }

    /// Author of the submission, derived from the last path component of its name.
    pub fn student(&self, has_submit_num: bool) -> &str {
        let base = self.name.rsplit('/').next().unwrap_or(&self.name);
        if has_submit_num && let Some(idx) = base.find('_') {
            return &base[..idx];
        }
        base
    }
}

impl PartialOrd for Submission {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Submission {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

#[derive(Debug)]
pub struct SubmissionSet {
    language: Language,
    workdir: PathBuf,
    counts: [u32; 3],
    submits: Vec<Submission>,
    by_name: HashMap<String, usize>,
}

impl SubmissionSet {
    /// `workdir` receives one normalized working copy per submission.
    pub fn new(language: Language, workdir: impl Into<PathBuf>) -> Self {
        Self {
            language,
            workdir: workdir.into(),
            counts: [0; 3],
            submits: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.submits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submits.is_empty()
    }

    pub fn count(&self, kind: SubmissionKind) -> u32 {
        self.counts[kind.slot()]
    }

    pub fn get(&self, name: &str) -> Option<&Submission> {
        self.by_name.get(name).map(|&idx| &self.submits[idx])
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Submission> {
        self.submits.iter()
    }

    /// Registers the source files directly inside `dir` as one submission named `name`
    /// (default: the directory path).
    pub fn add(
        &mut self,
        dir: &Path,
        kind: SubmissionKind,
        name: Option<&str>,
    ) -> Result<&Submission> {
        let meta = fs::metadata(dir).at(dir)?;
        if !meta.is_dir() {
            return Err(Error::config(format!(
                "submission {} is not a directory",
                dir.display()
            )));
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => dir.to_string_lossy().into_owned(),
        };
        if name.contains(PAIR_SEPARATOR) {
            return Err(Error::config(format!(
                "submission name cannot contain {PAIR_SEPARATOR:?}: {name}"
            )));
        }
        if self.by_name.contains_key(&name) {
            return Err(Error::config(format!("duplicate submission name: {name}")));
        }

        let index = self.counts[kind.slot()];
        let mut submit = Submission {
            kind,
            index,
            name,
            tokens: None,
            lines: 0,
        };

        let (text, lines) = concat_source_files(dir, self.language)?;
        submit.lines = lines;
        fs::create_dir_all(&self.workdir).at(&self.workdir)?;
        let working_copy = self.workdir.join(submit.working_copy_name());
        fs::write(&working_copy, text).at(&working_copy)?;

        debug!(
            name = %submit.name,
            kind = %kind,
            index,
            lines,
            "registered submission"
        );

        self.counts[kind.slot()] += 1;
        self.by_name.insert(submit.name.clone(), self.submits.len());
        self.submits.push(submit);
        Ok(&self.submits[self.submits.len() - 1])
    }

    /// Registers every immediate subdirectory of `dir` as a submission named
    /// `<prefix>/<subdir>`, in lexicographic order, skipping names matched by `skip` globs.
    pub fn add_all(
        &mut self,
        dir: &Path,
        kind: SubmissionKind,
        prefix: Option<&str>,
        skip: &[String],
    ) -> Result<usize> {
        let prefix = match prefix {
            Some(prefix) => prefix.to_string(),
            None => dir.to_string_lossy().into_owned(),
        };
        let skip = build_skip_matcher(dir, skip)?;

        let mut added = 0;
        for sub in sorted_subdirs(dir)? {
            if skip.matched(&sub, true).is_whitelist() {
                continue;
            }
            let name = format!("{prefix}/{sub}");
            self.add(&dir.join(&sub), kind, Some(&name))?;
            added += 1;
        }
        Ok(added)
    }

    /// One manifest line per submission ordered by `(kind, index)`, or exactly two lines with
    /// IDs 1 and 2 for an isolated pair run.
    pub fn build_manifest(&self, pair: Option<[&Submission; 2]>) -> Result<String> {
        let current = self.count(SubmissionKind::Current);
        if current >= ARCHIVE_ID_OFFSET {
            return Err(Error::config(format!(
                "{current} current submissions collide with archive ID {ARCHIVE_ID_OFFSET}"
            )));
        }

        let mut out = String::new();
        match pair {
            None => {
                let mut sorted: Vec<&Submission> = self.submits.iter().collect();
                sorted.sort();
                for submit in sorted {
                    out.push_str(&submit.manifest_line(self.language, None));
                }
            }
            Some(pair) => {
                for (id, submit) in (1u32..).zip(pair) {
                    out.push_str(&submit.manifest_line(self.language, Some(id)));
                }
            }
        }
        Ok(out)
    }

    pub fn write_manifest(&self, path: &Path, pair: Option<[&Submission; 2]>) -> Result<()> {
        let manifest = self.build_manifest(pair)?;
        fs::write(path, manifest).at(path)
    }

    /// Records per-submission stats reported by the engine.
    ///
    /// The first report sets the token count and later ones must agree. The engine counts the
    /// trailing newline as an extra line, so `engine_lines` must be exactly one more than ours.
    pub fn record_engine_stats(
        &mut self,
        name: &str,
        tokens: i64,
        engine_lines: i64,
        raw_line: &str,
    ) -> Result<&Submission> {
        let Some(&idx) = self.by_name.get(name) else {
            return Err(Error::protocol(
                raw_line,
                format!("unknown submission {name:?}"),
            ));
        };
        let submit = &mut self.submits[idx];
        match submit.tokens {
            Some(known) if known != tokens => {
                return Err(Error::protocol(
                    raw_line,
                    format!("{name}: token count {tokens} disagrees with earlier {known}"),
                ));
            }
            Some(_) => {}
            None => submit.tokens = Some(tokens),
        }
        if i64::from(submit.lines) + 1 != engine_lines {
            return Err(Error::protocol(
                raw_line,
                format!(
                    "{name}: engine reported {engine_lines} lines, expected {}",
                    i64::from(submit.lines) + 1
                ),
            ));
        }
        Ok(submit)
    }
}

fn build_skip_matcher(dir: &Path, skip: &[String]) -> Result<Override> {
    let mut builder = OverrideBuilder::new(dir);
    for glob in skip {
        builder
            .add(glob)
            .map_err(|err| Error::config(format!("invalid skip glob {glob:?}: {err}")))?;
    }
    builder
        .build()
        .map_err(|err| Error::config(format!("invalid skip globs: {err}")))
}

fn language_files(dir: &Path, language: Language) -> Result<Vec<PathBuf>> {
    let mut builder = OverrideBuilder::new(dir);
    for glob in language.file_globs() {
        builder
            .add(glob)
            .map_err(|err| Error::config(format!("invalid file glob {glob:?}: {err}")))?;
    }
    let overrides = builder
        .build()
        .map_err(|err| Error::config(format!("invalid file globs: {err}")))?;

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .max_depth(Some(1))
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        // Symlinks report their own file type here, so they are skipped too.
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Concatenates the language's files in `dir` into one text, returning it with its line count.
fn concat_source_files(dir: &Path, language: Language) -> Result<(String, u32)> {
    let mut out = String::new();
    let mut lines: u32 = 0;

    for path in language_files(dir, language)? {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable file");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes).replace("\r\n", "\n").replace('\r', "\n");
        if text.is_empty() {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = writeln!(out, "{FILE_HEADER_PREFIX}{file_name}");
        out.push_str(&text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
        let file_lines = text.lines().count() as u32;
        lines = lines.saturating_add(file_lines + 1);
    }

    Ok((out, lines))
}
