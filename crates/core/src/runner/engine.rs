use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};
use crate::util::validate_bin_override;

const ENV_ENGINE_BIN: &str = "TMOSS_ENGINE_BIN";

/// Tuning flags passed on every invocation.
const MAGIC_ARGS: [&str; 8] = ["-p", "24", "-t", "26", "-g", "10", "-w", "5"];

/// One engine invocation. Manifest entries are resolved relative to `workdir`.
#[derive(Debug, Clone)]
pub struct EngineRun<'a> {
    pub workdir: &'a Path,
    pub manifest: &'a Path,
    pub results: &'a Path,
    pub threshold: u32,
}

/// The external similarity-comparison binary, seen through its file-based protocol.
pub trait ComparisonEngine: Send + Sync {
    /// Compares every manifest entry and writes the result stream to `run.results`.
    fn compare(&self, run: &EngineRun<'_>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MossEngine {
    binary: OsString,
}

impl Default for MossEngine {
    fn default() -> Self {
        Self {
            binary: engine_bin_from_env(std::env::var_os(ENV_ENGINE_BIN)),
        }
    }
}

impl MossEngine {
    pub fn new(binary: impl Into<OsString>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &OsStr {
        &self.binary
    }
}

impl ComparisonEngine for MossEngine {
    fn compare(&self, run: &EngineRun<'_>) -> Result<()> {
        let binary = self.binary.to_string_lossy().into_owned();
        debug!(
            binary = %binary,
            threshold = run.threshold,
            manifest = %run.manifest.display(),
            "invoking comparison engine"
        );

        let output = Command::new(&self.binary)
            .current_dir(run.workdir)
            .args(MAGIC_ARGS)
            .arg("-n")
            .arg(run.threshold.to_string())
            .arg("-a")
            .arg(run.manifest)
            .arg("-o")
            .arg(run.results)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| Error::EngineSpawn {
                binary: binary.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            return Err(Error::EngineInvocation { binary, stderr });
        }
        if !output.status.success() {
            return Err(Error::EngineInvocation {
                binary,
                stderr: format!("exited with status {:?}", output.status.code()),
            });
        }
        Ok(())
    }
}

pub(super) fn engine_bin_from_env(raw: Option<OsString>) -> OsString {
    raw.and_then(validate_bin_override)
        .unwrap_or_else(|| OsString::from("moss"))
}
