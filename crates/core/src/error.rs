use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Fatal misconfiguration: duplicate names, reserved separators, ID-space overflow.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The engine's result stream broke its fixed grammar or contradicted itself.
    #[error("engine protocol error: {reason} (line: {line:?})")]
    EngineProtocol { line: String, reason: String },

    #[error("failed to launch comparison engine {binary}: {source}")]
    EngineSpawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("comparison engine {binary} reported errors:\n{stderr}")]
    EngineInvocation { binary: String, stderr: String },

    #[error("pair {pair}: {what} already computed")]
    PairState { pair: String, what: &'static str },

    #[error("version history for {repo}: {message}")]
    History { repo: PathBuf, message: String },

    #[error("checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineProtocol {
            line: line.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attaches a path to a bare `io::Result`.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::io(path, source))
    }
}
