//! Error types shared by every stage of a run.

use std::path::PathBuf;

/// Raw failure reported by the host's execute primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HostFailure {
    pub message: String,
}

impl HostFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while synthesizing, assembling, executing or reading back.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown type expression '{0}'")]
    UnknownType(String),

    #[error("'{0}' cannot be turned into a script identifier")]
    InvalidIdentifier(String),

    #[error("key '{key}' contains the forbidden character '{character}'")]
    InvalidKeyCharacter { key: String, character: char },

    #[error("keys '{first}' and '{second}' both become '{corrected}'")]
    KeyCollision {
        first: String,
        second: String,
        corrected: String,
    },

    #[error("unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    #[error(
        "{message} (in {origin} '{detail}', line {fragment_line}; script line {absolute_line})"
    )]
    ScriptExecution {
        message: String,
        origin: String,
        detail: String,
        fragment_line: usize,
        absolute_line: usize,
    },

    #[error("host failure: {0}")]
    HostFailure(#[from] HostFailure),

    #[error("no value at '{0}'")]
    MissingResult(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("session has already been run")]
    AlreadyRun,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
