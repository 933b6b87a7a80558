use std::path::PathBuf;
use thiserror::Error;

/// Errors raised inside an adapter.
///
/// They never cross `TestAdapter::run`; the run boundary logs them and
/// degrades to an empty result.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("No {framework} executable found under {}", root.display())]
    ExecutableNotFound { framework: String, root: PathBuf },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("Invalid glob pattern: {0}")]
    Pattern(String),
}

impl AdapterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AdapterError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

impl From<ignore::Error> for AdapterError {
    fn from(err: ignore::Error) -> Self {
        AdapterError::Pattern(err.to_string())
    }
}
