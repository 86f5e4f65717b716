mod from;

use std::{fmt::Display, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("manifest line {line}: {reason}")]
    MalformedManifest { line: usize, reason: String },

    #[error("lock file `{}` is corrupt: {reason}", .path.display())]
    LockStoreCorrupt { path: PathBuf, reason: String },

    #[error("failed to archive `{}`: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("failed to upload `{key}`: {reason}")]
    Transfer { key: String, reason: String },

    #[error("uploaded `{key}` but failed to record it in `{}`: {reason}", .path.display())]
    Unrecorded {
        key: String,
        path: PathBuf,
        reason: String,
    },

    #[error("`{}` does not exist", .0.display())]
    SourceDoesNotExist(PathBuf),

    #[error("{0}")]
    Cli(String),

    #[error(transparent)]
    Other(AnyError),
}

#[derive(Error, Debug)]
pub struct AnyError(anyhow::Error);

impl Display for AnyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for AnyError {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl Error {
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Other(AnyError(error.into()))
    }

    pub fn malformed<S: Into<String>>(line: usize, reason: S) -> Self {
        Error::MalformedManifest {
            line,
            reason: reason.into(),
        }
    }

    pub fn corrupt<P: Into<PathBuf>, E: Display>(path: P, reason: E) -> Self {
        Error::LockStoreCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn archive<P: Into<PathBuf>, E: Display>(path: P, reason: E) -> Self {
        Error::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unrecorded<P: Into<PathBuf>, E: Display>(key: &str, path: P, reason: E) -> Self {
        Error::Unrecorded {
            key: key.to_owned(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Re-labels an adapter error as a failed transfer of `key`.
    #[must_use]
    pub fn into_transfer(self, key: &str) -> Self {
        match self {
            Error::Transfer { .. } => self,
            err => Error::Transfer {
                key: key.to_owned(),
                reason: err.to_string(),
            },
        }
    }

    /// Fatal errors abort the whole run; everything else only fails one entry.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Archive { .. } | Error::Transfer { .. } | Error::SourceDoesNotExist(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Other(AnyError(error))
    }
}
