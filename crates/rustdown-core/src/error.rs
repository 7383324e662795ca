use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures of the file access gateway.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: file too large ({size} bytes, max {limit})", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("{}: unsupported file type (only .md, .markdown and .txt)", path.display())]
    UnsupportedType { path: PathBuf },

    #[error("{}: path is missing a file name", path.display())]
    MissingFileName { path: PathBuf },
}

impl FileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying cause is a missing file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Failures of the settings/session key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings store i/o for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse stored `{key}`: {source}")]
    Parse {
        key: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: toml::ser::Error,
    },

    #[error("stored `{key}` has version {found}, newer than supported version {supported}")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },
}
