//! Error taxonomy shared by the index facade and schema backends.
//!
//! # Invariants
//! - Storage failures are carried unchanged in `IndexError::Storage`.
//! - Version compatibility failures are distinct variants, never folded into
//!   storage errors.

use crate::model::manifest::ManifestError;
use crate::schema::SchemaVersion;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug)]
pub enum IndexError {
    /// Underlying SQLite connection/transaction failure.
    Storage(rusqlite::Error),
    /// No registered backend serves the requested or on-disk version.
    UnsupportedVersion(SchemaVersion),
    /// Read-write open against a schema the available backend cannot own.
    UplevelIndex {
        on_disk: SchemaVersion,
        backend: SchemaVersion,
    },
    /// Disposition text that does not name a known `OpenDisposition`.
    InvalidDisposition(String),
    /// Creation target already exists.
    AlreadyExists(PathBuf),
    /// File system failure outside SQLite, e.g. creating the index file.
    Io(std::io::Error),
    /// Required metadata entry is absent; the file is not an index.
    MissingMetadata(&'static str),
    ManifestExists {
        id: String,
        version: String,
        channel: String,
    },
    ManifestNotFound {
        id: String,
        version: String,
        channel: String,
    },
    Manifest(ManifestError),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported index schema version {version}")
            }
            Self::UplevelIndex { on_disk, backend } => write!(
                f,
                "cannot write to index with schema version {on_disk}; newest writable version is {backend}"
            ),
            Self::InvalidDisposition(value) => write!(
                f,
                "invalid open disposition `{value}`; expected read|readwrite|immutable"
            ),
            Self::AlreadyExists(path) => {
                write!(f, "index file already exists: {}", path.display())
            }
            Self::Io(err) => write!(f, "{err}"),
            Self::MissingMetadata(name) => write!(f, "index metadata value `{name}` is missing"),
            Self::ManifestExists {
                id,
                version,
                channel,
            } => write!(
                f,
                "manifest already present: [{id}, {version}, {}]",
                display_channel(channel)
            ),
            Self::ManifestNotFound {
                id,
                version,
                channel,
            } => write!(
                f,
                "manifest not found: [{id}, {version}, {}]",
                display_channel(channel)
            ),
            Self::Manifest(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid index data: {message}"),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Manifest(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::UnsupportedVersion(_)
            | Self::UplevelIndex { .. }
            | Self::InvalidDisposition(_)
            | Self::AlreadyExists(_)
            | Self::MissingMetadata(_)
            | Self::ManifestExists { .. }
            | Self::ManifestNotFound { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for IndexError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<std::io::Error> for IndexError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ManifestError> for IndexError {
    fn from(value: ManifestError) -> Self {
        Self::Manifest(value)
    }
}

fn display_channel(channel: &str) -> &str {
    if channel.is_empty() {
        "<default>"
    } else {
        channel
    }
}
