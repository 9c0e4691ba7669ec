//! Package manifest model.
//!
//! # Responsibility
//! - Define the in-memory manifest shape consumed by schema backends.
//! - Load manifests from JSON files for the path-based index operations.
//!
//! # Invariants
//! - Backends must call `Manifest::validate()` before persisting.
//! - `(id, version, channel)` is the identity of one manifest row.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

static PACKAGE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*$").expect("package id pattern is valid")
});

/// One package version as described by its manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Package identifier, e.g. `Contoso.Editor`.
    pub id: String,
    /// Display name.
    pub name: String,
    pub version: String,
    /// Release channel; empty string is the default channel.
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub moniker: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Command names the package puts on `PATH`.
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Manifest {
    /// Creates a manifest on the default channel with no optional metadata.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            channel: String::new(),
            moniker: None,
            publisher: None,
            tags: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Reads and parses a JSON manifest file.
    ///
    /// The parsed manifest is validated before it is returned.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates declaration-level manifest invariants.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::EmptyField("id"));
        }
        if !PACKAGE_ID_PATTERN.is_match(&self.id) {
            return Err(ManifestError::InvalidId(self.id.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyField("name"));
        }
        if self.version.trim().is_empty() {
            return Err(ManifestError::EmptyField("version"));
        }
        if self.version.chars().any(char::is_whitespace) {
            return Err(ManifestError::InvalidVersion(self.version.clone()));
        }
        if self.moniker.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ManifestError::EmptyField("moniker"));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ManifestError::EmptyField("tags"));
        }
        if self.commands.iter().any(|command| command.trim().is_empty()) {
            return Err(ManifestError::EmptyField("commands"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ManifestError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    EmptyField(&'static str),
    InvalidId(String),
    InvalidVersion(String),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read manifest `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse manifest `{}`: {source}", path.display())
            }
            Self::EmptyField(field) => write!(f, "manifest field `{field}` cannot be empty"),
            Self::InvalidId(id) => write!(f, "invalid package identifier `{id}`"),
            Self::InvalidVersion(version) => write!(f, "invalid package version `{version}`"),
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::EmptyField(_) | Self::InvalidId(_) | Self::InvalidVersion(_) => None,
        }
    }
}
