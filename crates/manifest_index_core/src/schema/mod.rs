//! Versioned schema backends and the dispatcher that selects them.
//!
//! # Responsibility
//! - Define the capability contract every schema version implements.
//! - Map a requested or on-disk `SchemaVersion` to a backend instance.
//! - Refuse read-write access to schemas newer than the chosen backend.
//!
//! # Invariants
//! - The registry is ordered by version; its last entry is the latest.
//! - A backend serves its own major version only.
//! - Read-write opens require `backend.version() == on-disk version`.

pub mod v1_0;
mod version;

pub use version::SchemaVersion;

use crate::error::{IndexError, IndexResult};
use crate::index::OpenDisposition;
use crate::model::manifest::Manifest;
use crate::model::version::VersionAndChannel;
use crate::model::IdType;
use crate::search::{SearchRequest, SearchResult};
use log::{info, warn};
use rusqlite::Connection;
use std::path::Path;

/// Capability contract implemented once per schema version.
///
/// Backends never open or commit transactions; the caller owns the atomic
/// scope and passes a connection (or savepoint) that is already inside it.
pub trait IndexBackend: Send {
    /// Version of the schema this backend writes.
    fn version(&self) -> SchemaVersion;
    fn create_tables(&self, conn: &Connection) -> IndexResult<()>;
    fn add_manifest(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        relative_path: &Path,
    ) -> IndexResult<()>;
    /// Returns `false` when nothing matched or nothing changed.
    fn update_manifest(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        relative_path: &Path,
    ) -> IndexResult<bool>;
    fn remove_manifest(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        relative_path: &Path,
    ) -> IndexResult<()>;
    /// Structural optimization before the file is shipped; must not run
    /// inside a transaction.
    fn prepare_for_packaging(&self, conn: &Connection) -> IndexResult<()>;
    fn search(&self, conn: &Connection, request: &SearchRequest) -> IndexResult<SearchResult>;
    fn get_id_string_by_id(&self, conn: &Connection, id: IdType) -> IndexResult<Option<String>>;
    fn get_name_string_by_id(&self, conn: &Connection, id: IdType)
        -> IndexResult<Option<String>>;
    fn get_path_string_by_key(
        &self,
        conn: &Connection,
        id: IdType,
        version: &str,
        channel: &str,
    ) -> IndexResult<Option<String>>;
    fn get_versions_by_id(
        &self,
        conn: &Connection,
        id: IdType,
    ) -> IndexResult<Vec<VersionAndChannel>>;
}

type BackendConstructor = fn() -> Box<dyn IndexBackend>;

const BACKENDS: &[(SchemaVersion, BackendConstructor)] =
    &[(v1_0::VERSION, v1_0::IndexBackendV1_0::boxed)];

/// Returns the newest schema version this build can create.
pub fn latest_version() -> SchemaVersion {
    BACKENDS
        .last()
        .map_or(SchemaVersion::new(0, 0), |(version, _)| *version)
}

/// Returns every schema version with a registered backend, oldest first.
pub fn supported_versions() -> Vec<SchemaVersion> {
    BACKENDS.iter().map(|(version, _)| *version).collect()
}

/// Instantiates the backend serving `version`.
///
/// `LATEST` resolves to [`latest_version`]. Otherwise the registered backend
/// with the same major and the greatest minor not above the requested minor
/// is chosen.
///
/// # Errors
/// - `UnsupportedVersion` when no backend serves the version.
pub fn create_backend(version: SchemaVersion) -> IndexResult<Box<dyn IndexBackend>> {
    let target = if version.is_latest() {
        latest_version()
    } else {
        version
    };

    BACKENDS
        .iter()
        .rev()
        .find(|(candidate, _)| candidate.major == target.major && candidate.minor <= target.minor)
        .map(|(_, constructor)| constructor())
        .ok_or(IndexError::UnsupportedVersion(version))
}

/// Resolves the backend for a new index.
///
/// The returned version is the backend's own, which becomes authoritative
/// even when the caller asked for `LATEST` or an unregistered minor.
pub fn resolve_for_create(
    requested: SchemaVersion,
) -> IndexResult<(SchemaVersion, Box<dyn IndexBackend>)> {
    let backend = create_backend(requested)?;
    let resolved = backend.version();
    info!("event=schema_resolve module=schema status=ok reason=create requested={requested} resolved={resolved}");
    Ok((resolved, backend))
}

/// Resolves the backend for an existing index with on-disk version `on_disk`.
///
/// # Errors
/// - `UnsupportedVersion` when no backend serves the version.
/// - `UplevelIndex` when opening read-write and the backend is not an exact
///   match for the on-disk version.
pub fn resolve_for_open(
    on_disk: SchemaVersion,
    disposition: OpenDisposition,
) -> IndexResult<Box<dyn IndexBackend>> {
    let backend = create_backend(on_disk)?;
    let backend_version = backend.version();

    if disposition == OpenDisposition::ReadWrite && backend_version != on_disk {
        warn!(
            "event=schema_resolve module=schema status=error reason=open disposition={disposition} on_disk={on_disk} backend={backend_version} error_code=uplevel_index"
        );
        return Err(IndexError::UplevelIndex {
            on_disk,
            backend: backend_version,
        });
    }

    info!(
        "event=schema_resolve module=schema status=ok reason=open disposition={disposition} on_disk={on_disk} backend={backend_version}"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::{
        create_backend, latest_version, resolve_for_create, resolve_for_open,
        supported_versions, SchemaVersion,
    };
    use crate::error::IndexError;
    use crate::index::OpenDisposition;

    #[test]
    fn latest_sentinel_resolves_to_concrete_version() {
        let (resolved, backend) = resolve_for_create(SchemaVersion::LATEST).unwrap();
        assert_eq!(resolved, latest_version());
        assert_eq!(backend.version(), latest_version());
        assert!(!resolved.is_latest());
    }

    #[test]
    fn registry_is_sorted_and_ends_with_latest() {
        let versions = supported_versions();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(versions.last().copied(), Some(latest_version()));
    }

    #[test]
    fn newer_minor_is_served_by_newest_backend_of_major() {
        let newer = SchemaVersion::new(latest_version().major, latest_version().minor + 3);
        let backend = create_backend(newer).unwrap();
        assert_eq!(backend.version(), latest_version());
    }

    #[test]
    fn unknown_major_is_unsupported() {
        let version = SchemaVersion::new(latest_version().major + 1, 0);
        assert!(matches!(
            create_backend(version),
            Err(IndexError::UnsupportedVersion(v)) if v == version
        ));
        assert!(matches!(
            create_backend(SchemaVersion::new(0, 0)),
            Err(IndexError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn read_write_open_rejects_uplevel_minor() {
        let newer = SchemaVersion::new(latest_version().major, latest_version().minor + 1);

        let err = resolve_for_open(newer, OpenDisposition::ReadWrite)
            .err()
            .expect("uplevel read-write open must fail");
        assert!(matches!(
            err,
            IndexError::UplevelIndex { on_disk, backend } if on_disk == newer && backend == latest_version()
        ));

        assert!(resolve_for_open(newer, OpenDisposition::Read).is_ok());
        assert!(resolve_for_open(newer, OpenDisposition::Immutable).is_ok());
    }

    #[test]
    fn read_write_open_accepts_exact_version() {
        let backend = resolve_for_open(latest_version(), OpenDisposition::ReadWrite).unwrap();
        assert_eq!(backend.version(), latest_version());
    }
}
