//! Transactional facade over a manifest index file.
//!
//! # Responsibility
//! - Create and open index files and bind them to a schema backend.
//! - Run every mutation inside a savepoint that also advances the
//!   last-write-time watermark.
//! - Delegate reads to the backend without opening a scope.
//!
//! # Invariants
//! - A `ManifestIndex` only exists in the ready state; failed creation or
//!   opening returns an error and no instance.
//! - Savepoints roll back on drop; only an explicit commit persists writes.
//! - The watermark changes only together with a committed mutation.

mod watermark;

pub use watermark::{current_unix_epoch, unix_epoch_to_system_time};

use crate::db::{self, metadata};
use crate::error::{IndexError, IndexResult};
use crate::model::manifest::Manifest;
use crate::model::version::VersionAndChannel;
use crate::model::IdType;
use crate::schema::{self, IndexBackend, SchemaVersion};
use crate::search::{SearchRequest, SearchResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

/// How an existing index file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDisposition {
    /// Read-only with standard SQLite locking.
    Read,
    /// Exclusive write access; the schema must be an exact backend match.
    ReadWrite,
    /// Read-only and lock-free through an `immutable=1` URI.
    Immutable,
}

impl OpenDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::ReadWrite => "ReadWrite",
            Self::Immutable => "ImmutableRead",
        }
    }
}

impl Display for OpenDisposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenDisposition {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "readwrite" | "read-write" => Ok(Self::ReadWrite),
            "immutable" => Ok(Self::Immutable),
            _ => Err(IndexError::InvalidDisposition(value.to_string())),
        }
    }
}

/// A manifest index bound to one connection and one schema backend.
pub struct ManifestIndex {
    conn: Connection,
    version: SchemaVersion,
    backend: Box<dyn IndexBackend>,
}

impl ManifestIndex {
    /// Creates a new index file at `path` with schema `version`.
    ///
    /// `version` may be [`SchemaVersion::LATEST`]; the resolved backend's
    /// version is what gets recorded.
    ///
    /// # Errors
    /// - `AlreadyExists` when `path` already exists.
    /// - `UnsupportedVersion` when no backend serves `version`.
    /// - `Storage`/`Io` for SQLite and file system failures. The new file is
    ///   removed again on any failure after it was created.
    pub fn create_new(path: impl AsRef<Path>, version: SchemaVersion) -> IndexResult<Self> {
        let path = path.as_ref();
        info!(
            "event=index_create module=index status=start version={version} path={}",
            path.display()
        );

        if let Err(err) = OpenOptions::new().write(true).create_new(true).open(path) {
            error!(
                "event=index_create module=index status=error error_code=create_file_failed error={err}"
            );
            return Err(if err.kind() == ErrorKind::AlreadyExists {
                IndexError::AlreadyExists(path.to_path_buf())
            } else {
                IndexError::Io(err)
            });
        }

        match db::open_for_create(path).and_then(|conn| Self::initialize(conn, version)) {
            Ok(index) => {
                info!(
                    "event=index_create module=index status=ok version={}",
                    index.version
                );
                Ok(index)
            }
            Err(err) => {
                error!(
                    "event=index_create module=index status=error error_code=initialize_failed error={err}"
                );
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!(
                        "event=index_create module=index status=cleanup_failed path={} error={remove_err}",
                        path.display()
                    );
                }
                Err(err)
            }
        }
    }

    /// Opens an existing index file.
    ///
    /// # Errors
    /// - `UnsupportedVersion` when no backend serves the on-disk version.
    /// - `UplevelIndex` when opening `ReadWrite` against a schema newer than
    ///   the backend that serves it.
    /// - `MissingMetadata` when the file is not an index.
    /// - `Storage` for SQLite failures, including lock conflicts.
    pub fn open(path: impl AsRef<Path>, disposition: OpenDisposition) -> IndexResult<Self> {
        let path = path.as_ref();
        info!(
            "event=index_open module=index status=start disposition={disposition} path={}",
            path.display()
        );

        match Self::open_inner(path, disposition) {
            Ok(index) => Ok(index),
            Err(err) => {
                error!(
                    "event=index_open module=index status=error disposition={disposition} error={err}"
                );
                Err(err)
            }
        }
    }

    fn open_inner(path: &Path, disposition: OpenDisposition) -> IndexResult<Self> {
        let conn = match disposition {
            OpenDisposition::Read => db::open_read_only(path)?,
            OpenDisposition::ReadWrite => db::open_read_write(path)?,
            OpenDisposition::Immutable => db::open_immutable(path)?,
        };

        let version = SchemaVersion::read(&conn)?;
        let backend = schema::resolve_for_open(version, disposition)?;

        let last_write = metadata::try_get_named_value::<i64>(&conn, metadata::LAST_WRITE_TIME)?;
        info!(
            "event=index_open module=index status=ok disposition={disposition} version={version} last_write={}",
            last_write.map_or_else(|| "unknown".to_string(), |seconds| seconds.to_string())
        );

        Ok(Self {
            conn,
            version,
            backend,
        })
    }

    fn initialize(mut conn: Connection, requested: SchemaVersion) -> IndexResult<Self> {
        let (version, backend) = schema::resolve_for_create(requested)?;

        let savepoint = conn.savepoint_with_name("manifestindex_createnew")?;
        metadata::create_table(&savepoint)?;
        version.write(&savepoint)?;
        backend.create_tables(&savepoint)?;
        watermark::set_last_write_time(&savepoint)?;
        savepoint.commit()?;

        Ok(Self {
            conn,
            version,
            backend,
        })
    }

    /// Schema version of the open index.
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Time of the last committed mutation.
    pub fn last_write_time(&self) -> IndexResult<SystemTime> {
        watermark::last_write_time(&self.conn)
    }

    /// Parses the manifest at `manifest_path` and adds it.
    pub fn add_manifest_from_path(
        &mut self,
        manifest_path: impl AsRef<Path>,
        relative_path: impl AsRef<Path>,
    ) -> IndexResult<()> {
        let manifest_path = manifest_path.as_ref();
        info!(
            "event=manifest_add module=index status=parse manifest_path={}",
            manifest_path.display()
        );
        let manifest = Manifest::from_path(manifest_path)?;
        self.add_manifest(&manifest, relative_path)
    }

    /// Adds a manifest stored at `relative_path`.
    ///
    /// # Errors
    /// - `ManifestExists` when the `(id, version, channel)` key is taken.
    /// - Any backend or storage error; nothing is written in that case.
    pub fn add_manifest(
        &mut self,
        manifest: &Manifest,
        relative_path: impl AsRef<Path>,
    ) -> IndexResult<()> {
        let relative_path = relative_path.as_ref();
        info!(
            "event=manifest_add module=index status=start id={} version={} relative_path={}",
            manifest.id,
            manifest.version,
            relative_path.display()
        );

        let result = self.write_scope("manifestindex_addmanifest", |backend, conn| {
            backend.add_manifest(conn, manifest, relative_path)?;
            Ok(true)
        });
        log_mutation("manifest_add", manifest, &result);
        result.map(|_| ())
    }

    /// Parses the manifest at `manifest_path` and updates it.
    pub fn update_manifest_from_path(
        &mut self,
        manifest_path: impl AsRef<Path>,
        relative_path: impl AsRef<Path>,
    ) -> IndexResult<bool> {
        let manifest_path = manifest_path.as_ref();
        info!(
            "event=manifest_update module=index status=parse manifest_path={}",
            manifest_path.display()
        );
        let manifest = Manifest::from_path(manifest_path)?;
        self.update_manifest(&manifest, relative_path)
    }

    /// Updates an existing manifest.
    ///
    /// Returns `false`, without touching the watermark, when no manifest
    /// matches or the stored values already equal `manifest`.
    pub fn update_manifest(
        &mut self,
        manifest: &Manifest,
        relative_path: impl AsRef<Path>,
    ) -> IndexResult<bool> {
        let relative_path = relative_path.as_ref();
        info!(
            "event=manifest_update module=index status=start id={} version={} relative_path={}",
            manifest.id,
            manifest.version,
            relative_path.display()
        );

        let result = self.write_scope("manifestindex_updatemanifest", |backend, conn| {
            backend.update_manifest(conn, manifest, relative_path)
        });
        log_mutation("manifest_update", manifest, &result);
        result
    }

    /// Parses the manifest at `manifest_path` and removes it.
    pub fn remove_manifest_from_path(
        &mut self,
        manifest_path: impl AsRef<Path>,
        relative_path: impl AsRef<Path>,
    ) -> IndexResult<()> {
        let manifest_path = manifest_path.as_ref();
        info!(
            "event=manifest_remove module=index status=parse manifest_path={}",
            manifest_path.display()
        );
        let manifest = Manifest::from_path(manifest_path)?;
        self.remove_manifest(&manifest, relative_path)
    }

    /// Removes a manifest.
    ///
    /// # Errors
    /// - `ManifestNotFound` when no manifest has the same key.
    pub fn remove_manifest(
        &mut self,
        manifest: &Manifest,
        relative_path: impl AsRef<Path>,
    ) -> IndexResult<()> {
        let relative_path = relative_path.as_ref();
        info!(
            "event=manifest_remove module=index status=start id={} version={} relative_path={}",
            manifest.id,
            manifest.version,
            relative_path.display()
        );

        let result = self.write_scope("manifestindex_removemanifest", |backend, conn| {
            backend.remove_manifest(conn, manifest, relative_path)?;
            Ok(true)
        });
        log_mutation("manifest_remove", manifest, &result);
        result.map(|_| ())
    }

    /// Runs the backend's pre-shipping optimization pass.
    ///
    /// Not transactional and does not move the watermark.
    pub fn prepare_for_packaging(&mut self) -> IndexResult<()> {
        info!("event=index_package module=index status=start");
        self.backend.prepare_for_packaging(&self.conn)?;
        info!("event=index_package module=index status=ok");
        Ok(())
    }

    pub fn search(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        info!("event=index_search module=index status=start request=[{request}]");
        let result = self.backend.search(&self.conn, request)?;
        info!(
            "event=index_search module=index status=ok matches={} truncated={}",
            result.matches.len(),
            result.truncated
        );
        Ok(result)
    }

    pub fn get_id_string_by_id(&self, id: IdType) -> IndexResult<Option<String>> {
        self.backend.get_id_string_by_id(&self.conn, id)
    }

    pub fn get_name_string_by_id(&self, id: IdType) -> IndexResult<Option<String>> {
        self.backend.get_name_string_by_id(&self.conn, id)
    }

    pub fn get_path_string_by_key(
        &self,
        id: IdType,
        version: &str,
        channel: &str,
    ) -> IndexResult<Option<String>> {
        self.backend
            .get_path_string_by_key(&self.conn, id, version, channel)
    }

    pub fn get_versions_by_id(&self, id: IdType) -> IndexResult<Vec<VersionAndChannel>> {
        self.backend.get_versions_by_id(&self.conn, id)
    }

    /// Runs `op` inside a named savepoint.
    ///
    /// When `op` returns `Ok(true)` the watermark is advanced and the
    /// savepoint committed. `Ok(false)` and errors drop the savepoint, which
    /// rolls back anything `op` wrote.
    fn write_scope<F>(&mut self, name: &'static str, op: F) -> IndexResult<bool>
    where
        F: FnOnce(&dyn IndexBackend, &Connection) -> IndexResult<bool>,
    {
        let savepoint = self.conn.savepoint_with_name(name)?;
        if !op(self.backend.as_ref(), &savepoint)? {
            return Ok(false);
        }

        watermark::set_last_write_time(&savepoint)?;
        savepoint.commit()?;
        Ok(true)
    }
}

fn log_mutation(event: &str, manifest: &Manifest, result: &IndexResult<bool>) {
    match result {
        Ok(true) => info!(
            "event={event} module=index status=ok id={} version={}",
            manifest.id, manifest.version
        ),
        Ok(false) => info!(
            "event={event} module=index status=unchanged id={} version={}",
            manifest.id, manifest.version
        ),
        Err(err) => error!(
            "event={event} module=index status=error id={} version={} error={err}",
            manifest.id, manifest.version
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{ManifestIndex, OpenDisposition};
    use crate::db::metadata::{self, LAST_WRITE_TIME};
    use crate::error::{IndexError, IndexResult};
    use crate::model::manifest::Manifest;
    use crate::model::version::VersionAndChannel;
    use crate::model::IdType;
    use crate::schema::v1_0::IndexBackendV1_0;
    use crate::schema::{IndexBackend, SchemaVersion};
    use crate::search::{SearchRequest, SearchResult};
    use rusqlite::Connection;
    use std::path::Path;

    /// Delegates to v1.0 but fails every add after the rows were written.
    struct FailAfterAddBackend(IndexBackendV1_0);

    impl IndexBackend for FailAfterAddBackend {
        fn version(&self) -> SchemaVersion {
            self.0.version()
        }
        fn create_tables(&self, conn: &Connection) -> IndexResult<()> {
            self.0.create_tables(conn)
        }
        fn add_manifest(
            &self,
            conn: &Connection,
            manifest: &Manifest,
            relative_path: &Path,
        ) -> IndexResult<()> {
            self.0.add_manifest(conn, manifest, relative_path)?;
            Err(IndexError::InvalidData("injected failure".to_string()))
        }
        fn update_manifest(
            &self,
            conn: &Connection,
            manifest: &Manifest,
            relative_path: &Path,
        ) -> IndexResult<bool> {
            self.0.update_manifest(conn, manifest, relative_path)
        }
        fn remove_manifest(
            &self,
            conn: &Connection,
            manifest: &Manifest,
            relative_path: &Path,
        ) -> IndexResult<()> {
            self.0.remove_manifest(conn, manifest, relative_path)
        }
        fn prepare_for_packaging(&self, conn: &Connection) -> IndexResult<()> {
            self.0.prepare_for_packaging(conn)
        }
        fn search(&self, conn: &Connection, request: &SearchRequest) -> IndexResult<SearchResult> {
            self.0.search(conn, request)
        }
        fn get_id_string_by_id(&self, conn: &Connection, id: IdType) -> IndexResult<Option<String>> {
            self.0.get_id_string_by_id(conn, id)
        }
        fn get_name_string_by_id(
            &self,
            conn: &Connection,
            id: IdType,
        ) -> IndexResult<Option<String>> {
            self.0.get_name_string_by_id(conn, id)
        }
        fn get_path_string_by_key(
            &self,
            conn: &Connection,
            id: IdType,
            version: &str,
            channel: &str,
        ) -> IndexResult<Option<String>> {
            self.0.get_path_string_by_key(conn, id, version, channel)
        }
        fn get_versions_by_id(
            &self,
            conn: &Connection,
            id: IdType,
        ) -> IndexResult<Vec<VersionAndChannel>> {
            self.0.get_versions_by_id(conn, id)
        }
    }

    fn count(index: &ManifestIndex, table: &str) -> i64 {
        index
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn disposition_parses_known_names_only() {
        assert_eq!("Read".parse::<OpenDisposition>().unwrap(), OpenDisposition::Read);
        assert_eq!(
            "read-write".parse::<OpenDisposition>().unwrap(),
            OpenDisposition::ReadWrite
        );
        assert_eq!(
            " IMMUTABLE ".parse::<OpenDisposition>().unwrap(),
            OpenDisposition::Immutable
        );

        let err = "exclusive".parse::<OpenDisposition>().unwrap_err();
        assert!(matches!(err, IndexError::InvalidDisposition(ref value) if value == "exclusive"));
    }

    #[test]
    fn disposition_display_names() {
        assert_eq!(OpenDisposition::Read.to_string(), "Read");
        assert_eq!(OpenDisposition::ReadWrite.to_string(), "ReadWrite");
        assert_eq!(OpenDisposition::Immutable.to_string(), "ImmutableRead");
    }

    #[test]
    fn backend_failure_after_partial_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let mut index = ManifestIndex::create_new(&path, SchemaVersion::LATEST).unwrap();
        metadata::set_named_value(&index.conn, LAST_WRITE_TIME, 42_i64).unwrap();

        index.backend = Box::new(FailAfterAddBackend(IndexBackendV1_0));
        let manifest = Manifest::new("Contoso.Editor", "Contoso Editor", "1.0");
        let err = index.add_manifest(&manifest, "c/Contoso.Editor.json").unwrap_err();
        assert!(matches!(err, IndexError::InvalidData(_)));

        for table in ["manifest", "ids", "names", "versions", "channels", "pathparts"] {
            assert_eq!(count(&index, table), 0, "table {table} should be empty");
        }
        let watermark: i64 = metadata::get_named_value(&index.conn, LAST_WRITE_TIME).unwrap();
        assert_eq!(watermark, 42);
    }
}
