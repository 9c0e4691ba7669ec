//! Schema v1.0 backend.
//!
//! # Responsibility
//! - Own the v1.0 table layout: one value table per manifest field, a
//!   `manifest` row joining them, and map tables for tags and commands.
//! - Implement manifest writes and lookups with plain SQL.
//!
//! # Invariants
//! - `(id, version, channel)` is unique in `manifest`.
//! - Value rows that no manifest references are pruned after every update
//!   and removal.
//! - All tables declare `rowid INTEGER PRIMARY KEY` so `VACUUM` keeps ids.

mod search;

use super::{IndexBackend, SchemaVersion};
use crate::error::{IndexError, IndexResult};
use crate::model::manifest::Manifest;
use crate::model::version::{compare_versions, VersionAndChannel};
use crate::model::IdType;
use crate::search::{SearchRequest, SearchResult};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;

pub const VERSION: SchemaVersion = SchemaVersion::new(1, 0);

const CREATE_TABLES_SQL: &str = include_str!("create_tables.sql");

/// Single-column value table keyed by `rowid`.
#[derive(Debug, Clone, Copy)]
struct ValueTable {
    table: &'static str,
    column: &'static str,
}

const IDS: ValueTable = ValueTable { table: "ids", column: "id" };
const NAMES: ValueTable = ValueTable { table: "names", column: "name" };
const MONIKERS: ValueTable = ValueTable { table: "monikers", column: "moniker" };
const VERSIONS: ValueTable = ValueTable { table: "versions", column: "version" };
const CHANNELS: ValueTable = ValueTable { table: "channels", column: "channel" };
const PATHPARTS: ValueTable = ValueTable { table: "pathparts", column: "path" };
const TAGS: ValueTable = ValueTable { table: "tags", column: "tag" };
const COMMANDS: ValueTable = ValueTable { table: "commands", column: "command" };

/// Many-to-many link between `manifest` and a value table.
#[derive(Debug, Clone, Copy)]
struct MapTable {
    table: &'static str,
    values: ValueTable,
}

const TAGS_MAP: MapTable = MapTable { table: "tags_map", values: TAGS };
const COMMANDS_MAP: MapTable = MapTable { table: "commands_map", values: COMMANDS };

/// Columns of `manifest` that point into one-to-one value tables.
const MANIFEST_VALUE_COLUMNS: &[(&str, ValueTable)] = &[
    ("id", IDS),
    ("name", NAMES),
    ("moniker", MONIKERS),
    ("version", VERSIONS),
    ("channel", CHANNELS),
    ("pathpart", PATHPARTS),
];

#[derive(Debug, Default)]
pub struct IndexBackendV1_0;

impl IndexBackendV1_0 {
    pub fn boxed() -> Box<dyn IndexBackend> {
        Box::new(Self)
    }
}

/// Stored state of one manifest row, compared to detect no-op updates.
#[derive(Debug, PartialEq, Eq)]
struct ManifestState {
    name: String,
    moniker: Option<String>,
    path: String,
    tags: BTreeSet<String>,
    commands: BTreeSet<String>,
}

impl ManifestState {
    fn from_manifest(manifest: &Manifest, path: String) -> Self {
        Self {
            name: manifest.name.clone(),
            moniker: manifest.moniker.clone(),
            path,
            tags: manifest.tags.iter().cloned().collect(),
            commands: manifest.commands.iter().cloned().collect(),
        }
    }
}

impl IndexBackend for IndexBackendV1_0 {
    fn version(&self) -> SchemaVersion {
        VERSION
    }

    fn create_tables(&self, conn: &Connection) -> IndexResult<()> {
        conn.execute_batch(CREATE_TABLES_SQL)?;
        Ok(())
    }

    fn add_manifest(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        relative_path: &Path,
    ) -> IndexResult<()> {
        manifest.validate()?;

        let id = ensure_value(conn, IDS, &manifest.id)?;
        let name = ensure_value(conn, NAMES, &manifest.name)?;
        let moniker = manifest
            .moniker
            .as_deref()
            .map(|moniker| ensure_value(conn, MONIKERS, moniker))
            .transpose()?;
        let version = ensure_value(conn, VERSIONS, &manifest.version)?;
        let channel = ensure_value(conn, CHANNELS, &manifest.channel)?;
        let pathpart = ensure_value(conn, PATHPARTS, &normalize_relative_path(relative_path))?;

        let inserted = conn.execute(
            "INSERT INTO manifest (id, name, moniker, version, channel, pathpart)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![id, name, moniker, version, channel, pathpart],
        );
        match inserted {
            Err(err) if is_constraint_violation(&err) => {
                return Err(IndexError::ManifestExists {
                    id: manifest.id.clone(),
                    version: manifest.version.clone(),
                    channel: manifest.channel.clone(),
                });
            }
            other => {
                other?;
            }
        }

        let manifest_row = conn.last_insert_rowid();
        insert_map_values(conn, TAGS_MAP, manifest_row, &manifest.tags)?;
        insert_map_values(conn, COMMANDS_MAP, manifest_row, &manifest.commands)?;
        Ok(())
    }

    fn update_manifest(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        relative_path: &Path,
    ) -> IndexResult<bool> {
        manifest.validate()?;

        let Some(manifest_row) = find_manifest_row(conn, manifest)? else {
            return Ok(false);
        };

        let path = normalize_relative_path(relative_path);
        let wanted = ManifestState::from_manifest(manifest, path);
        if load_manifest_state(conn, manifest_row)? == wanted {
            return Ok(false);
        }

        let name = ensure_value(conn, NAMES, &wanted.name)?;
        let moniker = wanted
            .moniker
            .as_deref()
            .map(|moniker| ensure_value(conn, MONIKERS, moniker))
            .transpose()?;
        let pathpart = ensure_value(conn, PATHPARTS, &wanted.path)?;
        conn.execute(
            "UPDATE manifest
             SET name = ?2, moniker = ?3, pathpart = ?4
             WHERE rowid = ?1;",
            params![manifest_row, name, moniker, pathpart],
        )?;

        delete_map_values(conn, TAGS_MAP, manifest_row)?;
        insert_map_values(conn, TAGS_MAP, manifest_row, &manifest.tags)?;
        delete_map_values(conn, COMMANDS_MAP, manifest_row)?;
        insert_map_values(conn, COMMANDS_MAP, manifest_row, &manifest.commands)?;

        prune_orphans(conn)?;
        Ok(true)
    }

    fn remove_manifest(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        _relative_path: &Path,
    ) -> IndexResult<()> {
        let Some(manifest_row) = find_manifest_row(conn, manifest)? else {
            return Err(IndexError::ManifestNotFound {
                id: manifest.id.clone(),
                version: manifest.version.clone(),
                channel: manifest.channel.clone(),
            });
        };

        delete_map_values(conn, TAGS_MAP, manifest_row)?;
        delete_map_values(conn, COMMANDS_MAP, manifest_row)?;
        conn.execute("DELETE FROM manifest WHERE rowid = ?1;", [manifest_row])?;

        prune_orphans(conn)?;
        Ok(())
    }

    fn prepare_for_packaging(&self, conn: &Connection) -> IndexResult<()> {
        conn.execute_batch("ANALYZE; VACUUM;")?;
        Ok(())
    }

    fn search(&self, conn: &Connection, request: &SearchRequest) -> IndexResult<SearchResult> {
        search::search(conn, request)
    }

    fn get_id_string_by_id(&self, conn: &Connection, id: IdType) -> IndexResult<Option<String>> {
        let value = conn
            .query_row("SELECT id FROM ids WHERE rowid = ?1;", [id], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn get_name_string_by_id(
        &self,
        conn: &Connection,
        id: IdType,
    ) -> IndexResult<Option<String>> {
        let value = conn
            .query_row(
                "SELECT names.name
                 FROM manifest
                 JOIN names ON manifest.name = names.rowid
                 WHERE manifest.id = ?1
                 ORDER BY manifest.rowid DESC
                 LIMIT 1;",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_path_string_by_key(
        &self,
        conn: &Connection,
        id: IdType,
        version: &str,
        channel: &str,
    ) -> IndexResult<Option<String>> {
        let value = conn
            .query_row(
                "SELECT pathparts.path
                 FROM manifest
                 JOIN versions ON manifest.version = versions.rowid
                 JOIN channels ON manifest.channel = channels.rowid
                 JOIN pathparts ON manifest.pathpart = pathparts.rowid
                 WHERE manifest.id = ?1
                   AND versions.version = ?2
                   AND channels.channel = ?3;",
                params![id, version, channel],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_versions_by_id(
        &self,
        conn: &Connection,
        id: IdType,
    ) -> IndexResult<Vec<VersionAndChannel>> {
        let mut stmt = conn.prepare(
            "SELECT versions.version, channels.channel
             FROM manifest
             JOIN versions ON manifest.version = versions.rowid
             JOIN channels ON manifest.channel = channels.rowid
             WHERE manifest.id = ?1;",
        )?;
        let mut versions = stmt
            .query_map([id], |row| {
                Ok(VersionAndChannel::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        versions.sort_by(|left, right| {
            compare_versions(&right.version, &left.version)
                .then_with(|| left.channel.cmp(&right.channel))
        });
        Ok(versions)
    }
}

/// Returns the rowid of `value` in `table`, inserting it when absent.
fn ensure_value(conn: &Connection, table: ValueTable, value: &str) -> IndexResult<i64> {
    let ValueTable { table, column } = table;
    conn.execute(
        &format!("INSERT INTO {table} ({column}) VALUES (?1) ON CONFLICT({column}) DO NOTHING;"),
        [value],
    )?;
    let rowid = conn.query_row(
        &format!("SELECT rowid FROM {table} WHERE {column} = ?1;"),
        [value],
        |row| row.get(0),
    )?;
    Ok(rowid)
}

fn insert_map_values(
    conn: &Connection,
    map: MapTable,
    manifest_row: i64,
    values: &[String],
) -> IndexResult<()> {
    let map_column = map.values.column;
    for value in values {
        let value_row = ensure_value(conn, map.values, value)?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (manifest, {map_column}) VALUES (?1, ?2);",
                map.table
            ),
            params![manifest_row, value_row],
        )?;
    }
    Ok(())
}

fn delete_map_values(conn: &Connection, map: MapTable, manifest_row: i64) -> IndexResult<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE manifest = ?1;", map.table),
        [manifest_row],
    )?;
    Ok(())
}

fn load_map_values(
    conn: &Connection,
    map: MapTable,
    manifest_row: i64,
) -> IndexResult<BTreeSet<String>> {
    let ValueTable { table, column } = map.values;
    let mut stmt = conn.prepare(&format!(
        "SELECT {table}.{column}
         FROM {map_table}
         JOIN {table} ON {map_table}.{column} = {table}.rowid
         WHERE {map_table}.manifest = ?1;",
        map_table = map.table
    ))?;
    let values = stmt
        .query_map([manifest_row], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(values)
}

fn find_manifest_row(conn: &Connection, manifest: &Manifest) -> IndexResult<Option<i64>> {
    let row = conn
        .query_row(
            "SELECT manifest.rowid
             FROM manifest
             JOIN ids ON manifest.id = ids.rowid
             JOIN versions ON manifest.version = versions.rowid
             JOIN channels ON manifest.channel = channels.rowid
             WHERE ids.id = ?1
               AND versions.version = ?2
               AND channels.channel = ?3;",
            params![manifest.id, manifest.version, manifest.channel],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row)
}

fn load_manifest_state(conn: &Connection, manifest_row: i64) -> IndexResult<ManifestState> {
    let (name, moniker, path) = conn.query_row(
        "SELECT names.name, monikers.moniker, pathparts.path
         FROM manifest
         JOIN names ON manifest.name = names.rowid
         LEFT JOIN monikers ON manifest.moniker = monikers.rowid
         JOIN pathparts ON manifest.pathpart = pathparts.rowid
         WHERE manifest.rowid = ?1;",
        [manifest_row],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    )?;

    Ok(ManifestState {
        name,
        moniker,
        path,
        tags: load_map_values(conn, TAGS_MAP, manifest_row)?,
        commands: load_map_values(conn, COMMANDS_MAP, manifest_row)?,
    })
}

fn prune_orphans(conn: &Connection) -> IndexResult<()> {
    for (manifest_column, values) in MANIFEST_VALUE_COLUMNS {
        conn.execute(
            &format!(
                "DELETE FROM {table}
                 WHERE rowid NOT IN (
                     SELECT {manifest_column} FROM manifest WHERE {manifest_column} IS NOT NULL
                 );",
                table = values.table
            ),
            [],
        )?;
    }
    for map in [TAGS_MAP, COMMANDS_MAP] {
        conn.execute(
            &format!(
                "DELETE FROM {table}
                 WHERE rowid NOT IN (SELECT {column} FROM {map_table});",
                table = map.values.table,
                column = map.values.column,
                map_table = map.table
            ),
            [],
        )?;
    }
    Ok(())
}

fn normalize_relative_path(relative_path: &Path) -> String {
    relative_path.to_string_lossy().replace('\\', "/")
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::{normalize_relative_path, IndexBackendV1_0, VERSION};
    use crate::error::IndexError;
    use crate::model::manifest::Manifest;
    use crate::schema::IndexBackend;
    use rusqlite::Connection;
    use std::path::Path;

    fn backend_with_tables() -> (IndexBackendV1_0, Connection) {
        let conn = Connection::open_in_memory().unwrap();
        let backend = IndexBackendV1_0;
        backend.create_tables(&conn).unwrap();
        (backend, conn)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
            .unwrap()
    }

    fn editor(version: &str) -> Manifest {
        let mut manifest = Manifest::new("Contoso.Editor", "Contoso Editor", version);
        manifest.tags = vec!["text".to_string(), "editor".to_string()];
        manifest.commands = vec!["cedit".to_string()];
        manifest
    }

    #[test]
    fn reports_v1_0() {
        assert_eq!(IndexBackendV1_0.version(), VERSION);
    }

    #[test]
    fn duplicate_key_is_reported_as_manifest_exists() {
        let (backend, conn) = backend_with_tables();
        let manifest = editor("1.0");
        backend
            .add_manifest(&conn, &manifest, Path::new("c/Contoso.Editor/1.0.json"))
            .unwrap();

        let err = backend
            .add_manifest(&conn, &manifest, Path::new("c/Contoso.Editor/1.0.json"))
            .unwrap_err();
        assert!(matches!(err, IndexError::ManifestExists { ref id, .. } if id == "Contoso.Editor"));
    }

    #[test]
    fn duplicate_tags_are_stored_once() {
        let (backend, conn) = backend_with_tables();
        let mut manifest = editor("1.0");
        manifest.tags = vec!["text".to_string(), "text".to_string()];
        backend
            .add_manifest(&conn, &manifest, Path::new("a.json"))
            .unwrap();

        assert_eq!(count(&conn, "tags"), 1);
        assert_eq!(count(&conn, "tags_map"), 1);
    }

    #[test]
    fn update_with_identical_values_reports_no_change() {
        let (backend, conn) = backend_with_tables();
        let manifest = editor("1.0");
        backend
            .add_manifest(&conn, &manifest, Path::new("a.json"))
            .unwrap();

        let changed = backend
            .update_manifest(&conn, &manifest, Path::new("a.json"))
            .unwrap();
        assert!(!changed);
    }

    #[test]
    fn update_rewrites_values_and_prunes_orphans() {
        let (backend, conn) = backend_with_tables();
        let mut manifest = editor("1.0");
        backend
            .add_manifest(&conn, &manifest, Path::new("old.json"))
            .unwrap();

        manifest.name = "Contoso Editor Pro".to_string();
        manifest.tags = vec!["text".to_string()];
        let changed = backend
            .update_manifest(&conn, &manifest, Path::new("new.json"))
            .unwrap();
        assert!(changed);

        assert_eq!(count(&conn, "names"), 1);
        assert_eq!(count(&conn, "pathparts"), 1);
        assert_eq!(count(&conn, "tags"), 1);
        let id = conn
            .query_row("SELECT rowid FROM ids;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(
            backend.get_name_string_by_id(&conn, id).unwrap().as_deref(),
            Some("Contoso Editor Pro")
        );
        assert_eq!(
            backend
                .get_path_string_by_key(&conn, id, "1.0", "")
                .unwrap()
                .as_deref(),
            Some("new.json")
        );
    }

    #[test]
    fn remove_deletes_rows_and_orphaned_values() {
        let (backend, conn) = backend_with_tables();
        let manifest = editor("1.0");
        backend
            .add_manifest(&conn, &manifest, Path::new("a.json"))
            .unwrap();
        backend
            .remove_manifest(&conn, &manifest, Path::new("a.json"))
            .unwrap();

        for table in [
            "manifest", "ids", "names", "versions", "channels", "pathparts", "tags", "tags_map",
            "commands", "commands_map",
        ] {
            assert_eq!(count(&conn, table), 0, "table {table} should be empty");
        }
    }

    #[test]
    fn remove_missing_manifest_is_not_found() {
        let (backend, conn) = backend_with_tables();
        let err = backend
            .remove_manifest(&conn, &editor("9.9"), Path::new("a.json"))
            .unwrap_err();
        assert!(matches!(err, IndexError::ManifestNotFound { .. }));
    }

    #[test]
    fn versions_are_sorted_newest_first() {
        let (backend, conn) = backend_with_tables();
        for (version, channel) in [("1.9", ""), ("1.10", ""), ("1.10", "beta"), ("1.2", "")] {
            let mut manifest = editor(version);
            manifest.channel = channel.to_string();
            backend
                .add_manifest(&conn, &manifest, Path::new(&format!("{version}-{channel}.json")))
                .unwrap();
        }
        let id = conn
            .query_row("SELECT rowid FROM ids;", [], |row| row.get(0))
            .unwrap();

        let versions = backend.get_versions_by_id(&conn, id).unwrap();
        let flattened: Vec<(&str, &str)> = versions
            .iter()
            .map(|v| (v.version.as_str(), v.channel.as_str()))
            .collect();
        assert_eq!(
            flattened,
            vec![("1.10", ""), ("1.10", "beta"), ("1.9", ""), ("1.2", "")]
        );
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        assert_eq!(
            normalize_relative_path(Path::new("manifests\\c\\Contoso.json")),
            "manifests/c/Contoso.json"
        );
    }
}
