//! Named-value metadata table.
//!
//! # Responsibility
//! - Hold index-level values (schema version, last write time) outside any
//!   schema backend's tables.
//!
//! # Invariants
//! - The table layout is identical across every schema version, so the
//!   on-disk version can be read before a backend is chosen.

use crate::error::{IndexError, IndexResult};
use rusqlite::types::{FromSql, ToSql};
use rusqlite::{params, Connection, OptionalExtension};

pub const METADATA_TABLE: &str = "metadata";

pub const MAJOR_VERSION: &str = "majorVersion";
pub const MINOR_VERSION: &str = "minorVersion";
pub const LAST_WRITE_TIME: &str = "lastwritetime";

/// Creates the metadata table.
pub fn create_table(conn: &Connection) -> IndexResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE {METADATA_TABLE} (
            name TEXT PRIMARY KEY NOT NULL,
            value NOT NULL
        );"
    ))?;
    Ok(())
}

/// Reads a required named value.
///
/// # Errors
/// - `MissingMetadata` when the entry (or the table itself) does not exist.
pub fn get_named_value<T: FromSql>(conn: &Connection, name: &'static str) -> IndexResult<T> {
    try_get_named_value(conn, name)?.ok_or(IndexError::MissingMetadata(name))
}

/// Reads a named value, returning `None` when it is absent.
pub fn try_get_named_value<T: FromSql>(
    conn: &Connection,
    name: &'static str,
) -> IndexResult<Option<T>> {
    if !table_exists(conn)? {
        return Ok(None);
    }

    let value = conn
        .query_row(
            &format!("SELECT value FROM {METADATA_TABLE} WHERE name = ?1;"),
            [name],
            |row| row.get::<_, T>(0),
        )
        .optional()?;
    Ok(value)
}

/// Inserts or replaces a named value.
pub fn set_named_value<T: ToSql>(conn: &Connection, name: &str, value: T) -> IndexResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO {METADATA_TABLE} (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value;"
        ),
        params![name, value],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection) -> IndexResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [METADATA_TABLE],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
