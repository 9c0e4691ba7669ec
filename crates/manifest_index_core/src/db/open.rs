//! Connection bootstrap for index files.
//!
//! # Responsibility
//! - Open index files in create, read-only, read-write or immutable mode.
//! - Configure pragmas required by the index before handing out a connection.
//!
//! # Invariants
//! - Every connection is opened with `SQLITE_OPEN_NO_MUTEX`; one owner only.
//! - No busy timeout is installed; lock conflicts surface immediately.
//! - Immutable opens always go through `immutable_uri` with the URI flag set.

use super::uri::immutable_uri;
use crate::error::IndexResult;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Instant;

/// Opens (creating if needed) an index file for writing.
pub fn open_for_create(path: &Path) -> IndexResult<Connection> {
    open_with_flags(
        path,
        "create",
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Opens an existing index file read-only with standard locking.
pub fn open_read_only(path: &Path) -> IndexResult<Connection> {
    open_with_flags(
        path,
        "read",
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Opens an existing index file for reading and writing.
pub fn open_read_write(path: &Path) -> IndexResult<Connection> {
    open_with_flags(
        path,
        "readwrite",
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Opens an existing index file read-only without taking any locks.
///
/// The path is converted to a `file:` URI carrying `immutable=1`; SQLite then
/// assumes the file cannot change and skips locking and change detection.
pub fn open_immutable(path: &Path) -> IndexResult<Connection> {
    let target = immutable_uri(&path.to_string_lossy());
    open_with_flags(
        target.as_str(),
        "immutable",
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn open_with_flags(
    target: impl AsRef<Path>,
    mode: &'static str,
    flags: OpenFlags,
) -> IndexResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match Connection::open_with_flags(target.as_ref(), flags) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match configure_connection(&conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_configure_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: &Connection) -> IndexResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}
