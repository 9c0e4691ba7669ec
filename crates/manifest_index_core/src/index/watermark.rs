//! Last-write-time watermark.
//!
//! # Invariants
//! - Stored as POSIX epoch seconds (`i64`) under `lastwritetime`.
//! - Written only inside the savepoint of a mutation that is about to commit.

use crate::db::metadata::{self, LAST_WRITE_TIME};
use crate::error::IndexResult;
use rusqlite::Connection;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Records the current time as the index's last write.
pub(crate) fn set_last_write_time(conn: &Connection) -> IndexResult<()> {
    metadata::set_named_value(conn, LAST_WRITE_TIME, current_unix_epoch())
}

/// Reads the last write time recorded in the index.
pub(crate) fn last_write_time(conn: &Connection) -> IndexResult<SystemTime> {
    let seconds: i64 = metadata::get_named_value(conn, LAST_WRITE_TIME)?;
    Ok(unix_epoch_to_system_time(seconds))
}

/// Current time in whole seconds since the Unix epoch.
pub fn current_unix_epoch() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        Err(before_epoch) => {
            -i64::try_from(before_epoch.duration().as_secs()).unwrap_or(i64::MAX)
        }
    }
}

pub fn unix_epoch_to_system_time(seconds: i64) -> SystemTime {
    let offset = Duration::from_secs(seconds.unsigned_abs());
    if seconds >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}
