//! Schema version value and its metadata persistence.

use crate::db::metadata::{self, MAJOR_VERSION, MINOR_VERSION};
use crate::error::{IndexError, IndexResult};
use rusqlite::Connection;
use std::fmt::{Display, Formatter};

/// On-disk structural version of an index, ordered major first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    /// Sentinel requesting the newest version this build supports.
    pub const LATEST: SchemaVersion = SchemaVersion {
        major: u32::MAX,
        minor: u32::MAX,
    };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn is_latest(self) -> bool {
        self == Self::LATEST
    }

    /// Reads the version recorded in the metadata table.
    pub fn read(conn: &Connection) -> IndexResult<Self> {
        let major: i64 = metadata::get_named_value(conn, MAJOR_VERSION)?;
        let minor: i64 = metadata::get_named_value(conn, MINOR_VERSION)?;
        Ok(Self {
            major: to_component(major, MAJOR_VERSION)?,
            minor: to_component(minor, MINOR_VERSION)?,
        })
    }

    /// Records this version in the metadata table.
    pub fn write(self, conn: &Connection) -> IndexResult<()> {
        metadata::set_named_value(conn, MAJOR_VERSION, i64::from(self.major))?;
        metadata::set_named_value(conn, MINOR_VERSION, i64::from(self.minor))?;
        Ok(())
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_latest() {
            write!(f, "latest")
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl std::str::FromStr for SchemaVersion {
    type Err = String;

    /// Parses `latest`, `MAJOR` or `MAJOR.MINOR`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::LATEST);
        }

        let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("invalid schema version `{value}`; expected MAJOR.MINOR or latest"))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

fn to_component(value: i64, name: &'static str) -> IndexResult<u32> {
    u32::try_from(value)
        .map_err(|_| IndexError::InvalidData(format!("invalid `{name}` value `{value}` in metadata")))
}

#[cfg(test)]
mod tests {
    use super::SchemaVersion;
    use crate::db::metadata;
    use rusqlite::Connection;

    #[test]
    fn ordering_is_major_then_minor() {
        assert!(SchemaVersion::new(1, 9) < SchemaVersion::new(2, 0));
        assert!(SchemaVersion::new(1, 1) > SchemaVersion::new(1, 0));
        assert!(SchemaVersion::LATEST > SchemaVersion::new(999, 999));
    }

    #[test]
    fn parses_and_displays() {
        assert_eq!("1.2".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(1, 2));
        assert_eq!("3".parse::<SchemaVersion>().unwrap(), SchemaVersion::new(3, 0));
        assert_eq!("Latest".parse::<SchemaVersion>().unwrap(), SchemaVersion::LATEST);
        assert!("1.x".parse::<SchemaVersion>().is_err());

        assert_eq!(SchemaVersion::new(1, 0).to_string(), "1.0");
        assert_eq!(SchemaVersion::LATEST.to_string(), "latest");
    }

    #[test]
    fn write_then_read_from_metadata() {
        let conn = Connection::open_in_memory().unwrap();
        metadata::create_table(&conn).unwrap();

        SchemaVersion::new(4, 2).write(&conn).unwrap();
        assert_eq!(SchemaVersion::read(&conn).unwrap(), SchemaVersion::new(4, 2));
    }
}
