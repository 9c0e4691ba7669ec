//! Versioned SQLite index of package manifests.
//!
//! A [`ManifestIndex`] owns one connection to a single-file index, picks a
//! schema backend from the file's recorded version, and wraps every
//! mutation in a savepoint that also advances the last-write-time watermark.

pub mod db;
pub mod error;
pub mod index;
pub mod logging;
pub mod model;
pub mod schema;
pub mod search;

pub use db::immutable_uri;
pub use error::{IndexError, IndexResult};
pub use index::{ManifestIndex, OpenDisposition};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::manifest::{Manifest, ManifestError};
pub use model::version::{compare_versions, VersionAndChannel};
pub use model::IdType;
pub use schema::{latest_version, supported_versions, IndexBackend, SchemaVersion};
pub use search::{
    MatchType, PackageMatchField, PackageMatchFilter, RequestMatch, SearchRequest, SearchResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
