//! SQLite storage primitives for the manifest index.
//!
//! # Responsibility
//! - Open index files in the mode an `OpenDisposition` asks for.
//! - Own the metadata table shared by every schema version.
//! - Build immutable-mode connection targets.
//!
//! # Invariants
//! - Schema version and last write time live in the metadata table, never in
//!   `PRAGMA user_version`.

pub mod metadata;
mod open;
pub mod uri;

pub use open::{open_for_create, open_immutable, open_read_only, open_read_write};
pub use uri::immutable_uri;
