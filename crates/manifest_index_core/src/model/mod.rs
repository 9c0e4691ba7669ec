//! Manifest data shapes handed to schema backends.
//!
//! # Responsibility
//! - Define the manifest record written into the index.
//! - Define version/channel read models returned by lookups.

pub mod manifest;
pub mod version;

/// Row identifier of a package id inside the index.
pub type IdType = i64;
