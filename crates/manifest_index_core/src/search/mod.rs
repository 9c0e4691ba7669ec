//! Search request and result shapes.
//!
//! # Responsibility
//! - Describe what a caller is looking for, independent of schema version.
//! - Carry the matched package ids and the criterion that selected each one.
//!
//! # Invariants
//! - Result entries are distinct per package id.
//! - `maximum_results == 0` means unlimited.

use crate::model::IdType;
use std::fmt::{Display, Formatter};

/// How a match value is compared against stored values.
///
/// Variants are declared strongest first; result ordering relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchType {
    Exact,
    /// ASCII case folding only.
    CaseInsensitive,
    StartsWith,
    Substring,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::CaseInsensitive => "case_insensitive",
            Self::StartsWith => "starts_with",
            Self::Substring => "substring",
        }
    }
}

/// Manifest field a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PackageMatchField {
    Id,
    Name,
    Moniker,
    Tag,
    Command,
}

impl PackageMatchField {
    /// Fields a free-text query is tried against, in reporting priority.
    pub const QUERY_FIELDS: [PackageMatchField; 5] = [
        PackageMatchField::Id,
        PackageMatchField::Name,
        PackageMatchField::Moniker,
        PackageMatchField::Command,
        PackageMatchField::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Moniker => "moniker",
            Self::Tag => "tag",
            Self::Command => "command",
        }
    }
}

/// Free-text query value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMatch {
    pub match_type: MatchType,
    pub value: String,
}

impl RequestMatch {
    pub fn new(match_type: MatchType, value: impl Into<String>) -> Self {
        Self {
            match_type,
            value: value.into(),
        }
    }
}

/// Match against a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMatchFilter {
    pub field: PackageMatchField,
    pub match_type: MatchType,
    pub value: String,
}

impl PackageMatchFilter {
    pub fn new(field: PackageMatchField, match_type: MatchType, value: impl Into<String>) -> Self {
        Self {
            field,
            match_type,
            value: value.into(),
        }
    }
}

/// Search options.
///
/// `query` and `inclusions` are alternatives (any may select a package);
/// every entry in `filters` must also match. With neither a query nor
/// inclusions every package is a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: Option<RequestMatch>,
    pub inclusions: Vec<PackageMatchFilter>,
    pub filters: Vec<PackageMatchFilter>,
    pub maximum_results: usize,
}

impl SearchRequest {
    /// Creates a request with a single free-text query.
    pub fn query(match_type: MatchType, value: impl Into<String>) -> Self {
        Self {
            query: Some(RequestMatch::new(match_type, value)),
            ..Self::default()
        }
    }

    pub fn is_for_everything(&self) -> bool {
        self.query.is_none() && self.inclusions.is_empty()
    }
}

impl Display for SearchRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.query {
            Some(query) => write!(f, "query={}:'{}'", query.match_type.as_str(), query.value)?,
            None => write!(f, "query=<none>")?,
        }
        for inclusion in &self.inclusions {
            write!(
                f,
                " include={}:{}:'{}'",
                inclusion.field.as_str(),
                inclusion.match_type.as_str(),
                inclusion.value
            )?;
        }
        for filter in &self.filters {
            write!(
                f,
                " filter={}:{}:'{}'",
                filter.field.as_str(),
                filter.match_type.as_str(),
                filter.value
            )?;
        }
        write!(f, " limit={}", self.maximum_results)
    }
}

/// Matched packages and the criterion that selected each.
///
/// The criterion is `None` for packages selected by a request with neither a
/// query nor inclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub matches: Vec<(IdType, Option<PackageMatchFilter>)>,
    /// Set when `maximum_results` cut the result list short.
    pub truncated: bool,
}
