//! Search over the v1.0 layout.
//!
//! # Invariants
//! - One result per package id; the strongest criterion that selected it
//!   is reported.
//! - Ordering is deterministic: match type strength, then id string.
//! - `StartsWith`/`Substring` use `LIKE`, which folds ASCII case.

use crate::error::IndexResult;
use crate::model::IdType;
use crate::search::{MatchType, PackageMatchField, PackageMatchFilter, SearchRequest, SearchResult};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashSet};

struct Candidate {
    id_string: String,
    criterion: Option<PackageMatchFilter>,
}

pub(super) fn search(conn: &Connection, request: &SearchRequest) -> IndexResult<SearchResult> {
    let mut candidates: BTreeMap<IdType, Candidate> = BTreeMap::new();

    if request.is_for_everything() {
        for (id, id_string) in all_package_ids(conn)? {
            candidates.insert(
                id,
                Candidate {
                    id_string,
                    criterion: None,
                },
            );
        }
    } else {
        let mut alternatives = Vec::new();
        if let Some(query) = &request.query {
            alternatives.extend(PackageMatchField::QUERY_FIELDS.iter().map(|field| {
                PackageMatchFilter::new(*field, query.match_type, query.value.clone())
            }));
        }
        alternatives.extend(request.inclusions.iter().cloned());

        for alternative in alternatives {
            for (id, id_string) in ids_matching(conn, &alternative)? {
                let candidate = candidates.entry(id).or_insert_with(|| Candidate {
                    id_string,
                    criterion: None,
                });
                let stronger = candidate
                    .criterion
                    .as_ref()
                    .map_or(true, |existing| alternative.match_type < existing.match_type);
                if stronger {
                    candidate.criterion = Some(alternative.clone());
                }
            }
        }
    }

    for filter in &request.filters {
        let allowed: HashSet<IdType> = ids_matching(conn, filter)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        candidates.retain(|id, _| allowed.contains(id));
    }

    let mut ordered: Vec<(IdType, Candidate)> = candidates.into_iter().collect();
    ordered.sort_by(|(_, left), (_, right)| {
        strength(left)
            .cmp(&strength(right))
            .then_with(|| left.id_string.cmp(&right.id_string))
    });

    let truncated = request.maximum_results > 0 && ordered.len() > request.maximum_results;
    if truncated {
        ordered.truncate(request.maximum_results);
    }

    Ok(SearchResult {
        matches: ordered
            .into_iter()
            .map(|(id, candidate)| (id, candidate.criterion))
            .collect(),
        truncated,
    })
}

fn strength(candidate: &Candidate) -> Option<MatchType> {
    candidate.criterion.as_ref().map(|criterion| criterion.match_type)
}

fn all_package_ids(conn: &Connection) -> IndexResult<Vec<(IdType, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT ids.rowid, ids.id
         FROM manifest
         JOIN ids ON manifest.id = ids.rowid;",
    )?;
    let ids = stmt
        .query_map([], |row| Ok((row.get::<_, IdType>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn ids_matching(
    conn: &Connection,
    filter: &PackageMatchFilter,
) -> IndexResult<Vec<(IdType, String)>> {
    let (source, column) = match filter.field {
        PackageMatchField::Id => ("ids AS v ON manifest.id = v.rowid", "v.id"),
        PackageMatchField::Name => ("names AS v ON manifest.name = v.rowid", "v.name"),
        PackageMatchField::Moniker => ("monikers AS v ON manifest.moniker = v.rowid", "v.moniker"),
        PackageMatchField::Tag => (
            "tags_map AS m ON m.manifest = manifest.rowid JOIN tags AS v ON m.tag = v.rowid",
            "v.tag",
        ),
        PackageMatchField::Command => (
            "commands_map AS m ON m.manifest = manifest.rowid JOIN commands AS v ON m.command = v.rowid",
            "v.command",
        ),
    };

    let (condition, bound) = match filter.match_type {
        MatchType::Exact => (format!("{column} = ?1"), filter.value.clone()),
        MatchType::CaseInsensitive => (
            format!("{column} = ?1 COLLATE NOCASE"),
            filter.value.clone(),
        ),
        MatchType::StartsWith => (
            format!("{column} LIKE ?1 ESCAPE '\\'"),
            format!("{}%", escape_like(&filter.value)),
        ),
        MatchType::Substring => (
            format!("{column} LIKE ?1 ESCAPE '\\'"),
            format!("%{}%", escape_like(&filter.value)),
        ),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT ids.rowid, ids.id
         FROM manifest
         JOIN {source}
         JOIN ids ON manifest.id = ids.rowid
         WHERE {condition};"
    ))?;
    let ids = stmt
        .query_map([bound], |row| Ok((row.get::<_, IdType>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
