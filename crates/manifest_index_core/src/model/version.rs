//! Package version ordering.

use std::cmp::Ordering;

/// One `(version, channel)` pair available for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionAndChannel {
    pub version: String,
    pub channel: String,
}

impl VersionAndChannel {
    pub fn new(version: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            channel: channel.into(),
        }
    }
}

/// Compares dotted package versions part by part.
///
/// Numeric parts compare numerically, other parts compare as text; missing
/// trailing parts count as zero, so `1.0` equals `1.0.0`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let mut left_parts = left.split('.');
    let mut right_parts = right.split('.');

    loop {
        match (left_parts.next(), right_parts.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let ordering = compare_part(l.unwrap_or("0"), r.unwrap_or("0"));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_part(left: &str, right: &str) -> Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        // Numeric parts sort after textual ones such as `beta`.
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => left.to_ascii_lowercase().cmp(&right.to_ascii_lowercase()),
    }
}
