//! `file:` URI targets for immutable SQLite opens.
//!
//! # Invariants
//! - Output always starts with `file:` and ends with `?immutable=1`.
//! - Only `?`, `#` and separators are rewritten; `.`/`..` segments are kept.
//!
//! # See also
//! - https://sqlite.org/uri.html (section 3.1)

const SCHEME: &str = "file:";
const IMMUTABLE_SUFFIX: &str = "?immutable=1";

/// Converts a local file path into an immutable-mode SQLite URI.
///
/// Separators (`/` or `\`) are normalized to `/` and adjacent runs collapse
/// to one. A leading drive designator (`C:`) gets a `/` in front so the
/// result reads `file:/C:/...`.
pub fn immutable_uri(path: &str) -> String {
    let mut target = String::with_capacity(path.len() + SCHEME.len() + IMMUTABLE_SUFFIX.len() + 1);
    target.push_str(SCHEME);

    let mut last_was_separator = false;
    if has_drive_prefix(path) {
        target.push('/');
        last_was_separator = true;
    }

    for c in path.chars() {
        let is_separator = matches!(c, '/' | '\\');
        match c {
            '?' => target.push_str("%3f"),
            '#' => target.push_str("%23"),
            _ if is_separator => {
                if !last_was_separator {
                    target.push('/');
                }
            }
            _ => target.push(c),
        }
        last_was_separator = is_separator;
    }

    target.push_str(IMMUTABLE_SUFFIX);
    target
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}
