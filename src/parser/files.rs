//! Directory listing parsers.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Fields before the name in `ls -la` output without a time column.
const LS_MIN_FIELDS: usize = 8;

/// Fields in a `find -ls` line, name included.
const FIND_MIN_FIELDS: usize = 11;

/// Symlink target separator.
const LINK_ARROW: &str = " -> ";

// ============================================================================
// FileListItem
// ============================================================================

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListItem {
    /// File name (`ls`) or full path (`find`). Symlink targets are dropped.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// `true` for directories.
    pub is_directory: bool,
}

// ============================================================================
// Parsers
// ============================================================================

/// Parses `ls -la` output.
///
/// Skips the `total` line and anything with fewer than eight fields.
#[must_use]
pub fn parse_ls_output(text: &str) -> Vec<FileListItem> {
    text.lines().filter_map(parse_ls_line).collect()
}

fn parse_ls_line(line: &str) -> Option<FileListItem> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < LS_MIN_FIELDS || fields[0] == "total" {
        return None;
    }

    let name_start = if fields.len() > LS_MIN_FIELDS && is_time_or_year(fields[7]) {
        8
    } else {
        7
    };
    build_item(fields[0], fields[4], &fields[name_start..])
}

/// Parses `find <path> -name <pattern> -ls` output.
///
/// `name` holds the path as printed by `find`.
#[must_use]
pub fn parse_find_output(text: &str) -> Vec<FileListItem> {
    text.lines().filter_map(parse_find_line).collect()
}

fn parse_find_line(line: &str) -> Option<FileListItem> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < FIND_MIN_FIELDS {
        return None;
    }
    build_item(fields[2], fields[6], &fields[10..])
}

fn build_item(mode: &str, size: &str, name_fields: &[&str]) -> Option<FileListItem> {
    if !is_mode_string(mode) {
        return None;
    }
    let size = size.parse().ok()?;

    let joined = name_fields.join(" ");
    let name = match joined.split_once(LINK_ARROW) {
        Some((name, _target)) => name.to_string(),
        None => joined,
    };
    if name.is_empty() {
        return None;
    }

    Some(FileListItem {
        name,
        size,
        is_directory: mode.starts_with('d'),
    })
}

/// `drwxr-xr-x`, `-rw-r--r--`, `lrwxrwxrwx`, optionally with a trailing `+`/`.`.
fn is_mode_string(field: &str) -> bool {
    let mut chars = field.chars();
    let type_ok = chars.next().is_some_and(|c| "-dlcbps".contains(c));
    type_ok
        && field.len() >= 10
        && chars
            .take(9)
            .all(|c| "rwxsStT-".contains(c))
}

/// `12:34` or `2023`.
fn is_time_or_year(field: &str) -> bool {
    let is_time = field
        .split_once(':')
        .is_some_and(|(h, m)| is_digits(h) && is_digits(m));
    let is_year = field.len() == 4 && is_digits(field);
    is_time || is_year
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// Tests
// ============================================================================
