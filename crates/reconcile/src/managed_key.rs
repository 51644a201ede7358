//! Managed key annotation embedded in work item descriptions.
//!
//! A managed work item carries a line `TIDYIST_KEY: <key>` in its
//! description. The key anchors identity when no native id is given.

/// Prefix token of the annotation line
pub const PREFIX: &str = "TIDYIST_KEY:";

/// Extract the managed key from a description.
///
/// Lines are scanned top to bottom; the first annotation line with a
/// non-empty key wins.
pub fn extract(description: &str) -> Option<&str> {
    description
        .lines()
        .filter_map(|line| line.trim().strip_prefix(PREFIX))
        .map(str::trim)
        .find(|key| !key.is_empty())
}

/// Description with every annotation line removed, trimmed
pub fn strip(description: &str) -> String {
    description
        .lines()
        .filter(|line| !line.trim().starts_with(PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Build the description to store remotely.
///
/// The user text comes first, the annotation on its own last line.
/// Returns `None` when there is neither text nor key to write.
pub fn embed(description: Option<&str>, key: Option<&str>) -> Option<String> {
    let base = description.map(strip).unwrap_or_default();
    match key.filter(|k| !k.is_empty()) {
        None => description.map(|_| base),
        Some(key) if base.is_empty() => Some(format!("{PREFIX} {key}")),
        Some(key) => Some(format!("{base}\n{PREFIX} {key}")),
    }
}
