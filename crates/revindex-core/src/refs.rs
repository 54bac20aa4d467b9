//! Ref path patterns

/// Refs path scanned when a repository configures no explicit refs
pub const DEFAULT_REFS_PATH: &str = "refs/heads";

/// Checks whether `ref_name` lives under the ref path `pattern`.
///
/// Matching is done on whole path segments: `refs/my-heads` matches
/// `refs/my-heads` and `refs/my-heads/x`, but not `refs/my-headsx`.
/// A trailing `/` or `/*` on the pattern is ignored.
pub fn ref_matches(pattern: &str, ref_name: &str) -> bool {
    let pattern = normalize_pattern(pattern);
    if pattern.is_empty() {
        return false;
    }
    match ref_name.strip_prefix(pattern) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Strips a trailing `/*` or `/` from a ref path pattern
pub fn normalize_pattern(pattern: &str) -> &str {
    let pattern = pattern.trim();
    let pattern = pattern.strip_suffix("/*").unwrap_or(pattern);
    pattern.trim_end_matches('/')
}
