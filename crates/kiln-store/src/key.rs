//! Object key helpers.

/// Strip leading and trailing slashes from a key.
///
/// Inner empty segments are kept; collapsing them is left to hierarchical
/// backends.
#[must_use]
pub fn normalize_key(key: &str) -> &str {
    key.trim_matches('/')
}

/// Split a key into its parent prefix and final segment.
///
/// Returns `("", name)` for top-level keys.
#[must_use]
pub fn split_key(key: &str) -> (&str, &str) {
    let key = normalize_key(key);
    match key.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_strips_slashes() {
        assert_eq!(normalize_key("/a/b/"), "a/b");
        assert_eq!(normalize_key("a/b"), "a/b");
        assert_eq!(normalize_key("/"), "");
    }

    #[test]
    fn test_split_key_nested() {
        assert_eq!(split_key("a/b/c.txt"), ("a/b", "c.txt"));
    }

    #[test]
    fn test_split_key_top_level() {
        assert_eq!(split_key("index.json"), ("", "index.json"));
    }
}
