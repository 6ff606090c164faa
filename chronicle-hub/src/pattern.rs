//! Subscription pattern matching for event names.
//!
//! Supports exact match, the bare wildcard `*` (matches everything), and a
//! single leading or trailing wildcard (`tool:*`, `*:completed`). Patterns
//! with a wildcard in any other position are treated as a literal string
//! (and so will simply never match, since event names don't contain `*`) —
//! this is a small matcher for a closed set of shapes, not a glob engine.

/// Whether `name` matches `pattern`.
#[must_use]
pub fn matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    pattern == name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("user:input", "user:input"));
        assert!(!matches("user:input", "text:delta"));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        assert!(matches("*", "anything:at:all"));
        assert!(matches("*", ""));
    }

    #[test]
    fn prefix_wildcard_matches_suffix() {
        assert!(matches("*:completed", "agent:completed"));
        assert!(matches("*:completed", "node:completed"));
        assert!(!matches("*:completed", "agent:started"));
    }

    #[test]
    fn suffix_wildcard_matches_prefix() {
        assert!(matches("tool:*", "tool:called"));
        assert!(matches("tool:*", "tool:result"));
        assert!(!matches("tool:*", "text:delta"));
    }

    #[test]
    fn empty_pattern_only_matches_empty_name() {
        assert!(matches("", ""));
        assert!(!matches("", "anything"));
    }
}
