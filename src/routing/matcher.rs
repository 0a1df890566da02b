//! Path pattern matching.
//!
//! # Responsibilities
//! - Classify a configured pattern as exact or subtree
//! - Match a request path against a pattern (case-sensitive)
//! - Clean request paths (`.`/`..` segments, repeated slashes)
//!
//! # Design Decisions
//! - A trailing `/` is the only thing that makes a pattern a subtree
//! - Matching is a byte comparison; only cleaned paths are matched, the
//!   router redirects anything else to its cleaned form
//! - No regex or wildcards, so matching stays O(pattern length)

/// A registered path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPattern {
    /// Matches only the identical path.
    Exact(String),
    /// Ends in `/`; matches itself and everything beneath it.
    Subtree(String),
}

impl PathPattern {
    /// Classify a configured pattern.
    pub fn parse(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if pattern.ends_with('/') {
            PathPattern::Subtree(pattern)
        } else {
            PathPattern::Exact(pattern)
        }
    }

    /// The pattern exactly as registered.
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Exact(p) | PathPattern::Subtree(p) => p,
        }
    }

    pub fn is_subtree(&self) -> bool {
        matches!(self, PathPattern::Subtree(_))
    }

    /// Returns true if `path` is matched by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Subtree(p) => path.starts_with(p.as_str()),
        }
    }
}

/// Canonical form of a request path.
///
/// Resolves `.` and `..` segments and collapses repeated slashes. `..` never
/// climbs above the root. A trailing slash is kept; the result always starts
/// with `/`.
pub fn clean_path(path: &str) -> String {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for s in &segments {
        cleaned.push('/');
        cleaned.push_str(s);
    }
    if cleaned.is_empty() || path.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern = PathPattern::parse("/test/error");
        assert!(!pattern.is_subtree());
        assert!(pattern.matches("/test/error"));
        assert!(!pattern.matches("/test/error/specific_error"));
        assert!(!pattern.matches("/test/err"));
        assert!(!pattern.matches("/TEST/error"));
    }

    #[test]
    fn subtree_pattern_matches_descendants() {
        let pattern = PathPattern::parse("/api/");
        assert!(pattern.is_subtree());
        assert!(pattern.matches("/api/"));
        assert!(pattern.matches("/api/v1/users"));
        assert!(!pattern.matches("/api"));
        assert!(!pattern.matches("/apiv2/"));
    }

    #[test]
    fn root_matches_everything() {
        let pattern = PathPattern::parse("/");
        assert!(pattern.matches("/"));
        assert!(pattern.matches("/anything/at/all"));
    }

    #[test]
    fn clean_paths_are_unchanged() {
        for path in ["/", "/api", "/api/", "/api/v1/users", "/a.b/..c/"] {
            assert_eq!(clean_path(path), path);
        }
    }

    #[test]
    fn dot_segments_are_resolved() {
        assert_eq!(clean_path("/api/../admin"), "/admin");
        assert_eq!(clean_path("/a/./b/"), "/a/b/");
        assert_eq!(clean_path("/a/b/.."), "/a");
        assert_eq!(clean_path("/a/../"), "/");
        assert_eq!(clean_path("/../../etc"), "/etc");
    }

    #[test]
    fn repeated_slashes_collapse() {
        assert_eq!(clean_path("//a"), "/a");
        assert_eq!(clean_path("/a//b///"), "/a/b/");
        assert_eq!(clean_path(""), "/");
    }
}
