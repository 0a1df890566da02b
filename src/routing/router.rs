//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store registered patterns and their targets
//! - Look up the target for a request path
//! - Return matched target, a redirect, or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact lookup via HashMap
//! - Subtree patterns kept sorted longest first, so the first hit wins
//! - Registering a pattern twice keeps the last registration

use std::collections::HashMap;

use crate::routing::matcher::{clean_path, PathPattern};

/// Outcome of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// A registered pattern matched.
    Matched { pattern: PathPattern, target: T },
    /// The caller should redirect to this path: either the cleaned form of
    /// an unclean path, or `path + "/"` when only that subtree is registered.
    Redirect(String),
    /// Nothing matched.
    NotFound,
}

/// Path dispatcher with exact-over-subtree, longest-prefix-wins semantics.
#[derive(Debug, Clone)]
pub struct Router<T> {
    exact: HashMap<String, T>,
    /// Sorted by pattern length, longest first.
    subtrees: Vec<(String, T)>,
}

impl<T: Clone> Router<T> {
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            subtrees: Vec::new(),
        }
    }

    /// Register `target` under `pattern`, replacing any earlier registration.
    pub fn insert(&mut self, pattern: &str, target: T) {
        match PathPattern::parse(pattern) {
            PathPattern::Exact(p) => {
                if self.exact.insert(p, target).is_some() {
                    tracing::warn!(pattern, "Pattern registered twice, keeping the last handler");
                }
            }
            PathPattern::Subtree(p) => {
                if let Some(slot) = self.subtrees.iter_mut().find(|(existing, _)| *existing == p) {
                    tracing::warn!(pattern, "Pattern registered twice, keeping the last handler");
                    slot.1 = target;
                    return;
                }
                let at = self
                    .subtrees
                    .iter()
                    .position(|(existing, _)| existing.len() < p.len())
                    .unwrap_or(self.subtrees.len());
                self.subtrees.insert(at, (p, target));
            }
        }
    }

    /// Resolve a request path to its target.
    pub fn resolve(&self, path: &str) -> Resolution<T> {
        // `*` (OPTIONS) and other non-origin forms are never cleaned.
        if path.starts_with('/') {
            let cleaned = clean_path(path);
            if cleaned != path {
                return Resolution::Redirect(cleaned);
            }
        }

        if let Some(target) = self.exact.get(path) {
            return Resolution::Matched {
                pattern: PathPattern::Exact(path.to_string()),
                target: target.clone(),
            };
        }

        if let Some((pattern, target)) = self.subtrees.iter().find(|(p, _)| path.starts_with(p.as_str())) {
            return Resolution::Matched {
                pattern: PathPattern::Subtree(pattern.clone()),
                target: target.clone(),
            };
        }

        if !path.ends_with('/') {
            let root = format!("{path}/");
            if self.subtrees.iter().any(|(p, _)| *p == root) {
                return Resolution::Redirect(root);
            }
        }

        Resolution::NotFound
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.exact.len() + self.subtrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}
