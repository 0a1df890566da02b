//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that patterns and targets are well formed
//! - Detect routes registered under the same pattern
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RoutesConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::RoutesConfig;

/// A single semantic problem in a route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route {index}: incoming path is empty")]
    EmptyPattern { index: usize },

    #[error("route {index}: incoming path `{pattern}` must start with `/`")]
    RelativePattern { index: usize, pattern: String },

    #[error("route {index}: forwarded url `{url}` is not an absolute http(s) url")]
    InvalidTargetUrl { index: usize, url: String },

    #[error("route {index}: forwarded path `{path}` must be empty or start with `/`")]
    RelativeTargetPath { index: usize, path: String },

    #[error("route {index}: incoming path `{pattern}` is already registered")]
    DuplicatePattern { index: usize, pattern: String },
}

/// Validate a route table, collecting every problem found.
pub fn validate_config(config: &RoutesConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, route) in config.routes.iter().enumerate() {
        let pattern = &route.incoming_request_path;
        if pattern.is_empty() {
            errors.push(ValidationError::EmptyPattern { index });
        } else if !pattern.starts_with('/') {
            errors.push(ValidationError::RelativePattern {
                index,
                pattern: pattern.clone(),
            });
        } else if !seen.insert(pattern.as_str()) {
            errors.push(ValidationError::DuplicatePattern {
                index,
                pattern: pattern.clone(),
            });
        }

        let url_ok = Url::parse(&route.forwarded_request_url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !url_ok {
            errors.push(ValidationError::InvalidTargetUrl {
                index,
                url: route.forwarded_request_url.clone(),
            });
        }

        let path = &route.forwarded_request_path;
        if !path.is_empty() && !path.starts_with('/') {
            errors.push(ValidationError::RelativeTargetPath {
                index,
                path: path.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
