//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (exact lookup, then longest subtree prefix)
//!     → matcher.rs (pattern classification)
//!     → Return: matched handler, subtree redirect, or NotFound
//!
//! Route Registration (at start):
//!     custom handlers, then one forwarding handler per Route
//!     → Freeze as immutable Router behind Arc
//! ```
//!
//! # Design Decisions
//! - Routes registered at start, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: list order never affects which pattern matches

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{Resolution, Router};
