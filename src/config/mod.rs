//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! route table file (YAML/TOML)
//!     → loader.rs (read, parse, interpolate ${ENV} references)
//!     → validation.rs (semantic checks)
//!     → RoutesConfig (validated, immutable)
//!     → handed to the proxy once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the proxy never re-reads it
//! - Listener settings have defaults so only the port is required
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ListenerConfig, Route, RoutesConfig};
pub use validation::ValidationError;
