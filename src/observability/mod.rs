//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt subscriber)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Both are optional: without a subscriber or recorder every event and
//!   metric is a no-op

pub mod logging;
pub mod metrics;

pub use metrics::{init_metrics, RequestMetrics};
