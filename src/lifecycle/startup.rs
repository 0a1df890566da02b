//! Startup orchestration.
//!
//! # Responsibilities
//! - Parse command-line flags (with environment fallbacks)
//! - Load the route table
//! - Build the proxy with the optional status handler and metrics
//!
//! # Design Decisions
//! - A route table that fails to load is logged and replaced by an empty
//!   one; the proxy still starts and answers 404
//! - Every flag has a `ROUTE_RELAY_` environment variable

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use crate::config::{load_config, ListenerConfig, RoutesConfig};
use crate::http::{Proxy, StatusHandler};
use crate::observability::RequestMetrics;

/// Command-line options.
#[derive(Debug, Clone, Parser)]
#[command(name = "route-relay", version, about = "Path-routing reverse proxy")]
pub struct Options {
    /// Port to listen on.
    #[arg(long, env = "ROUTE_RELAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Route table (YAML, or TOML when the extension is `.toml`).
    #[arg(long, env = "ROUTE_RELAY_ROUTES_FILE")]
    pub routes_file: PathBuf,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "ROUTE_RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "ROUTE_RELAY_METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,

    /// Answer a JSON status document on this path.
    #[arg(long, env = "ROUTE_RELAY_HEALTH_PATH")]
    pub health_path: Option<String>,
}

/// Load the route table, or an empty one if it cannot be loaded.
pub fn load_route_table(path: &Path) -> RoutesConfig {
    match load_config(path) {
        Ok(routes) => {
            tracing::info!(path = %path.display(), routes = routes.len(), "Loaded routes");
            routes
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to load routes");
            RoutesConfig::default()
        }
    }
}

/// Build the proxy described by `options`.
///
/// `with_metrics` adds [`RequestMetrics`]; pass `false` when no recorder was
/// installed.
pub fn build_proxy(options: &Options, routes: RoutesConfig, with_metrics: bool) -> Proxy {
    let mut proxy = Proxy::new(routes, ListenerConfig::with_port(options.port));

    if let Some(path) = &options.health_path {
        proxy.add_custom_handler(path.clone(), Arc::new(StatusHandler::new()));
    }
    if with_metrics {
        proxy.add_roundtrip_middleware(Arc::new(RequestMetrics));
    }

    proxy
}
