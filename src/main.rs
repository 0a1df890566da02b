//! route-relay
//!
//! A reverse proxy that forwards requests to internal services by path.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     ROUTE RELAY                      │
//!                    │                                                      │
//!  Client Request    │  ┌─────────┐    ┌──────────┐    ┌─────────────────┐  │
//!  ──────────────────┼─▶│  http   │───▶│ routing  │───▶│   round-trip    │  │
//!                    │  │ server  │    │  (mux)   │    │   middleware    │  │
//!                    │  └─────────┘    └──────────┘    └────────┬────────┘  │
//!                    │                                          ▼           │
//!                    │                                 ┌─────────────────┐  │
//!                    │                                 │    forwarder    │  │
//!                    │                                 │ + request prep  │  │
//!                    │                                 └────────┬────────┘  │
//!  Client Response   │  ┌──────────┐                            │           │
//!  ◀─────────────────┼──│ response │◀───────────────────────────┘◀──────────┼──── Internal
//!                    │  │  writer  │                                        │     Service
//!                    │  └──────────┘                                        │
//!                    │                                                      │
//!                    │  config · lifecycle · observability                  │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;

use route_relay::lifecycle::{self, signals, startup};
use route_relay::observability::{init_metrics, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = startup::Options::parse();
    logging::init(&options.log_level)?;

    tracing::info!("route-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let with_metrics = match options.metrics_address {
        Some(addr) => match init_metrics(addr) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics exporter");
                false
            }
        },
        None => false,
    };

    let routes = startup::load_route_table(&options.routes_file);
    let proxy = Arc::new(startup::build_proxy(&options, routes, with_metrics));

    tracing::info!(port = options.port, "Starting server");

    if let Err(e) = lifecycle::run_until(proxy, signals::shutdown_signal()).await {
        tracing::error!(error = %e, "Stopping server");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
