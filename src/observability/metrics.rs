//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Expose a Prometheus-compatible metrics endpoint
//! - Count and time every request that reaches a route
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total requests by route, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution by route
//!
//! # Design Decisions
//! - Recording is a round-trip middleware, so it sees engine-generated
//!   500s as well as relayed statuses
//! - Labels use the matched pattern, not the raw path, to bound cardinality
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::BoxFuture;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::http::handler::{Handler, MatchedPattern, SharedHandler};
use crate::http::response::ResponseWriter;
use crate::middleware::RoundtripMiddleware;

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("proxy_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(route: &str, status: StatusCode, start: Instant) {
    ::metrics::counter!(
        "proxy_requests_total",
        "route" => route.to_owned(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);

    ::metrics::histogram!("proxy_request_duration_seconds", "route" => route.to_owned())
        .record(start.elapsed().as_secs_f64());
}

/// Round-trip middleware recording request count and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestMetrics;

impl RoundtripMiddleware for RequestMetrics {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        Arc::new(Metered { next })
    }
}

struct Metered {
    next: SharedHandler,
}

impl Handler for Metered {
    fn serve<'a>(&'a self, req: Request<Body>, w: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let route = req
                .extensions()
                .get::<MatchedPattern>()
                .map(|pattern| pattern.0.clone())
                .unwrap_or_else(|| req.uri().path().to_owned());
            let start = Instant::now();

            self.next.serve(req, w).await;

            // Nothing committed yet means the writer will send an empty 200.
            record_request(&route, w.status().unwrap_or(StatusCode::OK), start);
        })
    }
}
