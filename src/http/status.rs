//! Built-in status endpoint.

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::http::handler::Handler;
use crate::http::response::ResponseWriter;

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    status: &'a str,
    version: &'a str,
}

/// Answers `200 {"status":"OK","version":...}` without proxying.
#[derive(Debug, Clone)]
pub struct StatusHandler {
    version: String,
}

impl StatusHandler {
    pub fn new() -> Self {
        Self::with_version(env!("CARGO_PKG_VERSION"))
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Default for StatusHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for StatusHandler {
    fn serve<'a>(&'a self, req: Request<Body>, w: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let body = match serde_json::to_vec(&StatusBody {
                status: "OK",
                version: &self.version,
            }) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode status");
                    let _ = w.error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).await;
                    return;
                }
            };

            w.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            if w.write_header(StatusCode::OK).is_err() || req.method() == Method::HEAD {
                return;
            }
            if let Err(e) = w.write(body).await {
                tracing::debug!(error = %e, "Status response not delivered");
            }
        })
    }
}
