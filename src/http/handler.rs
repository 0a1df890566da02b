//! Request handlers.
//!
//! # Responsibilities
//! - Define the handler seam shared by forwarding, custom handlers and
//!   round-trip middleware
//! - Run a handler on its own task and hand its committed head back to the
//!   connection
//!
//! # Design Decisions
//! - Handlers write through a [`ResponseWriter`] instead of returning a
//!   response, so a wrapper can observe what was committed
//! - Each request runs on its own task; a slow handler never blocks others

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::http::response::ResponseWriter;

/// Serves one request by writing to the given writer.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(&'a self, req: Request<Body>, w: &'a mut ResponseWriter) -> BoxFuture<'a, ()>;
}

/// Handler shared between the dispatcher and its wrappers.
pub type SharedHandler = Arc<dyn Handler>;

/// Pattern that selected the handler, attached to the request's extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPattern(pub String);

/// Run `handler` for `req` and return the response once its head is
/// committed. The body keeps streaming from the handler's task.
pub async fn run(handler: SharedHandler, req: Request<Body>) -> Response {
    let (mut writer, pending) = ResponseWriter::channel();

    tokio::spawn(async move {
        handler.serve(req, &mut writer).await;
        writer.finish();
    });

    match pending.recv().await {
        Some(response) => response,
        None => {
            tracing::error!("Handler ended without committing a response");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}
