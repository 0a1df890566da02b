//! Forwarding engine.
//!
//! # Responsibilities
//! - Compose the outbound URL from the route and the inbound query string
//! - Build the outbound request through the preparation chain
//! - Execute it on the shared client and relay status, headers and body
//!
//! # Design Decisions
//! - Single pass: no retries, one outbound call per inbound request
//! - The outbound response body is read fully before anything is written,
//!   so every failure up to that point can still become a clean 500
//! - Once the head is committed, failures are logged only
//! - Targets may be `http` or `https`; TLS is verified against the
//!   platform roots

use std::collections::BTreeMap;
use std::error::Error as _;

use axum::body::Body;
use axum::http::{header, Request, StatusCode, Uri};
use futures_util::future::BoxFuture;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::Instrument;
use url::form_urlencoded;

use crate::config::Route;
use crate::http::handler::Handler;
use crate::http::response::ResponseWriter;
use crate::middleware::request::{PrepareError, PreparerChain, RequestPreparer};

/// Outbound client shared by every route. Cloning shares the pool.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the outbound client, speaking both `http` and `https`.
pub fn build_client() -> HttpClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let tls = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            // Plain http targets keep working; https ones fail verification.
            tracing::warn!(error = %e, "No platform root certificates loaded");
            HttpsConnectorBuilder::new().with_tls_config(
                rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth(),
            )
        }
    };

    let https = tls.https_or_http().enable_http1().wrap_connector(http);
    Client::builder(TokioExecutor::new()).build(https)
}

/// Failures that end a proxied request with a 500.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid forwarding url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("failed to build outbound request: {0}")]
    Build(#[from] axum::http::Error),

    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error("{0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    ReadBody(#[source] axum::Error),
}

impl ForwardError {
    /// The error followed by its causes, as sent to the caller.
    ///
    /// A cause whose text already appears in the message is skipped, since
    /// several error types print their inner error in their own `Display`.
    pub fn message(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}

/// `base + path`, plus the re-encoded inbound query when there is one.
pub fn outgoing_url(route: &Route, query: Option<&str>) -> String {
    let mut url = route.target();
    let query = reencode_query(query.unwrap_or_default());
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }
    url
}

/// Parse and re-serialize a query string.
///
/// Keys come out sorted; values of a repeated key keep their order.
pub fn reencode_query(raw: &str) -> String {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in &params {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    serializer.finish()
}

/// The handler registered for one route.
pub struct Forwarder {
    route: Route,
    preparer: PreparerChain,
    client: HttpClient,
}

impl Forwarder {
    pub fn new(route: Route, preparer: PreparerChain, client: HttpClient) -> Self {
        Self {
            route,
            preparer,
            client,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    async fn forward(&self, mut incoming: Request<Body>, w: &mut ResponseWriter) {
        tracing::info!(route = %self.route, "Handling request");

        let method = incoming.method().clone();
        let url = outgoing_url(&self.route, incoming.uri().query());

        tracing::debug!(method = %method, url = %url, "Making new request");
        let mut outgoing = match build_request(&incoming, &url) {
            Ok(req) => req,
            Err(e) => return fail(w, &url, e).await,
        };

        tracing::debug!(method = %method, url = %url, "Preparing request");
        if let Err(e) = self.preparer.prepare(&mut incoming, &mut outgoing) {
            return fail(w, &url, e.into()).await;
        }

        tracing::info!(method = %method, url = %url, "Executing request");
        let response = match self.client.request(outgoing).await {
            Ok(response) => response,
            Err(e) => return fail(w, &url, e.into()).await,
        };

        let (parts, body) = response.into_parts();
        let body = match axum::body::to_bytes(Body::new(body), usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => return fail(w, &url, ForwardError::ReadBody(e)).await,
        };

        for (name, value) in parts.headers.iter() {
            if name == header::TRANSFER_ENCODING {
                continue;
            }
            w.headers_mut().append(name.clone(), value.clone());
        }

        if let Err(e) = w.write_header(parts.status) {
            tracing::warn!(url = %url, error = %e, "Could not relay response head");
            return;
        }
        if let Err(e) = w.write(body).await {
            tracing::info!(method = %method, url = %url, error = %e, "Unexpected error relaying response body");
            return;
        }

        tracing::debug!(status = %parts.status, url = %url, "Relayed response");
    }
}

impl Handler for Forwarder {
    fn serve<'a>(&'a self, req: Request<Body>, w: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        let span = tracing::info_span!(
            "forward",
            pattern = %self.route.incoming_request_path,
            method = %req.method(),
            path = %req.uri().path(),
        );
        Box::pin(self.forward(req, w).instrument(span))
    }
}

fn build_request(incoming: &Request<Body>, url: &str) -> Result<Request<Body>, ForwardError> {
    let uri: Uri = url.parse().map_err(|source| ForwardError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    Ok(Request::builder()
        .method(incoming.method().clone())
        .uri(uri)
        .body(Body::empty())?)
}

async fn fail(w: &mut ResponseWriter, url: &str, err: ForwardError) {
    let message = err.message();
    tracing::error!(url = %url, error = %message, "Proxy request failed");

    if let Err(e) = w.error(StatusCode::INTERNAL_SERVER_ERROR, &message).await {
        tracing::warn!(url = %url, error = %e, "Could not report failure to caller");
    }
}
