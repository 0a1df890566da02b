//! HTTP server setup and the proxy lifecycle.
//!
//! # Responsibilities
//! - Register custom handlers and one forwarding handler per route
//! - Wrap route handlers in the round-trip chain
//! - Wire up middleware (read/write deadlines, tracing)
//! - Accept connections until shutdown, then drain within the grace period
//!
//! # Design Decisions
//! - Both middleware lists are mutable only before the proxy is shared
//! - The dispatcher is rebuilt on every `serve` and immutable afterwards
//! - HTTP/1.1 only; each connection is tracked for graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::{
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::config::{ListenerConfig, RoutesConfig};
use crate::http::forward::{build_client, Forwarder, HttpClient};
use crate::http::handler::{self, MatchedPattern, SharedHandler};
use crate::lifecycle::{LifecycleState, Shutdown};
use crate::middleware::{
    compose, default_request_middleware, PreparerChain, RequestPreparer, RoundtripMiddleware,
};
use crate::routing::{Resolution, Router as ProxyRouter};

/// Extra time `stop` waits past the grace period for aborted connections
/// to wind down.
const STOP_SLACK: Duration = Duration::from_secs(1);

/// Errors from starting or stopping a proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connections: {0}")]
    Accept(#[source] std::io::Error),

    #[error("proxy already started")]
    AlreadyStarted,

    #[error("proxy is not running")]
    NotRunning,

    #[error("connections still open after {grace:?} grace period")]
    ShutdownTimeout { grace: Duration },

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Dispatcher shared by every connection.
type Mux = Arc<ProxyRouter<SharedHandler>>;

/// The reverse proxy.
pub struct Proxy {
    routes: RoutesConfig,
    config: ListenerConfig,
    request_middleware: Vec<Arc<dyn RequestPreparer>>,
    roundtrip_middleware: Vec<Arc<dyn RoundtripMiddleware>>,
    custom_handlers: Vec<(String, SharedHandler)>,
    client: HttpClient,
    state: watch::Sender<LifecycleState>,
    shutdown: Shutdown,
}

impl Proxy {
    /// Create a proxy with the default request middleware and no round-trip
    /// middleware.
    pub fn new(routes: RoutesConfig, config: ListenerConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            routes,
            config,
            request_middleware: default_request_middleware(),
            roundtrip_middleware: Vec::new(),
            custom_handlers: Vec::new(),
            client: build_client(),
            state,
            shutdown: Shutdown::new(),
        }
    }

    /// Append a request preparer; it runs after every one added before it.
    pub fn add_request_middleware(&mut self, preparer: Arc<dyn RequestPreparer>) -> &mut Self {
        self.request_middleware.push(preparer);
        self
    }

    /// Append a round-trip middleware; it wraps every one added before it.
    pub fn add_roundtrip_middleware(
        &mut self,
        middleware: Arc<dyn RoundtripMiddleware>,
    ) -> &mut Self {
        self.roundtrip_middleware.push(middleware);
        self
    }

    /// Register a handler that is served directly instead of proxied.
    ///
    /// A route with the same pattern replaces it.
    pub fn add_custom_handler(
        &mut self,
        pattern: impl Into<String>,
        handler: SharedHandler,
    ) -> &mut Self {
        self.custom_handlers.push((pattern.into(), handler));
        self
    }

    /// The request preparers, for callers that need to reorder or drop the
    /// defaults.
    pub fn request_middleware_mut(&mut self) -> &mut Vec<Arc<dyn RequestPreparer>> {
        &mut self.request_middleware
    }

    pub fn routes(&self) -> &RoutesConfig {
        &self.routes
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Resolve once the proxy has left [`LifecycleState::Created`].
    pub async fn until_started(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state != LifecycleState::Created)
            .await;
    }

    /// Bind `0.0.0.0:<port>` and serve until stopped.
    pub async fn start(&self) -> Result<(), ProxyError> {
        if self.state() != LifecycleState::Created {
            return Err(ProxyError::AlreadyStarted);
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                let err = ProxyError::Bind { addr, source };
                tracing::error!(error = %err, "Failed to start proxy");
                return Err(err);
            }
        };

        self.serve(listener).await
    }

    /// Serve on an already bound listener until stopped.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProxyError> {
        let mut shutdown = self.shutdown.subscribe();
        if !self.transition(LifecycleState::Created, LifecycleState::Running) {
            return Err(ProxyError::AlreadyStarted);
        }

        let app = self.build_app();
        let read_timeout = self.config.read_timeout();

        tracing::info!(
            address = ?listener.local_addr().ok(),
            routes = self.routes.len(),
            "Proxy listening"
        );

        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        let mut failure = None;

        loop {
            tokio::select! {
                biased;

                () = shutdown.recv() => {
                    tracing::info!(in_flight = connections.len(), "Shutdown triggered, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) if is_transient(&e) => {
                            tracing::debug!(error = %e, "Accept failed");
                            continue;
                        }
                        Err(e) => {
                            let err = ProxyError::Accept(e);
                            tracing::error!(error = %err, "Listener failed");
                            failure = Some(err);
                            break;
                        }
                    };

                    let app = app.clone();
                    let service = service_fn(move |req| app.clone().oneshot(req));
                    let conn = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .header_read_timeout(read_timeout)
                        .serve_connection(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn);

                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
                        }
                    });
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);

        let grace = self.config.shutdown_grace();
        let clean = match tokio::time::timeout(grace, graceful.shutdown()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    grace = ?grace,
                    remaining = connections.len(),
                    "Grace period expired, aborting connections"
                );
                connections.abort_all();
                false
            }
        };
        while connections.join_next().await.is_some() {}

        self.state.send_replace(LifecycleState::Stopped);
        self.shutdown.complete(clean);
        tracing::info!(clean, "Proxy stopped");

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop accepting, let in-flight requests finish, abort after the grace
    /// period.
    pub async fn stop(&self) -> Result<(), ProxyError> {
        if self.state() != LifecycleState::Running {
            return Err(ProxyError::NotRunning);
        }

        tracing::info!("Stopping proxy");
        self.shutdown.trigger();

        let grace = self.config.shutdown_grace();
        match tokio::time::timeout(grace + STOP_SLACK, self.shutdown.wait_complete()).await {
            Ok(true) => Ok(()),
            _ => {
                let err = ProxyError::ShutdownTimeout { grace };
                tracing::error!(error = %err, "Proxy did not stop cleanly");
                Err(err)
            }
        }
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Custom handlers first, then one wrapped forwarder per route.
    fn build_mux(&self) -> ProxyRouter<SharedHandler> {
        let mut mux = ProxyRouter::new();

        for (pattern, handler) in &self.custom_handlers {
            tracing::debug!(pattern = %pattern, "Registering custom handler");
            mux.insert(pattern, Arc::clone(handler));
        }

        let preparer = PreparerChain::new(self.request_middleware.iter().cloned());
        for route in &self.routes.routes {
            tracing::debug!(route = %route, "Registering route");
            let forwarder: SharedHandler = Arc::new(Forwarder::new(
                route.clone(),
                preparer.clone(),
                self.client.clone(),
            ));
            mux.insert(
                &route.incoming_request_path,
                compose(forwarder, &self.roundtrip_middleware),
            );
        }

        mux
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// A handler that misses the write deadline is answered with a 500.
    fn build_app(&self) -> Router {
        let mux: Mux = Arc::new(self.build_mux());

        Router::new()
            .fallback(dispatch)
            .with_state(mux)
            .layer(RequestBodyTimeoutLayer::new(self.config.read_timeout()))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::INTERNAL_SERVER_ERROR,
                self.config.write_timeout(),
            ))
            .layer(TraceLayer::new_for_http())
    }
}

/// Resolve the request path and run the matching handler.
async fn dispatch(State(mux): State<Mux>, mut request: Request<Body>) -> Response {
    let resolution = mux.resolve(request.uri().path());

    match resolution {
        Resolution::Matched { pattern, target } => {
            request
                .extensions_mut()
                .insert(MatchedPattern(pattern.as_str().to_owned()));
            handler::run(target, request).await
        }
        Resolution::Redirect(location) => {
            let location = match request.uri().query() {
                Some(query) => format!("{location}?{query}"),
                None => location,
            };
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        Resolution::NotFound => {
            tracing::debug!(path = %request.uri().path(), "No route matched");
            (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
        }
    }
}

/// Per-connection accept failures that leave the listener usable.
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Route;
    use crate::http::response::ResponseWriter;
    use futures_util::future::BoxFuture;

    struct Named(&'static str);

    impl handler::Handler for Named {
        fn serve<'a>(&'a self, req: Request<Body>, w: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let pattern = req
                    .extensions()
                    .get::<MatchedPattern>()
                    .map(|p| p.0.clone())
                    .unwrap_or_default();
                let _ = w.write(format!("{} via {}", self.0, pattern)).await;
            })
        }
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, location, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let proxy = Proxy::new(RoutesConfig::default(), ListenerConfig::default());
        let (status, _, body) = call(proxy.build_app(), "/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found\n");
    }

    #[tokio::test]
    async fn custom_handler_sees_matched_pattern() {
        let mut proxy = Proxy::new(RoutesConfig::default(), ListenerConfig::default());
        proxy.add_custom_handler("/admin/", Arc::new(Named("admin")));

        let (status, _, body) = call(proxy.build_app(), "/admin/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin via /admin/");
    }

    #[tokio::test]
    async fn subtree_root_redirects_with_query() {
        let mut proxy = Proxy::new(RoutesConfig::default(), ListenerConfig::default());
        proxy.add_custom_handler("/docs/", Arc::new(Named("docs")));

        let (status, location, _) = call(proxy.build_app(), "/docs?page=2").await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location.as_deref(), Some("/docs/?page=2"));
    }

    #[tokio::test]
    async fn unclean_path_redirects_with_query() {
        let mut proxy = Proxy::new(RoutesConfig::default(), ListenerConfig::default());
        proxy.add_custom_handler("/api/", Arc::new(Named("api")));
        proxy.add_custom_handler("/admin", Arc::new(Named("admin")));

        let (status, location, _) = call(proxy.build_app(), "/api/../admin?x=1").await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location.as_deref(), Some("/admin?x=1"));
    }

    #[test]
    fn route_replaces_custom_handler_with_same_pattern() {
        let routes = RoutesConfig::new(vec![Route::new("/status", "http://backend", "/")]);
        let mut proxy = Proxy::new(routes, ListenerConfig::default());
        proxy.add_custom_handler("/status", Arc::new(Named("status")));
        proxy.add_custom_handler("/other", Arc::new(Named("other")));

        assert_eq!(proxy.build_mux().len(), 2);
    }

    #[tokio::test]
    async fn stop_before_start_is_rejected() {
        let proxy = Proxy::new(RoutesConfig::default(), ListenerConfig::default());
        assert!(matches!(proxy.stop().await, Err(ProxyError::NotRunning)));
        assert_eq!(proxy.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn serve_then_stop() {
        let proxy = Arc::new(Proxy::new(RoutesConfig::default(), ListenerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let server = tokio::spawn({
            let proxy = Arc::clone(&proxy);
            async move { proxy.serve(listener).await }
        });
        proxy.until_started().await;
        assert_eq!(proxy.state(), LifecycleState::Running);

        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            proxy.serve(second).await,
            Err(ProxyError::AlreadyStarted)
        ));

        proxy.stop().await.unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(proxy.state(), LifecycleState::Stopped);
        assert!(matches!(proxy.start().await, Err(ProxyError::AlreadyStarted)));
    }
}
