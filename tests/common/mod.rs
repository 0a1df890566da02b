//! Shared utilities for integration testing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use route_relay::{Proxy, ProxyError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

/// A local backend standing in for an internal service.
pub struct Backend {
    pub addr: SocketAddr,
    log: Log,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }
}

async fn record(State(log): State<Log>, req: Request, next: Next) -> Response {
    log.lock().unwrap().push(Recorded {
        method: req.method().to_string(),
        uri: req.uri().to_string(),
        headers: req.headers().clone(),
    });
    next.run(req).await
}

async fn error() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [("content-type", "application/json")],
        r#"{"error": "Something went wrong"}"#,
    )
}

async fn success() -> &'static str {
    r#"{"success": true}"#
}

async fn headers(headers: HeaderMap) -> Response {
    let received = headers
        .get("x-sent-downstream")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let mut response = r#"{"success": true}"#.into_response();
    let out = response.headers_mut();
    out.insert("x-added-downstream", "header added by downstream server".parse().unwrap());
    out.insert("x-received-downstream", received.parse().unwrap());
    out.append("x-multi", "one".parse().unwrap());
    out.append("x-multi", "two".parse().unwrap());
    response
}

async fn query(Query(params): Query<HashMap<String, String>>) -> String {
    format!(
        r#"{{"received": "{}"}}"#,
        params.get("sent").cloned().unwrap_or_default()
    )
}

async fn echo(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "received": params.get("sent").cloned().unwrap_or_default() }))
}

async fn body(Json(params): Json<HashMap<String, String>>) -> String {
    format!(
        r#"{{"received": "{}"}}"#,
        params.get("sent").cloned().unwrap_or_default()
    )
}

async fn binary(body: Bytes) -> Bytes {
    body
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(500)).await;
    "done"
}

async fn very_slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "too late"
}

async fn ping() -> &'static str {
    r#"{"ping": "pong"}"#
}

/// Start the mock backend on an ephemeral port.
pub async fn start_backend() -> Backend {
    let log: Log = Arc::default();

    let app = Router::new()
        .route("/error", any(error))
        .route("/success", any(success))
        .route("/headers", any(headers))
        .route("/query", get(query))
        .route("/echo", get(echo))
        .route("/body", post(body))
        .route("/binary", post(binary))
        .route("/slow", get(slow))
        .route("/very-slow", get(very_slow))
        .route("/ping", any(ping))
        .layer(middleware::from_fn_with_state(Arc::clone(&log), record));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Backend { addr, log }
}

/// A raw backend that promises 100 body bytes, sends 5, then hangs up.
#[allow(dead_code)]
pub async fn start_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nhello")
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}

/// A proxy serving on an ephemeral port.
pub struct RunningProxy {
    pub proxy: Arc<Proxy>,
    pub addr: SocketAddr,
    server: JoinHandle<Result<(), ProxyError>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the proxy and wait for its serve loop to end.
    pub async fn shutdown(self) -> Result<(), ProxyError> {
        let stopped = self.proxy.stop().await;
        let served = self.server.await.unwrap();
        stopped.and(served)
    }
}

/// Serve `proxy` on 127.0.0.1 and wait until it accepts connections.
pub async fn start_proxy(proxy: Proxy) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let proxy = Arc::new(proxy);

    let server = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        async move { proxy.serve(listener).await }
    });
    proxy.until_started().await;

    RunningProxy {
        proxy,
        addr,
        server,
    }
}

/// HTTP client that talks to the proxy directly and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
