//! Graceful shutdown and lifecycle transitions.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use common::{client, start_backend, start_proxy};
use route_relay::{run_until, stop_on, LifecycleState, ListenerConfig, Proxy, ProxyError, Route, RoutesConfig};

fn slow_routes(base: String) -> RoutesConfig {
    RoutesConfig::new(vec![
        Route::new("/test/slow", &base, "/slow"),
        Route::new("/test/very-slow", &base, "/very-slow"),
        Route::new("/test/ping", &base, "/ping"),
    ])
}

#[tokio::test]
async fn stop_lets_in_flight_requests_finish() {
    let backend = start_backend().await;
    let proxy = start_proxy(Proxy::new(slow_routes(backend.url()), ListenerConfig::default())).await;

    let url = proxy.url("/test/slow");
    let in_flight = tokio::spawn(async move {
        let resp = client().get(url).send().await.unwrap();
        (resp.status(), resp.text().await.unwrap())
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let addr = proxy.addr;
    let handle = Arc::clone(&proxy.proxy);
    proxy.shutdown().await.unwrap();

    let (status, body) = in_flight.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "done");
    assert_eq!(handle.state(), LifecycleState::Stopped);

    let refused = client()
        .get(format!("http://{addr}/test/ping"))
        .send()
        .await;
    assert!(refused.is_err());
}

#[tokio::test]
async fn stop_reports_timeout_when_requests_outlive_the_grace_period() {
    let backend = start_backend().await;
    let config = ListenerConfig {
        shutdown_grace_secs: 1,
        ..ListenerConfig::default()
    };
    let proxy = start_proxy(Proxy::new(slow_routes(backend.url()), config)).await;

    let url = proxy.url("/test/very-slow");
    let in_flight = tokio::spawn(async move { client().get(url).send().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    let result = proxy.shutdown().await;

    assert!(matches!(result, Err(ProxyError::ShutdownTimeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(in_flight.await.unwrap().is_err());
}

#[tokio::test]
async fn stop_before_start_is_not_running() {
    let proxy = Proxy::new(RoutesConfig::default(), ListenerConfig::default());
    assert!(matches!(proxy.stop().await, Err(ProxyError::NotRunning)));
}

#[tokio::test]
async fn second_start_is_rejected() {
    let proxy = start_proxy(Proxy::new(RoutesConfig::default(), ListenerConfig::default())).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    assert!(matches!(
        proxy.proxy.serve(listener).await,
        Err(ProxyError::AlreadyStarted)
    ));

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancellation_stops_a_proxy_that_starts_later() {
    let proxy = Arc::new(Proxy::new(RoutesConfig::default(), ListenerConfig::default()));

    let stopper = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        async move { stop_on(&proxy, async {}).await }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    proxy.serve(listener).await.unwrap();

    stopper.await.unwrap().unwrap();
    assert_eq!(proxy.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn run_until_serves_until_cancelled() {
    let backend = start_backend().await;
    let port = {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap().port()
    };
    let proxy = Arc::new(Proxy::new(
        slow_routes(backend.url()),
        ListenerConfig::with_port(port),
    ));

    let (cancel, cancelled) = oneshot::channel::<()>();
    let running = tokio::spawn(run_until(Arc::clone(&proxy), async move {
        let _ = cancelled.await;
    }));

    proxy.until_started().await;
    let resp = client()
        .get(format!("http://127.0.0.1:{port}/test/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    cancel.send(()).unwrap();
    running.await.unwrap().unwrap();
    assert_eq!(proxy.state(), LifecycleState::Stopped);
}
