//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Parse flags → Init logging → Load route table → Build proxy
//!
//! Running (this module):
//!     run_until: spawn start → wait for cancellation or server exit
//!
//! Shutdown (shutdown.rs):
//!     Cancel → stop → Stop accepting → Drain connections → Abort after grace
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → cancellation future
//! ```
//!
//! # Design Decisions
//! - The proxy never listens for signals itself; it is handed a future
//! - Cancellation calls `stop` exactly once
//! - Shutdown has a deadline: connections still open after it are aborted

pub mod shutdown;
pub mod signals;
pub mod startup;

use std::future::Future;
use std::sync::Arc;

pub use shutdown::{Shutdown, ShutdownSignal};

use crate::http::server::{Proxy, ProxyError};

/// Where a proxy is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built, not yet serving.
    Created,
    /// Accepting connections.
    Running,
    /// Listener closed and connections drained or aborted.
    Stopped,
}

/// Wait for `cancel`, then stop `proxy` once it has started.
pub async fn stop_on<F>(proxy: &Proxy, cancel: F) -> Result<(), ProxyError>
where
    F: Future<Output = ()>,
{
    cancel.await;
    proxy.until_started().await;
    tracing::info!("Cancellation received, stopping proxy");
    proxy.stop().await
}

/// Start `proxy` and serve until `cancel` resolves or the server exits on
/// its own.
pub async fn run_until<F>(proxy: Arc<Proxy>, cancel: F) -> Result<(), ProxyError>
where
    F: Future<Output = ()>,
{
    let mut server = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        async move { proxy.start().await }
    });

    tokio::select! {
        served = &mut server => served?,
        stopped = stop_on(&proxy, cancel) => {
            let served = server.await?;
            stopped.and(served)
        }
    }
}
