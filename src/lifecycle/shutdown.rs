//! Shutdown coordination for the proxy.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// The trigger is sticky: a listener that subscribes after `trigger` still
/// observes it. The outcome records whether the drain finished within the
/// grace period.
pub struct Shutdown {
    trigger: watch::Sender<bool>,
    outcome: watch::Sender<Option<bool>>,
}

/// Receiving side of the shutdown trigger.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    pub async fn recv(&mut self) {
        // A dropped coordinator also ends the wait.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (trigger, _) = watch::channel(false);
        let (outcome, _) = watch::channel(None);
        Self { trigger, outcome }
    }

    /// Subscribe to the shutdown trigger.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.trigger.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.trigger.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.trigger.borrow()
    }

    /// Record how the drain ended.
    pub fn complete(&self, clean: bool) {
        self.outcome.send_replace(Some(clean));
    }

    /// Wait for the drain to end. Returns `true` if it was clean.
    pub async fn wait_complete(&self) -> bool {
        let mut rx = self.outcome.subscribe();
        let clean = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(false),
            Err(_) => false,
        };
        clean
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
