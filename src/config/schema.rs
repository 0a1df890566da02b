//! Configuration schema definitions.
//!
//! The route table is the only file-backed configuration. Listener settings
//! come from the command line and carry the fixed serving deadlines.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root of a route table file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RoutesConfig {
    /// Route definitions, in file order.
    pub routes: Vec<Route>,
}

impl RoutesConfig {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

/// A single forwarding rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Route {
    /// Inbound path pattern. A trailing `/` makes it a subtree pattern.
    pub incoming_request_path: String,

    /// Scheme and authority of the internal service (e.g. `http://users:3000`).
    pub forwarded_request_url: String,

    /// Path on the internal service every matching request is sent to.
    pub forwarded_request_path: String,
}

impl Route {
    pub fn new(
        incoming_request_path: impl Into<String>,
        forwarded_request_url: impl Into<String>,
        forwarded_request_path: impl Into<String>,
    ) -> Self {
        Self {
            incoming_request_path: incoming_request_path.into(),
            forwarded_request_url: forwarded_request_url.into(),
            forwarded_request_path: forwarded_request_path.into(),
        }
    }

    /// Target base URL joined with the target path, without a query string.
    pub fn target(&self) -> String {
        format!("{}{}", self.forwarded_request_url, self.forwarded_request_path)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.incoming_request_path, self.target())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// TCP port bound on all interfaces.
    pub port: u16,

    /// Deadline for reading request headers and each request body frame.
    pub read_timeout_secs: u64,

    /// Deadline for producing the response.
    pub write_timeout_secs: u64,

    /// How long in-flight requests may run once shutdown starts.
    pub shutdown_grace_secs: u64,
}

impl ListenerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            read_timeout_secs: 10,
            write_timeout_secs: 10,
            shutdown_grace_secs: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_target_joins_url_and_path() {
        let route = Route::new("/test/echo", "http://backend", "/echo");
        assert_eq!(route.target(), "http://backend/echo");
        assert_eq!(route.to_string(), "/test/echo -> http://backend/echo");
    }

    #[test]
    fn listener_defaults() {
        let config = ListenerConfig::with_port(9000);
        assert_eq!(config.port, 9000);
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(20));
    }
}
