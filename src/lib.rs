//! Path-routing reverse proxy library.
//!
//! A [`Proxy`] owns a static route table. Each inbound request is matched by
//! path (exact pattern, else longest subtree pattern), rebuilt by the
//! request preparation chain, forwarded once to the route's target and
//! relayed back: status, every header value, and the body.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod routing;

pub use config::{ListenerConfig, Route, RoutesConfig};
pub use http::{Proxy, ProxyError};
pub use lifecycle::{run_until, stop_on, LifecycleState, Shutdown};
