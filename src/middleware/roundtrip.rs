//! Round-trip wrapping chain.
//!
//! A round-trip middleware decorates the whole forwarding handler of a
//! route: it sees the inbound request before anything is proxied and can
//! inspect the response writer after the relay. The list is folded in
//! declaration order, so the last-declared middleware ends up outermost.

use std::sync::Arc;

use crate::http::handler::SharedHandler;

/// Decorates a handler.
///
/// A middleware may skip `next` entirely and answer on its own.
pub trait RoundtripMiddleware: Send + Sync + 'static {
    fn wrap(&self, next: SharedHandler) -> SharedHandler;
}

impl<F> RoundtripMiddleware for F
where
    F: Fn(SharedHandler) -> SharedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        self(next)
    }
}

/// Wrap `handler` with every middleware; the last one becomes outermost.
pub fn compose(handler: SharedHandler, middleware: &[Arc<dyn RoundtripMiddleware>]) -> SharedHandler {
    middleware
        .iter()
        .fold(handler, |next, layer| layer.wrap(next))
}
