//! Extension points around the forwarding engine.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → roundtrip.rs (decorators, last declared outermost)
//!         → forwarding handler
//!             → request.rs (preparers, declaration order, then no-op)
//!             → outbound call and relay
//! ```
//!
//! # Design Decisions
//! - Both chains are ordered lists folded once, when the proxy starts
//! - Chains are immutable while serving and shared by every request

pub mod request;
pub mod roundtrip;

pub use request::{
    default_request_middleware, CopyBody, CopyContentLength, CopyHeaders, FinishRequestPrep,
    PrepareError, PreparerChain, RequestPreparer,
};
pub use roundtrip::{compose, RoundtripMiddleware};
