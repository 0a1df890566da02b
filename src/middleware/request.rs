//! Request preparation chain.
//!
//! # Responsibilities
//! - Build the outbound request from the inbound one, one stage at a time
//! - Provide the built-in header, body and content-length copies
//! - Stop at the first failing stage
//!
//! # Design Decisions
//! - Stages are an ordered list of trait objects; declaration order is
//!   execution order
//! - The chain always ends in the no-op `FinishRequestPrep`
//! - The inbound body is moved, never buffered

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use thiserror::Error;

/// A failed preparation stage. The message becomes the 500 response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PrepareError {
    message: String,
}

impl PrepareError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One stage building the outgoing request from the incoming one.
///
/// Any `Fn(&mut Request<Body>, &mut Request<Body>) -> Result<(), PrepareError>`
/// closure is a preparer.
pub trait RequestPreparer: Send + Sync {
    fn prepare(
        &self,
        incoming: &mut Request<Body>,
        outgoing: &mut Request<Body>,
    ) -> Result<(), PrepareError>;
}

impl<F> RequestPreparer for F
where
    F: Fn(&mut Request<Body>, &mut Request<Body>) -> Result<(), PrepareError> + Send + Sync,
{
    fn prepare(
        &self,
        incoming: &mut Request<Body>,
        outgoing: &mut Request<Body>,
    ) -> Result<(), PrepareError> {
        self(incoming, outgoing)
    }
}

/// Terminal stage; does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishRequestPrep;

impl RequestPreparer for FinishRequestPrep {
    fn prepare(&self, _: &mut Request<Body>, _: &mut Request<Body>) -> Result<(), PrepareError> {
        Ok(())
    }
}

/// Replace the outgoing headers with a copy of the incoming ones.
///
/// `Host` names the proxy, not the target, so it is left for the client to
/// derive from the target URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyHeaders;

impl RequestPreparer for CopyHeaders {
    fn prepare(
        &self,
        incoming: &mut Request<Body>,
        outgoing: &mut Request<Body>,
    ) -> Result<(), PrepareError> {
        let mut headers = incoming.headers().clone();
        headers.remove(header::HOST);
        *outgoing.headers_mut() = headers;
        Ok(())
    }
}

/// Move the incoming body stream onto the outgoing request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyBody;

impl RequestPreparer for CopyBody {
    fn prepare(
        &self,
        incoming: &mut Request<Body>,
        outgoing: &mut Request<Body>,
    ) -> Result<(), PrepareError> {
        *outgoing.body_mut() = std::mem::take(incoming.body_mut());
        Ok(())
    }
}

/// Carry the declared `Content-Length` over to the outgoing request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyContentLength;

impl RequestPreparer for CopyContentLength {
    fn prepare(
        &self,
        incoming: &mut Request<Body>,
        outgoing: &mut Request<Body>,
    ) -> Result<(), PrepareError> {
        match incoming.headers().get(header::CONTENT_LENGTH) {
            Some(length) => {
                outgoing
                    .headers_mut()
                    .insert(header::CONTENT_LENGTH, length.clone());
            }
            None => {
                outgoing.headers_mut().remove(header::CONTENT_LENGTH);
            }
        }
        Ok(())
    }
}

/// The stages every proxy starts with.
pub fn default_request_middleware() -> Vec<Arc<dyn RequestPreparer>> {
    vec![
        Arc::new(CopyHeaders),
        Arc::new(CopyBody),
        Arc::new(CopyContentLength),
    ]
}

/// An ordered list of stages folded into a single preparer.
#[derive(Clone, Default)]
pub struct PreparerChain {
    stages: Vec<Arc<dyn RequestPreparer>>,
}

impl PreparerChain {
    pub fn new(stages: impl IntoIterator<Item = Arc<dyn RequestPreparer>>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl RequestPreparer for PreparerChain {
    fn prepare(
        &self,
        incoming: &mut Request<Body>,
        outgoing: &mut Request<Body>,
    ) -> Result<(), PrepareError> {
        for stage in &self.stages {
            stage.prepare(incoming, outgoing)?;
        }
        FinishRequestPrep.prepare(incoming, outgoing)
    }
}

impl std::fmt::Debug for PreparerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparerChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}
