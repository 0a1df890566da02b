//! Response writing.
//!
//! # Responsibilities
//! - Give handlers a writer that commits headers, status and body in order
//! - Hand the committed head to the dispatcher as soon as it is written
//! - Stream body chunks to the caller after the head is on its way
//!
//! # Design Decisions
//! - Explicit state machine: Unstarted → HeadersSent → BodySent
//! - A second `write_header` is rejected, so a late failure can never turn
//!   into a second response
//! - Writing a body before a status commits `200 OK` first
//! - A writer dropped without writing commits an empty `200 OK`

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Body chunks buffered between the handler and the connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

type BodyChunk = Result<Bytes, std::io::Error>;

/// Progress of a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Nothing has been committed; headers may still change.
    Unstarted,
    /// Status and headers are committed.
    HeadersSent,
    /// At least one body write has been attempted.
    BodySent,
}

/// Errors raised by out-of-order or undeliverable writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("response headers already sent with status {0}")]
    HeadersCommitted(StatusCode),

    #[error("response body already finished")]
    Finished,

    #[error("client is no longer receiving the response")]
    Disconnected,
}

/// Writer handed to every [`Handler`](crate::http::handler::Handler).
pub struct ResponseWriter {
    state: WriteState,
    status: Option<StatusCode>,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response<Body>>>,
    body_tx: Option<mpsc::Sender<BodyChunk>>,
    finished: bool,
}

/// Receiving side of a [`ResponseWriter`], held by the dispatcher.
pub struct PendingResponse {
    head_rx: oneshot::Receiver<Response<Body>>,
}

impl PendingResponse {
    /// Wait for the handler to commit its head.
    ///
    /// Returns `None` if the writer vanished without committing, which only
    /// happens when the handler task panicked.
    pub async fn recv(self) -> Option<Response<Body>> {
        self.head_rx.await.ok()
    }
}

impl ResponseWriter {
    /// Create a writer and the pending response it will fulfil.
    pub fn channel() -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let writer = Self {
            state: WriteState::Unstarted,
            status: None,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx: None,
            finished: false,
        };
        (writer, PendingResponse { head_rx })
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    /// Status code, once committed.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response headers. Changes after the head is committed have no effect.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Commit status and headers.
    pub fn write_header(&mut self, status: StatusCode) -> Result<(), WriteError> {
        if let Some(committed) = self.status {
            tracing::warn!(
                committed = %committed,
                attempted = %status,
                "Superfluous write_header call"
            );
            return Err(WriteError::HeadersCommitted(committed));
        }

        let (body_tx, body_rx) = mpsc::channel::<BodyChunk>(BODY_CHANNEL_CAPACITY);
        let body = Body::from_stream(futures_util::stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();

        self.status = Some(status);
        self.state = WriteState::HeadersSent;
        self.body_tx = Some(body_tx);

        let delivered = self
            .head_tx
            .take()
            .map(|head_tx| head_tx.send(response).is_ok())
            .unwrap_or(false);

        if delivered {
            Ok(())
        } else {
            Err(WriteError::Disconnected)
        }
    }

    /// Write a body chunk, committing `200 OK` first if needed.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), WriteError> {
        if self.finished {
            return Err(WriteError::Finished);
        }
        if self.status.is_none() {
            self.write_header(StatusCode::OK)?;
        }
        self.state = WriteState::BodySent;

        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }

        let body_tx = self.body_tx.as_ref().ok_or(WriteError::Finished)?;
        body_tx
            .send(Ok(chunk))
            .await
            .map_err(|_| WriteError::Disconnected)
    }

    /// Reply with a plain-text error, like the caller would see from any
    /// engine-generated failure.
    pub async fn error(&mut self, status: StatusCode, message: &str) -> Result<(), WriteError> {
        if let Some(committed) = self.status {
            return Err(WriteError::HeadersCommitted(committed));
        }

        self.headers.remove(header::CONTENT_LENGTH);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        self.write_header(status)?;
        self.write(message.to_owned()).await
    }

    /// End the response. Commits an empty `200 OK` if nothing was written.
    pub fn finish(&mut self) {
        if self.status.is_none() {
            let _ = self.write_header(StatusCode::OK);
        }
        self.body_tx = None;
        self.finished = true;
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        // A panicking handler leaves the head uncommitted so the dispatcher
        // can answer 500 instead.
        if self.status.is_none() && !std::thread::panicking() {
            let _ = self.write_header(StatusCode::OK);
        }
    }
}
