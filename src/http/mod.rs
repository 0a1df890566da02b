//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (HTTP/1.1, deadlines, dispatch by path)
//!     → handler.rs (run the matched handler on its own task)
//!     → forward.rs (build, prepare and execute the outbound request)
//!     → response.rs (commit status and headers, stream the body)
//!     → Send to client
//! ```

pub mod forward;
pub mod handler;
pub mod response;
pub mod server;
pub mod status;

pub use forward::{build_client, Forwarder, ForwardError, HttpClient};
pub use handler::{Handler, MatchedPattern, SharedHandler};
pub use response::{ResponseWriter, WriteError, WriteState};
pub use server::{Proxy, ProxyError};
pub use status::StatusHandler;
