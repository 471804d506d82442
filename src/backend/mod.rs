//! Backend Connection Module
//!
//! Everything that touches a backend socket lives here: the buffered
//! stream primitives and the handler that runs one request/response
//! exchange at a time over a pooled persistent connection.
//!
//! ## Modules
//!
//! - `buffer`: asymmetric read/write buffering over an async stream
//! - `handler`: the per-connection exchange state machine
//!
//! ## Example
//!
//! ```ignore
//! use mcrelay::pool::{BackendConfig, Dialer};
//! use mcrelay::protocol::{McRequest, Request};
//! use mcrelay::stats::NoopStats;
//! use std::sync::Arc;
//!
//! let dialer = Dialer::new(BackendConfig::new("main", "127.0.0.1:11211"), Arc::new(NoopStats));
//! let mut handler = dialer.dial().await?;
//! let resp = handler.handle(&Request::memcache(McRequest::get("k")?)).await?;
//! ```

pub mod buffer;
pub mod handler;

// Re-export commonly used types
pub use buffer::{BufferedStream, READ_BUFFER_SIZE, WRITE_BUFFER_SIZE};
pub use handler::{Handler, HandlerError};
