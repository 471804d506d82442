//! # mcrelay - Backend Protocol Plumbing for a Memcached Proxy
//!
//! mcrelay implements the backend side of a high-throughput memcached
//! proxy: the protocol handler that owns one pooled TCP connection to a
//! backend node, speaks the memcached ASCII protocol over it, and hands
//! back fully assembled responses.
//!
//! The dispatching proxy, the frontend parser, and the consistent-hash
//! ring live above this crate; they interact with it only through the
//! [`pool::Conn`] contract and the [`pool::Dialer`] factory.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         proxy (external)                         │
//! │   frontend parser ──> hash ring ──> connection pool              │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ lease one Conn, one request at a time
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            mcrelay                               │
//! │                                                                  │
//! │  ┌───────────┐   ┌──────────────┐   ┌──────────────────────┐     │
//! │  │ protocol  │──>│   backend    │──>│    BufferedStream    │──> TCP
//! │  │ (codec)   │   │  (Handler)   │   │  8K write / 128K read│     │
//! │  └───────────┘   └──────┬───────┘   └──────────────────────┘     │
//! │                         │                                        │
//! │                         ▼                                        │
//! │                  ┌────────────┐                                  │
//! │                  │   stats    │  hit/miss per (cluster, addr)    │
//! │                  └────────────┘                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use mcrelay::pool::{BackendConfig, Dialer};
//! use mcrelay::protocol::{McRequest, Request};
//! use mcrelay::stats::CacheStats;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let stats = Arc::new(CacheStats::new());
//! let config = BackendConfig::new("main", "127.0.0.1:11211").with_timeouts(
//!     Duration::from_millis(200),
//!     Duration::from_millis(500),
//!     Duration::from_millis(500),
//! );
//! let dialer = Dialer::new(config, stats);
//!
//! let mut handler = dialer.dial().await?;
//! let req = Request::memcache(McRequest::set("greeting", 0, 0, b"hello")?);
//! let resp = handler.handle(&req).await?;
//! assert_eq!(resp.as_memcache().unwrap().data().as_ref(), b"STORED\r\n");
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: typed requests/responses and the ASCII wire codec
//! - [`backend`]: buffered stream I/O and the per-connection handler
//! - [`pool`]: the `Conn` contract and the `Dialer` factory a pool uses
//! - [`stats`]: hit/miss accounting per (cluster, address)
//!
//! ## Design Highlights
//!
//! ### One exchange at a time
//!
//! A handler is strictly request/response: serialize, flush, read, return.
//! Pipelining across a single connection is the pool's job (it holds many
//! handlers); wire order inside one handler is never ambiguous.
//!
//! ### Framing by declared length
//!
//! Value payloads are read by the length their `VALUE` header declares, so
//! binary values containing CRLF cost nothing extra and are never scanned.
//!
//! ### Errors decide reuse
//!
//! Every error from an exchange is surfaced to the pool, tagged with the
//! exchange stage. The pool closes and discards the handler; the handler
//! itself never retries and never closes behind the pool's back.

pub mod backend;
pub mod pool;
pub mod protocol;
pub mod stats;

// Re-export commonly used types for convenience
pub use backend::{Handler, HandlerError};
pub use pool::{BackendConfig, Conn, Dialer};
pub use protocol::{McRequest, McResponse, ProtocolError, Request, RequestType, Response};
pub use stats::{CacheStats, NoopStats, StatsSink};

/// The default memcached port
pub const DEFAULT_BACKEND_PORT: u16 = 11211;

/// Version of mcrelay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
