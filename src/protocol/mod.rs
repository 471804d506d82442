//! Memcached ASCII Protocol Implementation
//!
//! This module provides the typed request/response model and the wire codec
//! for the memcached ASCII protocol as spoken to backend nodes.
//!
//! ## Modules
//!
//! - `types`: request/response payloads, envelopes, and builders
//! - `codec`: request serialization and `VALUE` header framing
//!
//! ## Example
//!
//! ```ignore
//! use mcrelay::protocol::{codec, McRequest};
//! use bytes::BytesMut;
//!
//! let req = McRequest::get("user:42")?;
//! let mut buf = BytesMut::new();
//! codec::encode_request(&req, &mut buf);
//! assert_eq!(&buf[..], b"get user:42\r\n");
//! ```

pub mod codec;
pub mod types;

// Re-export commonly used types for convenience
pub use codec::{encode_request, value_body_len, ProtocolError};
pub use types::{CacheType, McRequest, McResponse, Request, RequestType, Response, CRLF, END_LINE};
