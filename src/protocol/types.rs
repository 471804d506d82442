//! Memcached ASCII Protocol Data Types
//!
//! This module defines the request and response model for the memcached
//! ASCII protocol as spoken to backend nodes.
//!
//! ## Protocol Format
//!
//! Every command is a single text line (storage commands carry a data block
//! after the line), terminated with CRLF (`\r\n`):
//!
//! Retrieval: `get <key>\r\n`
//! Storage: `set <key> <flags> <exptime> <bytes>\r\n<data>\r\n`
//! Touch-and-get: `gat <exptime> <key>\r\n`
//! Arithmetic: `incr <key> <delta>\r\n`
//!
//! Retrieval replies are framed as `VALUE <key> <flags> <bytes>[ <cas>]\r\n`
//! followed by the data block, repeated per hit key, closed by `END\r\n`.
//! All other replies are a single line (`STORED\r\n`, `DELETED\r\n`, …).
//!
//! ## Request model
//!
//! A request keeps the key and the command-specific trailing bytes (`data`)
//! as separate `Bytes` so serialization can write them through without
//! copying. The shape of `data` depends on the command:
//!
//! - `get`/`gets`: the terminating `\r\n` only
//! - `gat`/`gats`: the exptime digits only (serialization inserts the
//!   separators and the key)
//! - storage commands: ` <flags> <exptime> <bytes>[ <cas>]\r\n<value>\r\n`
//! - `delete`/`incr`/`decr`/`touch`: the trailing arguments and `\r\n`
//!
//! The builders below produce exactly these shapes, so most callers never
//! assemble `data` by hand.

use crate::protocol::codec::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used throughout the memcached ASCII protocol
pub const CRLF: &[u8] = b"\r\n";

/// The sentinel line closing every retrieval response
pub const END_LINE: &[u8] = b"END\r\n";

/// Maximum key length accepted by memcached
pub const MAX_KEY_LEN: usize = 250;

/// The cache protocol a request or response envelope belongs to.
///
/// The proxy is built to front more than one cache protocol; each envelope
/// carries this tag so a handler can reject payloads it does not speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheType {
    /// Memcached ASCII protocol
    Memcache,
}

/// Recognized memcached command kinds.
///
/// The keyword written on the wire is case-sensitive and always lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Get,
    Gets,
    Gat,
    Gats,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
    Delete,
    Incr,
    Decr,
    Touch,
}

impl RequestType {
    /// Returns the canonical ASCII keyword for this command.
    pub fn keyword(&self) -> &'static str {
        match self {
            RequestType::Get => "get",
            RequestType::Gets => "gets",
            RequestType::Gat => "gat",
            RequestType::Gats => "gats",
            RequestType::Set => "set",
            RequestType::Add => "add",
            RequestType::Replace => "replace",
            RequestType::Append => "append",
            RequestType::Prepend => "prepend",
            RequestType::Cas => "cas",
            RequestType::Delete => "delete",
            RequestType::Incr => "incr",
            RequestType::Decr => "decr",
            RequestType::Touch => "touch",
        }
    }

    /// Looks up a command kind from its wire keyword.
    pub fn from_keyword(kw: &str) -> Option<RequestType> {
        let t = match kw {
            "get" => RequestType::Get,
            "gets" => RequestType::Gets,
            "gat" => RequestType::Gat,
            "gats" => RequestType::Gats,
            "set" => RequestType::Set,
            "add" => RequestType::Add,
            "replace" => RequestType::Replace,
            "append" => RequestType::Append,
            "prepend" => RequestType::Prepend,
            "cas" => RequestType::Cas,
            "delete" => RequestType::Delete,
            "incr" => RequestType::Incr,
            "decr" => RequestType::Decr,
            "touch" => RequestType::Touch,
            _ => return None,
        };
        Some(t)
    }

    /// Returns true for the commands whose reply uses `VALUE … END` framing.
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self,
            RequestType::Get | RequestType::Gets | RequestType::Gat | RequestType::Gats
        )
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A single memcached request: command kind, key, and trailing bytes.
///
/// `data` must match the per-command shape documented at module level. For
/// retrieval commands other than `gat`/`gats` it already contains the
/// trailing `\r\n` after the key; the builders guarantee this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McRequest {
    rtype: RequestType,
    key: Bytes,
    data: Bytes,
}

impl McRequest {
    /// Creates a request from pre-assembled parts, validating the key.
    ///
    /// `data` is taken verbatim; callers are responsible for its shape.
    pub fn new(
        rtype: RequestType,
        key: impl Into<Bytes>,
        data: impl Into<Bytes>,
    ) -> Result<Self, ProtocolError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            rtype,
            key,
            data: data.into(),
        })
    }

    /// Builds a `get` request.
    pub fn get(key: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Get, key, Bytes::from_static(CRLF))
    }

    /// Builds a `gets` request (returns cas tokens).
    pub fn gets(key: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Gets, key, Bytes::from_static(CRLF))
    }

    /// Builds a `gat` request (get-and-touch).
    pub fn gat(key: impl Into<Bytes>, exptime: i64) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Gat, key, exptime.to_string())
    }

    /// Builds a `gats` request (get-and-touch, with cas tokens).
    pub fn gats(key: impl Into<Bytes>, exptime: i64) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Gats, key, exptime.to_string())
    }

    /// Builds a `set` request.
    pub fn set(
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        Self::storage(RequestType::Set, key, flags, exptime, None, value)
    }

    /// Builds an `add` request (store only if absent).
    pub fn add(
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        Self::storage(RequestType::Add, key, flags, exptime, None, value)
    }

    /// Builds a `replace` request (store only if present).
    pub fn replace(
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        Self::storage(RequestType::Replace, key, flags, exptime, None, value)
    }

    /// Builds an `append` request.
    pub fn append(
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        Self::storage(RequestType::Append, key, flags, exptime, None, value)
    }

    /// Builds a `prepend` request.
    pub fn prepend(
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        Self::storage(RequestType::Prepend, key, flags, exptime, None, value)
    }

    /// Builds a `cas` request (compare-and-swap store).
    pub fn cas(
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        cas_id: u64,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        Self::storage(RequestType::Cas, key, flags, exptime, Some(cas_id), value)
    }

    /// Builds a `delete` request.
    pub fn delete(key: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Delete, key, Bytes::from_static(CRLF))
    }

    /// Builds an `incr` request.
    pub fn incr(key: impl Into<Bytes>, delta: u64) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Incr, key, format!(" {}\r\n", delta))
    }

    /// Builds a `decr` request.
    pub fn decr(key: impl Into<Bytes>, delta: u64) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Decr, key, format!(" {}\r\n", delta))
    }

    /// Builds a `touch` request.
    pub fn touch(key: impl Into<Bytes>, exptime: i64) -> Result<Self, ProtocolError> {
        Self::new(RequestType::Touch, key, format!(" {}\r\n", exptime))
    }

    /// Assembles the ` <flags> <exptime> <bytes>[ <cas>]\r\n<value>\r\n`
    /// tail shared by all storage commands.
    fn storage(
        rtype: RequestType,
        key: impl Into<Bytes>,
        flags: u32,
        exptime: i64,
        cas_id: Option<u64>,
        value: &[u8],
    ) -> Result<Self, ProtocolError> {
        let mut data = BytesMut::with_capacity(32 + value.len());
        data.put_slice(format!(" {} {} {}", flags, exptime, value.len()).as_bytes());
        if let Some(id) = cas_id {
            data.put_slice(format!(" {}", id).as_bytes());
        }
        data.put_slice(CRLF);
        data.put_slice(value);
        data.put_slice(CRLF);
        Self::new(rtype, key, data.freeze())
    }

    /// The command kind.
    pub fn rtype(&self) -> RequestType {
        self.rtype
    }

    /// The key bytes.
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// The command-specific trailing bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// A single memcached response: the full wire bytes, self-framed.
///
/// `data` starts with a recognized first-line token and ends with `\r\n`
/// (for retrieval hits, with `END\r\n`). Callers inspect the bytes to
/// distinguish `STORED` from `NOT_STORED`, `ERROR` and friends; the handler
/// does not interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McResponse {
    rtype: RequestType,
    data: Bytes,
}

impl McResponse {
    /// Creates a response wrapping assembled wire bytes.
    pub fn new(rtype: RequestType, data: Bytes) -> Self {
        Self { rtype, data }
    }

    /// The command kind this response answers.
    pub fn rtype(&self) -> RequestType {
        self.rtype
    }

    /// The full response wire bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the response and returns the wire bytes.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Returns true if this is a retrieval response carrying no value.
    pub fn is_miss(&self) -> bool {
        self.rtype.is_retrieval() && self.data == END_LINE
    }
}

/// Protocol-specific request payloads, one variant per supported cache
/// protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestPayload {
    Memcache(McRequest),
}

/// Protocol-specific response payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponsePayload {
    Memcache(McResponse),
}

/// A request envelope: cache-type tag plus protocol payload.
///
/// Handlers match on the payload variant for the protocol they speak and
/// reject anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    payload: RequestPayload,
}

impl Request {
    /// Wraps a memcached request.
    pub fn memcache(req: McRequest) -> Self {
        Self {
            payload: RequestPayload::Memcache(req),
        }
    }

    /// The protocol this request belongs to.
    pub fn cache_type(&self) -> CacheType {
        match &self.payload {
            RequestPayload::Memcache(_) => CacheType::Memcache,
        }
    }

    /// The memcached payload, if this is a memcached request.
    pub fn as_memcache(&self) -> Option<&McRequest> {
        match &self.payload {
            RequestPayload::Memcache(req) => Some(req),
        }
    }
}

/// A response envelope mirroring [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: ResponsePayload,
}

impl Response {
    /// Wraps a memcached response.
    pub fn memcache(resp: McResponse) -> Self {
        Self {
            payload: ResponsePayload::Memcache(resp),
        }
    }

    /// The protocol this response belongs to.
    pub fn cache_type(&self) -> CacheType {
        match &self.payload {
            ResponsePayload::Memcache(_) => CacheType::Memcache,
        }
    }

    /// The memcached payload, if this is a memcached response.
    pub fn as_memcache(&self) -> Option<&McResponse> {
        match &self.payload {
            ResponsePayload::Memcache(resp) => Some(resp),
        }
    }

    /// Consumes the envelope and returns the memcached payload.
    pub fn into_memcache(self) -> Option<McResponse> {
        match self.payload {
            ResponsePayload::Memcache(resp) => Some(resp),
        }
    }
}

/// Checks that a key is legal on the memcached wire: non-empty, at most
/// [`MAX_KEY_LEN`] bytes, and free of spaces and control bytes.
pub fn validate_key(key: &[u8]) -> Result<(), ProtocolError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ProtocolError::InvalidKey);
    }
    if key.iter().any(|&b| b == b' ' || b < 0x20) {
        return Err(ProtocolError::InvalidKey);
    }
    Ok(())
}
