//! Memcached ASCII Wire Codec
//!
//! Serialization of typed requests and framing analysis of response lines.
//! The codec is pure byte manipulation; all socket I/O lives in the backend
//! handler, which keeps this module trivially unit-testable.
//!
//! ## Request serialization
//!
//! [`encode_request`] appends a complete command to a write buffer. The key
//! and trailing bytes are written through from the request's own `Bytes`
//! without intermediate allocation.
//!
//! `gat`/`gats` are the one irregular shape: the client-facing form carries
//! the exptime *before* the key (`gat 30 mykey\r\n`), so the encoder inserts
//! the separators itself. Every other command is `<keyword> <key><data>`.
//!
//! ## Response framing
//!
//! The first line of a retrieval reply decides everything that follows. A
//! miss is the bare `END\r\n` sentinel. A hit starts with a header of the
//! form:
//!
//! ```text
//! VALUE <key> <flags> <bytes>\r\n          (get, gat)
//! VALUE <key> <flags> <bytes> <cas>\r\n    (gets, gats)
//! ```
//!
//! [`value_body_len`] extracts the declared `<bytes>` length by counting
//! spaces: exactly three spaces means the length token runs to the trailing
//! CRLF; more than three means a cas token follows and the length token runs
//! to the next space. The caller then reads `<bytes> + 2` bytes of body
//! (the payload plus its CRLF) without scanning inside the value, which
//! keeps binary-safe values cheap.

use crate::protocol::types::{McRequest, RequestType, CRLF, END_LINE};
use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Errors raised while building requests or framing responses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Key is empty, too long, or contains a space or control byte
    #[error("invalid key")]
    InvalidKey,

    /// A `VALUE` header with fewer than three spaces
    #[error("value header has too few fields")]
    TruncatedHeader,

    /// A `VALUE` header cut off before the length field is complete
    #[error("value header too short")]
    ShortHeader,

    /// The declared `<bytes>` field is not a non-negative ASCII integer
    #[error("invalid value length")]
    BadLength,
}

/// Appends the wire form of a request to `dst`.
///
/// The caller flushes `dst` to the socket afterwards; the codec never
/// touches the network.
pub fn encode_request(req: &McRequest, dst: &mut BytesMut) {
    dst.put_slice(req.rtype().keyword().as_bytes());
    dst.put_u8(b' ');
    match req.rtype() {
        RequestType::Gat | RequestType::Gats => {
            // data holds the exptime digits
            dst.put_slice(req.data());
            dst.put_u8(b' ');
            dst.put_slice(req.key());
            dst.put_slice(CRLF);
        }
        _ => {
            dst.put_slice(req.key());
            dst.put_slice(req.data());
        }
    }
}

/// Returns true if `line` is the `END\r\n` sentinel.
#[inline]
pub fn is_end_line(line: &[u8]) -> bool {
    line == END_LINE
}

/// Extracts the declared body length from a `VALUE` header line.
///
/// `line` is a full header including the trailing `\r\n`. The returned
/// length covers the payload only; the payload's own `\r\n` is not included
/// and the caller must read `len + 2` bytes.
pub fn value_body_len(line: &[u8]) -> Result<usize, ProtocolError> {
    let spaces = line.iter().filter(|&&b| b == b' ').count();
    if spaces < 3 {
        return Err(ProtocolError::TruncatedHeader);
    }

    // advance past "VALUE <key> <flags> "
    let mut i = 0;
    for _ in 0..3 {
        let next = line[i..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or(ProtocolError::TruncatedHeader)?;
        i += next + 1;
    }

    let token = if spaces == 3 {
        // get|gat shape: length token runs to the trailing CRLF
        let rest = &line[i..];
        if rest.len() < 2 {
            return Err(ProtocolError::ShortHeader);
        }
        &rest[..rest.len() - 2]
    } else {
        // gets|gats shape: a cas token follows the length
        let end = line[i..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or(ProtocolError::TruncatedHeader)?;
        &line[i..i + end]
    };

    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(ProtocolError::BadLength)
}
