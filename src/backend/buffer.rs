//! Buffered Stream I/O
//!
//! A thin buffering layer over an async byte stream, shaped for the
//! memcached request/response cycle: commands going out are short, values
//! coming back can be large. The write buffer is therefore small (8 KiB)
//! while the read buffer is large (128 KiB) so big responses refill in few
//! syscalls.
//!
//! ## Read primitives
//!
//! - [`BufferedStream::read_line`] — everything up to and including the next
//!   `\n`, refilling from the stream until the delimiter appears.
//! - [`BufferedStream::read_exact`] — exactly `n` bytes, refilling as
//!   needed. Used for value bodies whose length the header declared, so the
//!   payload is never scanned for delimiters.
//!
//! Both return `Bytes` split off the front of the read buffer: cheap
//! refcounted slices, no per-read copying. A returned slice stays valid for
//! as long as the caller keeps it.
//!
//! Deadlines are the caller's concern; wrap the returned futures in
//! `tokio::time::timeout` to bound a read or flush.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the write buffer. Commands are a keyword, a key, and a short
/// tail, so this rarely grows.
pub const WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// Size of the read buffer. Sized for multi-key retrieval responses.
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

/// A buffered reader/writer over an async stream.
///
/// Generic over the stream type so tests can drive it with in-memory
/// duplex pipes; the handler instantiates it with `TcpStream`.
#[derive(Debug)]
pub struct BufferedStream<S> {
    io: S,
    rbuf: BytesMut,
    wbuf: BytesMut,
    /// Prefix of `rbuf` already scanned and known to contain no `\n`.
    scanned: usize,
}

impl<S> BufferedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with fresh read and write buffers.
    pub fn new(io: S) -> Self {
        Self {
            io,
            rbuf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            wbuf: BytesMut::with_capacity(WRITE_BUFFER_SIZE),
            scanned: 0,
        }
    }

    /// The outgoing buffer. Callers append a serialized command here and
    /// then [`flush`](Self::flush) it.
    pub fn write_buf(&mut self) -> &mut BytesMut {
        &mut self.wbuf
    }

    /// Drains the write buffer to the stream.
    pub async fn flush(&mut self) -> io::Result<()> {
        if self.wbuf.is_empty() {
            return Ok(());
        }
        self.io.write_all(&self.wbuf).await?;
        self.io.flush().await?;
        self.wbuf.clear();
        Ok(())
    }

    /// Reads bytes up to and including the next `\n`.
    ///
    /// Returns `UnexpectedEof` if the stream ends before a delimiter
    /// appears.
    pub async fn read_line(&mut self) -> io::Result<Bytes> {
        loop {
            if let Some(pos) = self.rbuf[self.scanned..].iter().position(|&b| b == b'\n') {
                let line = self.rbuf.split_to(self.scanned + pos + 1).freeze();
                self.scanned = 0;
                return Ok(line);
            }
            self.scanned = self.rbuf.len();
            self.fill().await?;
        }
    }

    /// Reads exactly `n` bytes.
    ///
    /// Returns `UnexpectedEof` if the stream ends short of `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> io::Result<Bytes> {
        while self.rbuf.len() < n {
            self.fill().await?;
        }
        let bytes = self.rbuf.split_to(n).freeze();
        self.scanned = self.scanned.saturating_sub(n);
        Ok(bytes)
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }

    /// Pulls more bytes from the stream into the read buffer.
    async fn fill(&mut self) -> io::Result<()> {
        // Ensure we have some capacity
        if self.rbuf.capacity() - self.rbuf.len() < 1024 {
            self.rbuf.reserve(4096);
        }
        let n = self.io.read_buf(&mut self.rbuf).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed by peer",
            ));
        }
        Ok(())
    }
}
