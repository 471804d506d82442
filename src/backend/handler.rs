//! Backend Handler Module
//!
//! This module owns the proxy's side of one persistent connection to a
//! backend memcached node. A pool keeps N handlers per backend address and
//! lends them out one caller at a time; each lease performs exactly one
//! request/response exchange.
//!
//! ## Exchange Lifecycle
//!
//! ```text
//! 1. Pool lends the handler to a caller
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │     handle(request)          │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Serialize into write buf│ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Flush (write deadline)  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read first line         │ │
//!    │  │ (read deadline)         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ VALUE? assemble chunks  │ │
//!    │  │ until END               │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │        typed response        │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. Ok  → pool reuses the handler
//!    Err → pool closes and discards it
//! ```
//!
//! ## Response Assembly
//!
//! Retrieval hits arrive as one or more `VALUE` headers, each followed by a
//! declared-length body, closed by `END\r\n`. The handler collects each
//! header and body as a cheap `Bytes` chunk, then concatenates them once
//! into a buffer sized from the accumulated total, appending the `END\r\n`
//! sentinel itself. Growing a single buffer incrementally would re-copy on
//! every resize; the chunk list copies each byte exactly once.
//!
//! ## Poisoning
//!
//! The handler never retries and never closes itself on failure. Any error
//! from [`Handler::handle`] leaves the connection in an unknown wire state,
//! so the pool must close and discard the handler instead of returning it
//! to the idle set.

use crate::backend::buffer::BufferedStream;
use crate::protocol::{codec, McResponse, ProtocolError, Request, Response, END_LINE};
use crate::stats::StatsSink;
use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;
use tracing::{trace, warn};

/// Errors raised by a handler exchange.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// `handle` was called after `close`
    #[error("handler is closed")]
    Closed,

    /// The request payload is not a memcached request
    #[error("request is not a memcached request")]
    AssertRequest,

    /// The backend sent a response line the codec rejects
    #[error("bad response: {0}")]
    BadResponse(#[from] ProtocolError),

    /// A socket read, write, flush, or deadline failure, tagged with the
    /// exchange stage it happened in
    #[error("{ctx}: {source}")]
    Io {
        ctx: &'static str,
        #[source]
        source: io::Error,
    },
}

impl HandlerError {
    fn io(ctx: &'static str) -> impl FnOnce(io::Error) -> HandlerError {
        move |source| HandlerError::Io { ctx, source }
    }

    /// Returns true if the error came from the socket (including deadline
    /// expiry) rather than from protocol framing.
    pub fn is_io(&self) -> bool {
        matches!(self, HandlerError::Io { .. })
    }
}

/// One pooled connection to a backend memcached node.
///
/// A handler executes one exchange at a time; exclusive access is enforced
/// by `&mut self` and, across tasks, by the owning pool. After `close` the
/// handler is inert and must be discarded.
pub struct Handler {
    cluster: String,
    addr: String,
    stream: BufferedStream<TcpStream>,
    /// Header and body chunks collected while assembling a `VALUE` response
    chunks: Vec<Bytes>,
    read_timeout: Duration,
    write_timeout: Duration,
    stats: Arc<dyn StatsSink>,
    closed: AtomicBool,
}

impl Handler {
    pub(crate) fn new(
        cluster: String,
        addr: String,
        stream: TcpStream,
        read_timeout: Duration,
        write_timeout: Duration,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            cluster,
            addr,
            stream: BufferedStream::new(stream),
            chunks: Vec::with_capacity(2),
            read_timeout,
            write_timeout,
            stats,
            closed: AtomicBool::new(false),
        }
    }

    /// The backend address this handler is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The cluster identity used for stats tagging.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Executes one request/response exchange.
    ///
    /// On success the returned response carries the full self-framed wire
    /// bytes and the handler is reusable. On any error the connection state
    /// is unknown and the handler must be closed and discarded.
    pub async fn handle(&mut self, req: &Request) -> Result<Response, HandlerError> {
        if self.closed() {
            return Err(HandlerError::Closed);
        }
        let mcr = req.as_memcache().ok_or(HandlerError::AssertRequest)?;
        trace!(
            cluster = %self.cluster,
            addr = %self.addr,
            rtype = %mcr.rtype(),
            "Forwarding request"
        );

        self.stream.write_buf().clear();
        codec::encode_request(mcr, self.stream.write_buf());
        timed(self.write_timeout, self.stream.flush())
            .await
            .map_err(HandlerError::io("flush request"))?;

        let line = timed(self.read_timeout, self.stream.read_line())
            .await
            .map_err(HandlerError::io("read response bytes"))?;

        let data = if mcr.rtype().is_retrieval() {
            if codec::is_end_line(&line) {
                self.stats.miss(&self.cluster, &self.addr);
                line
            } else {
                self.stats.hit(&self.cluster, &self.addr);
                self.read_value_chunks(line).await?
            }
        } else {
            line
        };

        trace!(
            cluster = %self.cluster,
            addr = %self.addr,
            bytes = data.len(),
            "Assembled response"
        );
        Ok(Response::memcache(McResponse::new(mcr.rtype(), data)))
    }

    /// Reads the body declared by a `VALUE` header, then keeps collecting
    /// lines until the `END\r\n` sentinel, concatenating everything into a
    /// single self-framed buffer.
    async fn read_value_chunks(&mut self, header: Bytes) -> Result<Bytes, HandlerError> {
        let len = match codec::value_body_len(&header) {
            Ok(len) => len,
            Err(e) => {
                warn!(
                    cluster = %self.cluster,
                    addr = %self.addr,
                    error = %e,
                    "Malformed VALUE header"
                );
                return Err(e.into());
            }
        };

        // body plus its trailing \r\n
        let body = timed(self.read_timeout, self.stream.read_exact(len + 2))
            .await
            .map_err(HandlerError::io("read response bytes"))?;

        self.chunks.clear();
        self.chunks.push(header);
        self.chunks.push(body);

        // Additional VALUE headers and bodies for multi-key retrievals land
        // here line by line; the sentinel itself is never appended.
        loop {
            let line = timed(self.read_timeout, self.stream.read_line())
                .await
                .map_err(HandlerError::io("reread response bytes"))?;
            if codec::is_end_line(&line) {
                break;
            }
            self.chunks.push(line);
        }

        let total: usize = self.chunks.iter().map(|c| c.len()).sum();
        let mut out = BytesMut::with_capacity(total + END_LINE.len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out.extend_from_slice(END_LINE);
        // release the refs pinning regions of the read buffer
        self.chunks.clear();
        Ok(out.freeze())
    }

    /// Closes the underlying socket.
    ///
    /// Idempotent: the first call performs the shutdown and returns its
    /// result, later calls return `Ok(())`.
    pub async fn close(&mut self) -> io::Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            trace!(cluster = %self.cluster, addr = %self.addr, "Closing backend connection");
            self.stream.shutdown().await
        } else {
            Ok(())
        }
    }

    /// Returns true once `close` has been called.
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Runs `fut` under `limit`, mapping expiry to a `TimedOut` I/O error.
///
/// A zero limit means no deadline.
async fn timed<T, F>(limit: Duration, fut: F) -> io::Result<T>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    if limit.is_zero() {
        return fut.await;
    }
    match time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{McRequest, RequestType};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Records every hit/miss call for exact-count assertions.
    #[derive(Default)]
    struct RecordingStats {
        hits: Mutex<Vec<(String, String)>>,
        misses: Mutex<Vec<(String, String)>>,
    }

    impl RecordingStats {
        fn hit_count(&self) -> usize {
            self.hits.lock().unwrap().len()
        }

        fn miss_count(&self) -> usize {
            self.misses.lock().unwrap().len()
        }
    }

    impl StatsSink for RecordingStats {
        fn hit(&self, cluster: &str, addr: &str) {
            self.hits
                .lock()
                .unwrap()
                .push((cluster.to_string(), addr.to_string()));
        }

        fn miss(&self, cluster: &str, addr: &str) {
            self.misses
                .lock()
                .unwrap()
                .push((cluster.to_string(), addr.to_string()));
        }
    }

    /// A scripted backend: accepts one connection, then for each scripted
    /// reply reads one request and writes the reply. Returns the request
    /// bytes it saw.
    async fn fake_backend(replies: Vec<&'static [u8]>) -> (SocketAddr, JoinHandle<Vec<Vec<u8>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            for reply in replies {
                let mut buf = vec![0u8; 1024];
                let n = sock.read(&mut buf).await.unwrap();
                buf.truncate(n);
                seen.push(buf);
                sock.write_all(reply).await.unwrap();
            }
            seen
        });

        (addr, task)
    }

    async fn connect(addr: SocketAddr, stats: Arc<RecordingStats>) -> Handler {
        let stream = TcpStream::connect(addr).await.unwrap();
        Handler::new(
            "test-cluster".to_string(),
            addr.to_string(),
            stream,
            Duration::from_secs(1),
            Duration::from_secs(1),
            stats,
        )
    }

    fn mc_data(resp: &Response) -> &[u8] {
        resp.as_memcache().unwrap().data()
    }

    #[tokio::test]
    async fn test_retrieval_miss() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, backend) = fake_backend(vec![b"END\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::get("absent").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        assert_eq!(mc_data(&resp), b"END\r\n");
        assert_eq!(stats.miss_count(), 1);
        assert_eq!(stats.hit_count(), 0);

        let seen = backend.await.unwrap();
        assert_eq!(seen[0], b"get absent\r\n");
    }

    #[tokio::test]
    async fn test_retrieval_single_hit() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) = fake_backend(vec![b"VALUE k 0 3\r\nabc\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::get("k").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        assert_eq!(mc_data(&resp), b"VALUE k 0 3\r\nabc\r\nEND\r\n");
        assert_eq!(stats.hit_count(), 1);
        assert_eq!(stats.miss_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_length_value() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) = fake_backend(vec![b"VALUE k 0 0\r\n\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::get("k").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        assert_eq!(mc_data(&resp), b"VALUE k 0 0\r\n\r\nEND\r\n");
    }

    #[tokio::test]
    async fn test_multi_value_gets() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) =
            fake_backend(vec![b"VALUE k 0 1 7\r\nA\r\nVALUE k 0 1 8\r\nB\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::gets("k").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        assert_eq!(
            mc_data(&resp),
            b"VALUE k 0 1 7\r\nA\r\nVALUE k 0 1 8\r\nB\r\nEND\r\n"
        );
        assert_eq!(stats.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_value_containing_crlf() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) = fake_backend(vec![b"VALUE k 0 4\r\na\r\nb\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::get("k").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        // the declared length carries the reader across the embedded CRLF
        assert_eq!(mc_data(&resp), b"VALUE k 0 4\r\na\r\nb\r\nEND\r\n");
    }

    #[tokio::test]
    async fn test_store() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, backend) = fake_backend(vec![b"STORED\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::set("k", 0, 0, b"xyz").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        assert_eq!(mc_data(&resp), b"STORED\r\n");
        assert_eq!(stats.hit_count(), 0);
        assert_eq!(stats.miss_count(), 0);

        let seen = backend.await.unwrap();
        assert_eq!(seen[0], b"set k 0 0 3\r\nxyz\r\n");
    }

    #[tokio::test]
    async fn test_gat_wire_format() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, backend) = fake_backend(vec![b"END\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::gat("k", 30).unwrap());
        handler.handle(&req).await.unwrap();

        let seen = backend.await.unwrap();
        assert_eq!(seen[0], b"gat 30 k\r\n");
    }

    #[tokio::test]
    async fn test_error_reply_passed_through() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) = fake_backend(vec![b"SERVER_ERROR out of memory\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::set("k", 0, 0, b"v").unwrap());
        let resp = handler.handle(&req).await.unwrap();

        // error lines are data, not handler errors; the caller inspects them
        assert_eq!(mc_data(&resp), b"SERVER_ERROR out of memory\r\n");
    }

    #[tokio::test]
    async fn test_incr_numeric_reply() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, backend) = fake_backend(vec![b"5\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::incr("counter", 5).unwrap());
        let resp = handler.handle(&req).await.unwrap();

        assert_eq!(mc_data(&resp), b"5\r\n");
        let seen = backend.await.unwrap();
        assert_eq!(seen[0], b"incr counter 5\r\n");
    }

    #[tokio::test]
    async fn test_malformed_value_header() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) = fake_backend(vec![b"VALUE k 0\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::get("k").unwrap());
        let err = handler.handle(&req).await.unwrap_err();

        assert!(matches!(
            err,
            HandlerError::BadResponse(ProtocolError::TruncatedHeader)
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let stats = Arc::new(RecordingStats::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // accept and read the request but never reply
        let silent = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut handler = Handler::new(
            "test-cluster".to_string(),
            addr.to_string(),
            stream,
            Duration::from_millis(50),
            Duration::from_secs(1),
            stats,
        );

        let req = Request::memcache(McRequest::get("k").unwrap());
        let err = handler.handle(&req).await.unwrap_err();

        match err {
            HandlerError::Io { ctx, source } => {
                assert_eq!(ctx, "read response bytes");
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("expected Io error, got {:?}", other),
        }
        silent.abort();
    }

    #[tokio::test]
    async fn test_handler_reusable_across_exchanges() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, backend) = fake_backend(vec![b"STORED\r\n", b"VALUE k 0 1\r\nv\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let set = Request::memcache(McRequest::set("k", 0, 0, b"v").unwrap());
        let resp = handler.handle(&set).await.unwrap();
        assert_eq!(mc_data(&resp), b"STORED\r\n");

        let get = Request::memcache(McRequest::get("k").unwrap());
        let resp = handler.handle(&get).await.unwrap();
        assert_eq!(mc_data(&resp), b"VALUE k 0 1\r\nv\r\nEND\r\n");
        assert_eq!(stats.hit_count(), 1);

        let seen = backend.await.unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_handler_rejects_requests() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) = fake_backend(vec![]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        assert!(!handler.closed());
        handler.close().await.unwrap();
        assert!(handler.closed());

        let req = Request::memcache(McRequest::get("k").unwrap());
        let err = handler.handle(&req).await.unwrap_err();
        assert!(matches!(err, HandlerError::Closed));

        // second close is a no-op
        handler.close().await.unwrap();
        assert!(handler.closed());
    }

    #[tokio::test]
    async fn test_retrieval_hit_is_self_framed() {
        let stats = Arc::new(RecordingStats::default());
        let (addr, _backend) =
            fake_backend(vec![b"VALUE key 7 11\r\nhello world\r\nEND\r\n"]).await;
        let mut handler = connect(addr, Arc::clone(&stats)).await;

        let req = Request::memcache(McRequest::get("key").unwrap());
        let resp = handler.handle(&req).await.unwrap();
        let mc = resp.as_memcache().unwrap();

        assert_eq!(mc.rtype(), RequestType::Get);
        assert!(mc.data().starts_with(b"VALUE "));
        assert!(mc.data().ends_with(b"END\r\n"));
        assert!(!mc.is_miss());
    }
}
