//! Connection Pool Contract
//!
//! The pool itself lives above this crate: it owns N connections per
//! backend address, serializes access to each, and discards members that
//! report errors. This module defines the two things such a pool needs from
//! us: the [`Conn`] capability its members expose, and the [`Dialer`]
//! factory it calls to mint a new member when one is missing or was
//! discarded.
//!
//! ## Lease discipline
//!
//! A pool lends a member to one caller at a time. Any `Err` from
//! [`Conn::handle`] poisons the member: the wire may hold a half-read
//! response, so the pool must `close` and drop it rather than return it to
//! the idle set. The member never closes itself.

use crate::backend::{Handler, HandlerError};
use crate::protocol::{Request, Response};
use crate::stats::StatsSink;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

/// The capability a pooled backend connection exposes.
#[async_trait]
pub trait Conn: Send {
    /// Executes one request/response exchange.
    async fn handle(&mut self, req: &Request) -> Result<Response, HandlerError>;

    /// Closes the underlying socket. Idempotent.
    async fn close(&mut self) -> io::Result<()>;

    /// Returns true once the connection has been closed.
    fn closed(&self) -> bool;
}

#[async_trait]
impl Conn for Handler {
    async fn handle(&mut self, req: &Request) -> Result<Response, HandlerError> {
        Handler::handle(self, req).await
    }

    async fn close(&mut self) -> io::Result<()> {
        Handler::close(self).await
    }

    fn closed(&self) -> bool {
        Handler::closed(self)
    }
}

/// Per-backend dial configuration.
///
/// A zero timeout means "no deadline" for that stage.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Identity string for the backend group; used only for stats tagging
    pub cluster: String,
    /// Backend address as `host:port`
    pub addr: String,
    /// Bound on the TCP connect
    pub dial_timeout: Duration,
    /// Bound on each response read
    pub read_timeout: Duration,
    /// Bound on flushing a request
    pub write_timeout: Duration,
}

impl BackendConfig {
    /// Creates a config with no deadlines.
    pub fn new(cluster: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            addr: addr.into(),
            dial_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
        }
    }

    /// Sets all three deadlines.
    pub fn with_timeouts(mut self, dial: Duration, read: Duration, write: Duration) -> Self {
        self.dial_timeout = dial;
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }
}

/// Factory for pool members bound to one backend.
///
/// Cloneable so a pool can keep one dialer per address and call it whenever
/// it needs a fresh connection.
#[derive(Clone)]
pub struct Dialer {
    config: BackendConfig,
    stats: Arc<dyn StatsSink>,
}

impl Dialer {
    pub fn new(config: BackendConfig, stats: Arc<dyn StatsSink>) -> Self {
        Self { config, stats }
    }

    /// The config this dialer connects with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Opens a TCP connection to the backend under the dial timeout and
    /// wraps it in an open [`Handler`].
    ///
    /// Connect failures are returned raw so the pool can apply its own
    /// backoff policy.
    pub async fn dial(&self) -> io::Result<Handler> {
        let connect = TcpStream::connect(&self.config.addr);
        let stream = if self.config.dial_timeout.is_zero() {
            connect.await?
        } else {
            match time::timeout(self.config.dial_timeout, connect).await {
                Ok(res) => res?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connect deadline exceeded",
                    ))
                }
            }
        };
        debug!(
            cluster = %self.config.cluster,
            addr = %self.config.addr,
            "Dialed backend"
        );
        Ok(Handler::new(
            self.config.cluster.clone(),
            self.config.addr.clone(),
            stream,
            self.config.read_timeout,
            self.config.write_timeout,
            Arc::clone(&self.stats),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::McRequest;
    use crate::stats::NoopStats;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_returns_open_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = Dialer::new(
            BackendConfig::new("c", addr.to_string()),
            Arc::new(NoopStats),
        );
        let handler = dialer.dial().await.unwrap();

        assert!(!handler.closed());
        assert_eq!(handler.cluster(), "c");
        assert_eq!(handler.addr(), addr.to_string());
    }

    #[tokio::test]
    async fn test_dial_connection_refused() {
        // bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = Dialer::new(
            BackendConfig::new("c", addr.to_string()),
            Arc::new(NoopStats),
        );
        assert!(dialer.dial().await.is_err());
    }

    #[tokio::test]
    async fn test_dial_timeout() {
        // TEST-NET-1 address: connect attempts hang or fail, never succeed
        let config = BackendConfig::new("c", "192.0.2.1:11211").with_timeouts(
            Duration::from_millis(50),
            Duration::ZERO,
            Duration::ZERO,
        );
        let dialer = Dialer::new(config, Arc::new(NoopStats));
        assert!(dialer.dial().await.is_err());
    }

    #[tokio::test]
    async fn test_exchange_through_conn_object() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"END\r\n").await.unwrap();
        });

        let dialer = Dialer::new(
            BackendConfig::new("c", addr.to_string()).with_timeouts(
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ),
            Arc::new(NoopStats),
        );

        let mut conn: Box<dyn Conn> = Box::new(dialer.dial().await.unwrap());
        let req = Request::memcache(McRequest::get("k").unwrap());
        let resp = conn.handle(&req).await.unwrap();
        assert_eq!(resp.as_memcache().unwrap().data().as_ref(), b"END\r\n");

        conn.close().await.unwrap();
        assert!(conn.closed());
        assert!(matches!(
            conn.handle(&req).await.unwrap_err(),
            HandlerError::Closed
        ));
    }
}
