//! Async TCP connection to a Redis server.
//!
//! Wraps a `tokio::net::TcpStream` with a read buffer and the RESP parser
//! for strict request/response I/O: one command out, one reply in.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::resp::parser::parse;
use crate::resp::types::RespValue;
use crate::resp::writer::encode_command;

/// Default initial read buffer capacity (16 KB).
const DEFAULT_BUF_CAPACITY: usize = 16 * 1024;

/// Default maximum read buffer size (512 MB).
pub const DEFAULT_MAX_BUF_SIZE: usize = 512 * 1024 * 1024;

/// A single async connection to a Redis server.
pub struct RedisConnection {
    stream: TcpStream,
    /// Data read from the socket but not yet consumed by the parser.
    buf: BytesMut,
    max_buf_size: usize,
    /// `None` waits forever for a reply.
    read_timeout: Option<Duration>,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("peer", &self.stream.peer_addr().ok())
            .field("buffered", &self.buf.len())
            .finish()
    }
}

impl RedisConnection {
    /// Connect to `addr` (e.g. "127.0.0.1:6379") with default limits.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            max_buf_size: DEFAULT_MAX_BUF_SIZE,
            read_timeout: None,
        })
    }

    /// Connect using the address, timeouts and buffer limit from `config`.
    ///
    /// Only opens the socket; [`init`](Self::init) performs the handshake.
    pub async fn open(config: &ConnectionConfig) -> Result<Self> {
        let addr = config.addr();
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut conn = match tokio::time::timeout(timeout, Self::connect(&addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "connection to {addr} timed out after {timeout:?}"
                )))
            }
        };
        conn.max_buf_size = config.max_buffer_size;
        conn.set_read_timeout(config.read_timeout_ms);
        Ok(conn)
    }

    /// Set the per-reply timeout in milliseconds (0 disables it).
    pub fn set_read_timeout(&mut self, millis: u64) {
        self.read_timeout = (millis > 0).then(|| Duration::from_millis(millis));
    }

    /// Send raw bytes to the server.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Read one complete reply, honouring the read timeout.
    pub async fn read_response(&mut self) -> Result<RespValue> {
        match self.read_timeout {
            None => self.read_frame().await,
            Some(limit) => match tokio::time::timeout(limit, self.read_frame()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!("no reply within {limit:?}"))),
            },
        }
    }

    async fn read_frame(&mut self) -> Result<RespValue> {
        loop {
            if !self.buf.is_empty() {
                let snapshot = self.buf.split().freeze();
                match parse(&snapshot) {
                    Ok((value, consumed)) => {
                        if consumed < snapshot.len() {
                            self.buf.extend_from_slice(&snapshot[consumed..]);
                        }
                        return Ok(value);
                    }
                    Err(Error::Incomplete) => self.buf.extend_from_slice(&snapshot),
                    Err(e) => return Err(e),
                }
            }

            if self.buf.capacity() - self.buf.len() < 4096 {
                let wanted = (self.buf.capacity() * 2).max(DEFAULT_BUF_CAPACITY);
                if self.buf.capacity() >= self.max_buf_size {
                    return Err(Error::Protocol(format!(
                        "reply too large: buffer would exceed {} bytes",
                        self.max_buf_size
                    )));
                }
                let target = wanted.min(self.max_buf_size);
                self.buf.reserve(target.saturating_sub(self.buf.len()));
            }
            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    /// Send a command and read the reply. Server error replies come back as
    /// `Ok(RespValue::Error)`; the caller decides what they mean.
    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue> {
        let cmd = encode_command(args);
        self.send_raw(&cmd).await?;
        self.read_response().await
    }

    /// Perform the AUTH handshake.
    pub async fn auth(&mut self, username: Option<&str>, password: &str) -> Result<()> {
        let response = match username {
            Some(user) => self.execute(&["AUTH", user, password]).await?,
            None => self.execute(&["AUTH", password]).await?,
        };
        match response {
            ref ok if ok.is_ok() => Ok(()),
            RespValue::Error(msg) => Err(Error::Auth(msg)),
            other => Err(Error::unexpected("AUTH", other.type_name())),
        }
    }

    /// Select a database index.
    pub async fn select_db(&mut self, db: u16) -> Result<()> {
        let db_str = db.to_string();
        match self.execute(&["SELECT", db_str.as_str()]).await? {
            ref ok if ok.is_ok() => Ok(()),
            RespValue::Error(msg) => Err(Error::redis(msg)),
            other => Err(Error::unexpected("SELECT", other.type_name())),
        }
    }

    /// Send PING; true when the server answers PONG (any letter case).
    pub async fn ping(&mut self) -> Result<bool> {
        match self.execute(&["PING"]).await? {
            RespValue::Error(msg) => Err(Error::redis(msg)),
            reply => Ok(reply
                .as_str()
                .is_some_and(|s| s.eq_ignore_ascii_case("PONG"))),
        }
    }

    /// Authenticate (when a password is configured) and select `db`.
    ///
    /// Database 0 is the server default, so no SELECT is sent for it.
    pub async fn init(
        &mut self,
        username: Option<&str>,
        password: Option<&str>,
        db: u16,
    ) -> Result<()> {
        if let Some(pass) = password {
            self.auth(username, pass).await?;
        }
        if db != 0 {
            self.select_db(db).await.map_err(|e| match e {
                Error::Redis { kind, message } if kind.is_auth() => Error::Auth(message),
                other => other,
            })?;
        }
        debug!(db, "redis handshake complete");
        Ok(())
    }

    /// Close the write half of the socket. The stream is dropped with `self`.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
