//! Connection lifecycle for one browser session.
//!
//! The manager owns at most one [`RedisConnection`], modelled as an explicit
//! [`ConnectionState`]. Every network operation takes the manager by `&mut`
//! and leaves it in its successor state; transport failures drop back to
//! `Disconnected` so the next call starts a fresh handshake.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::connection::tcp::RedisConnection;
use crate::error::{Error, Result};
use crate::resp::types::RespValue;
use crate::runtime;

/// Anything that can run one Redis command and return its reply.
///
/// Implementations turn server error replies into `Err(Error::Redis)`, so
/// callers only ever see data replies in `Ok`.
pub trait Execute: Send {
    fn execute(&mut self, args: &[&str]) -> impl Future<Output = Result<RespValue>> + Send;
}

/// Whether the manager currently holds a live transport.
#[derive(Debug, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected(RedisConnection),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Flags the presentation layer watches from other threads.
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    connected: AtomicBool,
    loading: AtomicBool,
}

impl ConnectionStatus {
    /// True after a successful handshake or probe, false after any failure
    /// or release.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// True while a background probe is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }

    fn set_loading(&self, value: bool) {
        self.loading.store(value, Ordering::Release);
    }
}

/// Receives errors from background work that has no caller to return to.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, error: &Error);
}

/// Owns the session's single connection.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    status: Arc<ConnectionStatus>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// A disconnected manager; nothing touches the network until first use.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            status: Arc::new(ConnectionStatus::default()),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Shared handle to the observable status flags.
    pub fn status(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.status)
    }

    /// Return the live connection, connecting and authenticating first if
    /// there is none.
    pub async fn acquire(&mut self) -> Result<&mut RedisConnection> {
        if self.state.is_connected() {
            debug!("reusing redis connection");
        } else {
            let conn = self.connect().await?;
            self.state = ConnectionState::Connected(conn);
            self.status.set_connected(true);
        }
        match &mut self.state {
            ConnectionState::Connected(conn) => Ok(conn),
            ConnectionState::Disconnected => Err(Error::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no redis connection",
            ))),
        }
    }

    async fn connect(&mut self) -> Result<RedisConnection> {
        debug!(addr = %self.config.addr(), db = self.config.db, "opening redis connection");
        let result = async {
            self.config.validate()?;
            let mut conn = RedisConnection::open(&self.config).await?;
            conn.init(
                self.config.username.as_deref(),
                self.config.password.as_deref(),
                self.config.db,
            )
            .await?;
            Ok::<_, Error>(conn)
        }
        .await;

        match &result {
            Ok(_) => info!(addr = %self.config.addr(), "redis connection established"),
            Err(e) => {
                self.status.set_connected(false);
                error!(addr = %self.config.addr(), error = %e, "redis connection failed");
            }
        }
        result
    }

    /// Drop the transport without a goodbye; used after it became unusable.
    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.status.set_connected(false);
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.poisons_connection() {
                warn!(error = %e, "discarding redis connection");
                self.reset();
            }
        }
        result
    }

    /// Run one command; error replies become `Err(Error::Redis)`.
    pub async fn run(&mut self, args: &[&str]) -> Result<RespValue> {
        let conn = self.acquire().await?;
        let result = conn.execute(args).await;
        match self.check(result)? {
            RespValue::Error(msg) => Err(Error::redis(msg)),
            value => Ok(value),
        }
    }

    /// PING the server; true only for a PONG reply (any case).
    ///
    /// The connected flag mirrors the outcome; failures leave it false.
    pub async fn probe(&mut self) -> Result<bool> {
        let result = self.ping_once().await;
        match &result {
            Ok(pong) => {
                info!(pong = *pong, "ping redis server");
                self.status.set_connected(*pong);
            }
            Err(e) => {
                error!(error = %e, "ping redis server failed");
                self.status.set_connected(false);
            }
        }
        result
    }

    async fn ping_once(&mut self) -> Result<bool> {
        let conn = self.acquire().await?;
        let pong = conn.ping().await;
        self.check(pong)
    }

    /// Blocking wrapper around [`probe`](Self::probe) for non-async callers.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn probe_blocking(&mut self) -> Result<bool> {
        runtime::block_on(self.probe())
    }

    /// Probe in the background so the UI thread stays responsive.
    ///
    /// Takes the manager by value and hands it back alongside the result.
    /// `loading` is raised for the duration, and failures also go to the
    /// notifier.
    pub fn spawn_probe(mut self) -> JoinHandle<(Self, Result<bool>)> {
        self.status.set_loading(true);
        runtime::spawn(async move {
            let result = self.probe().await;
            if let (Err(e), Some(notifier)) = (&result, &self.notifier) {
                notifier.notify_error(e);
            }
            self.status.set_loading(false);
            debug!("background ping finished");
            (self, result)
        })
    }

    /// Switch database with SELECT on the live connection. The index also
    /// becomes the initial database for later reconnects.
    pub async fn select_db(&mut self, db: u16) -> Result<()> {
        if !self.state.is_connected() {
            let previous = std::mem::replace(&mut self.config.db, db);
            if let Err(e) = self.acquire().await {
                self.config.db = previous;
                return Err(e);
            }
            info!(db, "select redis database");
            return Ok(());
        }
        let result = match &mut self.state {
            ConnectionState::Connected(conn) => conn.select_db(db).await,
            ConnectionState::Disconnected => Ok(()),
        };
        self.check(result)?;
        self.config.db = db;
        info!(db, "select redis database");
        Ok(())
    }

    /// Close the connection if there is one. Never fails; shutdown errors
    /// are logged so application exit is never held up.
    pub async fn release(&mut self) {
        let ConnectionState::Connected(conn) = std::mem::take(&mut self.state) else {
            info!("close redis connection: no connection, nothing to do");
            return;
        };
        self.status.set_connected(false);
        match conn.shutdown().await {
            Ok(()) => info!("redis connection closed"),
            Err(e) => error!(error = %e, "redis connection close error"),
        }
    }
}

impl Execute for ConnectionManager {
    async fn execute(&mut self, args: &[&str]) -> Result<RespValue> {
        self.run(args).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────
