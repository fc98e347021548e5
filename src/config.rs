//! Connection configuration and URL parsing.
//!
//! Accepts `redis://[user:pass@]host[:port][/db]`. The browser talks to a
//! single plain-TCP server, so TLS, sentinel and cluster schemes are refused.

use crate::error::{Error, Result};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Full connection configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional username (Redis 6+ ACL).
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Database index selected right after the handshake.
    pub db: u16,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-reply timeout in milliseconds (0 = wait forever).
    pub read_timeout_ms: u64,
    /// Maximum read buffer size in bytes.
    pub max_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            connect_timeout_ms: 5000,
            read_timeout_ms: 30_000,
            max_buffer_size: crate::connection::tcp::DEFAULT_MAX_BUF_SIZE,
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish()
    }
}

impl ConnectionConfig {
    /// Config for `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse a Redis URL into a ConnectionConfig.
    pub fn from_url(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::Config(format!("invalid URL, missing ://: {url}")))?;

        if scheme != "redis" {
            return Err(Error::Config(format!("unsupported URL scheme: {scheme}")));
        }

        let mut config = Self::default();
        let (host_part, db_part) = split_path(rest);

        if let Some(db_str) = db_part {
            config.db = db_str
                .parse()
                .map_err(|_| Error::Config(format!("invalid db number: {db_str}")))?;
        }

        let host_port = match host_part.rsplit_once('@') {
            Some((userinfo, hp)) => {
                parse_userinfo(&mut config, userinfo);
                hp
            }
            None => host_part,
        };

        let (host, port) = parse_host_port(host_port)?;
        config.host = host;
        config.port = port;
        Ok(config)
    }

    /// Return the server address as "host:port".
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Reject settings that can never complete a handshake.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".into()));
        }
        if self.max_buffer_size == 0 {
            return Err(Error::Config("max_buffer_size must be non-zero".into()));
        }
        Ok(())
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

/// Split `rest` into (before_path, Some(path)) or (rest, None).
fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('/') {
        Some((before, after)) if !after.is_empty() => (before, Some(after)),
        Some((before, _)) => (before, None),
        None => (rest, None),
    }
}

/// Parse `user:pass`, `:pass` or a bare password into config.
fn parse_userinfo(config: &mut ConnectionConfig, userinfo: &str) {
    let (user, pass) = userinfo.split_once(':').unwrap_or(("", userinfo));
    if !user.is_empty() {
        config.username = Some(user.to_string());
    }
    if !pass.is_empty() {
        config.password = Some(pass.to_string());
    }
}

/// Parse `host[:port]` or `[ipv6][:port]`.
fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(bracketed) = s.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| Error::Config(format!("unclosed IPv6 bracket: {s}")))?;
        (host, after.strip_prefix(':'))
    } else {
        match s.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (s, None),
        }
    };

    let port = match port {
        Some(p) => p
            .parse()
            .map_err(|_| Error::Config(format!("invalid port: {p}")))?,
        None => DEFAULT_PORT,
    };
    let host = if host.is_empty() { "127.0.0.1" } else { host };
    Ok((host.to_string(), port))
}

// ── Tests ──────────────────────────────────────────────────────────
