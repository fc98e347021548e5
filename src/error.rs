use std::io;

use thiserror::Error;

// ── Error taxonomy ─────────────────────────────────────────────────
//
//  Error
//  ├── connection class    Connection / Timeout / Auth / Config
//  ├── NotFound            read accessor hit a missing key or field
//  ├── Protocol            malformed frame or unexpected reply shape
//  ├── Redis               server replied with an error
//  ├── InvalidRequest      unusable page request
//  └── MarkerCollision     list delete marker matched the wrong count

/// Structured Redis error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// NOAUTH Authentication required
    NoAuth,
    /// WRONGPASS invalid username-password pair
    WrongPass,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// BUSY Redis is busy running a script
    Busy,
    /// Any other Redis error prefix
    Other(String),
}

impl RedisErrorKind {
    /// Parse from a Redis error message string (e.g. "WRONGTYPE Operation against…").
    pub fn from_error_msg(msg: &str) -> Self {
        let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
        match prefix {
            "ERR" => Self::Err,
            "WRONGTYPE" => Self::WrongType,
            "NOAUTH" => Self::NoAuth,
            "WRONGPASS" => Self::WrongPass,
            "LOADING" => Self::Loading,
            "READONLY" => Self::ReadOnly,
            "BUSY" => Self::Busy,
            other => Self::Other(other.to_string()),
        }
    }

    /// True for the replies a server sends when credentials are missing or wrong.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::NoAuth | Self::WrongPass)
    }
}

/// All error variants for keyscope.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP / IO level errors
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// Connect or reply deadline exceeded
    #[error("timeout: {0}")]
    Timeout(String),

    /// Handshake rejected the credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Connection settings cannot be used for a handshake
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A read accessor asked for a key or field that does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// RESP framing errors and reply shapes the caller did not expect
    #[error("protocol error: {0}")]
    Protocol(String),

    /// RESP parser needs more data. Control flow only, never surfaced.
    #[error("incomplete RESP message")]
    Incomplete,

    /// Redis returned an error string with structured kind
    #[error("redis error: {message}")]
    Redis {
        kind: RedisErrorKind,
        message: String,
    },

    /// The caller's request cannot be served as given
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// LREM on a list delete marker removed something other than one element
    #[error("list delete marker for key `{key}` removed {removed} elements, expected 1")]
    MarkerCollision { key: String, removed: i64 },
}

impl Error {
    /// Create a Redis error from a raw error message, auto-parsing the kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = RedisErrorKind::from_error_msg(&message);
        Self::Redis { kind, message }
    }

    /// Build a protocol error describing an unexpected reply shape.
    pub fn unexpected(command: &str, got: &str) -> Self {
        Self::Protocol(format!("unexpected {command} reply: {got}"))
    }

    /// Network, handshake and configuration failures.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Auth(_) | Self::Config(_)
        )
    }

    /// True when the transport must be discarded after this error.
    ///
    /// A timeout or malformed frame leaves unread bytes on the socket.
    pub(crate) fn poisons_connection(&self) -> bool {
        self.is_connection_error() || matches!(self, Self::Protocol(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Tests ──────────────────────────────────────────────────────────
