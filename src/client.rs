//! The browser-facing client: paged views plus per-type accessors.
//!
//! Generic over [`Execute`] so the same operations run against a live
//! [`ConnectionManager`] or an in-process stand-in.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::manager::{ConnectionManager, ConnectionStatus, Execute};
use crate::page::{KeyDescriptor, KeyType, ListPage, Page, PageRequest};
use crate::resp::types::RespValue;
use crate::scan::{self, HashFields, Keyspace, SetMembers, ZSetMembers};

/// Reported when CONFIG GET databases answers with something unusable.
pub const DEFAULT_DATABASES: u16 = 16;

// ── RedisClient ────────────────────────────────────────────────────

/// One browser session against one Redis server.
///
/// Methods take `&mut self`: a client serves one task at a time and every
/// multi-round operation runs its round trips strictly in order.
#[derive(Debug)]
pub struct RedisClient<E = ConnectionManager> {
    exec: E,
}

impl RedisClient<ConnectionManager> {
    /// A disconnected client; the first operation connects.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_executor(ConnectionManager::new(config))
    }

    /// Build a client from a `redis://` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(ConnectionConfig::from_url(url)?))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.exec
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.exec
    }

    /// Observable connected/loading flags, shareable with the UI thread.
    pub fn status(&self) -> Arc<ConnectionStatus> {
        self.exec.status()
    }

    /// Connect and run the handshake now instead of on first use.
    pub async fn connect(&mut self) -> Result<()> {
        self.exec.acquire().await.map(|_| ())
    }

    /// PING the server; true only when it answered PONG.
    pub async fn test_connect(&mut self) -> Result<bool> {
        self.exec.probe().await
    }

    /// Close the connection. Never fails.
    pub async fn close(&mut self) {
        self.exec.release().await
    }

    pub async fn select_db(&mut self, db: u16) -> Result<()> {
        self.exec.select_db(db).await
    }
}

impl<E: Execute> RedisClient<E> {
    pub fn with_executor(exec: E) -> Self {
        Self { exec }
    }

    pub fn into_inner(self) -> E {
        self.exec
    }

    async fn call(&mut self, args: &[&str]) -> Result<RespValue> {
        self.exec.execute(args).await
    }

    // ── Pages ──────────────────────────────────────────────────────

    /// One page of keys with their types. Costs one TYPE round trip per key.
    pub async fn page_keys(&mut self, request: &PageRequest) -> Result<Page<KeyDescriptor>> {
        let page = scan::fetch_page(&mut self.exec, &Keyspace, request).await?;
        let mut items = Vec::with_capacity(page.items.len());
        for key in page.items {
            let key_type = self.key_type(&key).await?;
            items.push(KeyDescriptor::new(key, key_type));
        }
        Ok(Page {
            items,
            total: page.total,
            cursor: page.cursor,
        })
    }

    pub async fn page_hash(
        &mut self,
        key: &str,
        request: &PageRequest,
    ) -> Result<Page<(String, String)>> {
        scan::fetch_page(&mut self.exec, &HashFields(key), request).await
    }

    pub async fn page_set(&mut self, key: &str, request: &PageRequest) -> Result<Page<String>> {
        scan::fetch_page(&mut self.exec, &SetMembers(key), request).await
    }

    pub async fn page_zset(
        &mut self,
        key: &str,
        request: &PageRequest,
    ) -> Result<Page<(String, f64)>> {
        scan::fetch_page(&mut self.exec, &ZSetMembers(key), request).await
    }

    /// One page of a list by offset. Whether more follows is the caller's
    /// call: compare `total` with `stop`.
    pub async fn page_list(&mut self, key: &str, request: &PageRequest) -> Result<ListPage> {
        let (start, stop) = request.list_range()?;
        info!(key, start, stop, "page list");
        let total = self.llen(key).await?;
        let items = self.lrange(key, start, stop).await?;
        Ok(ListPage {
            items,
            total,
            start,
            stop,
        })
    }

    // ── Single scan rounds ─────────────────────────────────────────

    pub async fn scan(
        &mut self,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<String>)> {
        scan::scan_once(&mut self.exec, &Keyspace, cursor, count, pattern).await
    }

    pub async fn sscan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<String>)> {
        scan::scan_once(&mut self.exec, &SetMembers(key), cursor, count, pattern).await
    }

    pub async fn hscan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<(String, String)>)> {
        scan::scan_once(&mut self.exec, &HashFields(key), cursor, count, pattern).await
    }

    pub async fn zscan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<(String, f64)>)> {
        scan::scan_once(&mut self.exec, &ZSetMembers(key), cursor, count, pattern).await
    }

    // ── Key commands ───────────────────────────────────────────────

    pub async fn key_type(&mut self, key: &str) -> Result<KeyType> {
        let reply = self.call(&["TYPE", key]).await?;
        Ok(KeyType::parse(&text(reply, "TYPE")?))
    }

    /// Remaining lifetime in whole seconds, or -1 for a persistent key.
    ///
    /// Read with PTTL; a key that is still alive always reports at least 1
    /// so it never looks expired.
    pub async fn ttl(&mut self, key: &str) -> Result<i64> {
        let millis = int(self.call(&["PTTL", key]).await?, "PTTL")?;
        match millis {
            -2 => Err(Error::NotFound(format!("key `{key}`"))),
            -1 => Ok(-1),
            ms => Ok((ms / 1000).max(1)),
        }
    }

    /// Set a key's lifetime. A negative value removes any expiry instead.
    pub async fn expire(&mut self, key: &str, seconds: i64) -> Result<bool> {
        if seconds < 0 {
            info!(key, "persist key");
            self.call(&["PERSIST", key]).await?;
            return Ok(true);
        }
        info!(key, seconds, "expire key");
        let secs = seconds.to_string();
        Ok(int(self.call(&["EXPIRE", key, secs.as_str()]).await?, "EXPIRE")? == 1)
    }

    /// Number of keys removed.
    pub async fn del(&mut self, key: &str) -> Result<i64> {
        info!(key, "delete key");
        int(self.call(&["DEL", key]).await?, "DEL")
    }

    pub async fn rename(&mut self, key: &str, new_key: &str) -> Result<()> {
        info!(key, new_key, "rename key");
        ok(self.call(&["RENAME", key, new_key]).await?, "RENAME")
    }

    pub async fn dbsize(&mut self) -> Result<u64> {
        scan::cardinality(&mut self.exec, &Keyspace).await
    }

    /// Number of logical databases the server is configured with.
    pub async fn databases(&mut self) -> Result<u16> {
        let reply = self.call(&["CONFIG", "GET", "databases"]).await?;
        let count = reply
            .into_array()
            .and_then(|mut parts| parts.pop())
            .and_then(|value| value.as_str().and_then(|s| s.parse::<u16>().ok()));
        Ok(count.unwrap_or_else(|| {
            warn!(fallback = DEFAULT_DATABASES, "unexpected CONFIG GET databases reply");
            DEFAULT_DATABASES
        }))
    }

    // ── String commands ────────────────────────────────────────────

    pub async fn get(&mut self, key: &str) -> Result<String> {
        match self.call(&["GET", key]).await? {
            RespValue::Null => Err(Error::NotFound(format!("key `{key}`"))),
            reply => text(reply, "GET"),
        }
    }

    /// SET, or SETEX when a non-negative expiry in seconds is given.
    pub async fn set(&mut self, key: &str, value: &str, expire: Option<i64>) -> Result<()> {
        let reply = match expire {
            Some(seconds) if seconds >= 0 => {
                info!(key, seconds, "set string with expiry");
                let secs = seconds.to_string();
                self.call(&["SETEX", key, secs.as_str(), value]).await?
            }
            _ => {
                info!(key, "set string");
                self.call(&["SET", key, value]).await?
            }
        };
        ok(reply, "SET")
    }

    // ── Hash commands ──────────────────────────────────────────────

    pub async fn hget(&mut self, key: &str, field: &str) -> Result<String> {
        match self.call(&["HGET", key, field]).await? {
            RespValue::Null => Err(Error::NotFound(format!("key `{key}`, field `{field}`"))),
            reply => text(reply, "HGET"),
        }
    }

    /// True when the field was newly created rather than overwritten.
    pub async fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        info!(key, field, "set hash field");
        Ok(int(self.call(&["HSET", key, field, value]).await?, "HSET")? > 0)
    }

    pub async fn hdel(&mut self, key: &str, field: &str) -> Result<i64> {
        info!(key, field, "delete hash field");
        int(self.call(&["HDEL", key, field]).await?, "HDEL")
    }

    pub async fn hlen(&mut self, key: &str) -> Result<u64> {
        scan::cardinality(&mut self.exec, &HashFields(key)).await
    }

    // ── List commands ──────────────────────────────────────────────

    /// Elements in the closed offset range `[start, stop]`.
    pub async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        let reply = self.call(&["LRANGE", key, start.as_str(), stop.as_str()]).await?;
        texts(reply, "LRANGE")
    }

    pub async fn llen(&mut self, key: &str) -> Result<u64> {
        count(self.call(&["LLEN", key]).await?, "LLEN")
    }

    pub async fn lset(&mut self, key: &str, index: i64, value: &str) -> Result<()> {
        info!(key, index, "set list element");
        let index = index.to_string();
        ok(self.call(&["LSET", key, index.as_str(), value]).await?, "LSET")
    }

    /// Prepend; returns the new length.
    pub async fn lpush(&mut self, key: &str, value: &str) -> Result<u64> {
        info!(key, "prepend list element");
        count(self.call(&["LPUSH", key, value]).await?, "LPUSH")
    }

    /// Append; returns the new length.
    pub async fn rpush(&mut self, key: &str, value: &str) -> Result<u64> {
        info!(key, "append list element");
        count(self.call(&["RPUSH", key, value]).await?, "RPUSH")
    }

    /// Remove the first element equal to `value`.
    pub async fn lrem(&mut self, key: &str, value: &str) -> Result<i64> {
        info!(key, "remove list element by value");
        int(self.call(&["LREM", key, "1", value]).await?, "LREM")
    }

    /// Remove the element at `index`.
    ///
    /// Redis has no delete-by-index, so the slot is overwritten with a fresh
    /// random marker and every copy of the marker is then removed. Two round
    /// trips, not atomic: a concurrent writer can see the marker in between.
    pub async fn ldel(&mut self, key: &str, index: i64) -> Result<()> {
        let marker = format!("__keyscope_ldel_{}__", Uuid::new_v4().simple());
        info!(key, index, "delete list element by index");
        self.lset(key, index, &marker).await?;

        let removed = int(self.call(&["LREM", key, "0", marker.as_str()]).await?, "LREM")?;
        if removed != 1 {
            error!(key, index, removed, "list delete marker removed an unexpected count");
            return Err(Error::MarkerCollision {
                key: key.to_string(),
                removed,
            });
        }
        Ok(())
    }

    // ── Set commands ───────────────────────────────────────────────

    pub async fn sadd(&mut self, key: &str, member: &str) -> Result<i64> {
        info!(key, "add set member");
        int(self.call(&["SADD", key, member]).await?, "SADD")
    }

    pub async fn srem(&mut self, key: &str, member: &str) -> Result<i64> {
        info!(key, "remove set member");
        int(self.call(&["SREM", key, member]).await?, "SREM")
    }

    /// Replace `old` with `new`: remove then add, two round trips.
    /// Returns the number of members actually added.
    pub async fn supdate(&mut self, key: &str, old: &str, new: &str) -> Result<i64> {
        self.srem(key, old).await?;
        self.sadd(key, new).await
    }

    pub async fn scard(&mut self, key: &str) -> Result<u64> {
        scan::cardinality(&mut self.exec, &SetMembers(key)).await
    }

    // ── Sorted set commands ────────────────────────────────────────

    /// True when `member` was new; an existing member only has its score
    /// updated.
    pub async fn zadd(&mut self, key: &str, member: &str, score: f64) -> Result<bool> {
        info!(key, score, "add sorted set member");
        let score = score.to_string();
        Ok(int(self.call(&["ZADD", key, score.as_str(), member]).await?, "ZADD")? == 1)
    }

    pub async fn zrem(&mut self, key: &str, member: &str) -> Result<i64> {
        info!(key, "remove sorted set member");
        int(self.call(&["ZREM", key, member]).await?, "ZREM")
    }

    /// Replace `old` with `new` at `score`: remove then add.
    pub async fn zupdate(&mut self, key: &str, old: &str, new: &str, score: f64) -> Result<bool> {
        self.zrem(key, old).await?;
        self.zadd(key, new, score).await
    }

    pub async fn zcard(&mut self, key: &str) -> Result<u64> {
        scan::cardinality(&mut self.exec, &ZSetMembers(key)).await
    }
}

// ── Reply conversions ──────────────────────────────────────────────

fn int(reply: RespValue, command: &str) -> Result<i64> {
    reply
        .as_int()
        .ok_or_else(|| Error::unexpected(command, reply.type_name()))
}

fn count(reply: RespValue, command: &str) -> Result<u64> {
    u64::try_from(int(reply, command)?)
        .map_err(|_| Error::unexpected(command, "negative count"))
}

fn ok(reply: RespValue, command: &str) -> Result<()> {
    if reply.is_ok() {
        Ok(())
    } else {
        Err(Error::unexpected(command, reply.type_name()))
    }
}

fn text(reply: RespValue, command: &str) -> Result<String> {
    reply
        .to_text()
        .ok_or_else(|| Error::unexpected(command, reply.type_name()))
}

fn texts(reply: RespValue, command: &str) -> Result<Vec<String>> {
    reply
        .into_array()
        .ok_or_else(|| Error::unexpected(command, "expected array"))?
        .into_iter()
        .map(|item| text(item, command))
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────
