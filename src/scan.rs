//! Cursor-paged scanning.
//!
//! Redis's SCAN family hands back a server-chosen number of items per call,
//! sometimes none. [`fetch_page`] keeps calling until the caller's page size
//! is met or the cursor comes back to 0, then attaches the collection's
//! cardinality. One algorithm serves the keyspace, sets, hashes and sorted
//! sets; a [`Collection`] supplies the command names and reply decoding.

use std::collections::HashSet;

use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::manager::Execute;
use crate::page::{Page, PageRequest};
use crate::resp::types::RespValue;

/// Upper bound on the item buffer reserved up front; larger pages grow as
/// items arrive.
const MAX_PREALLOC: usize = 1024;

/// A scannable target: the whole keyspace or one collection key.
pub trait Collection {
    type Item: Send;

    /// Command name plus the key argument, if any (`["SSCAN", key]`).
    fn scan_command(&self) -> Vec<&str>;

    /// Command returning the total element count (`["SCARD", key]`).
    fn cardinality_command(&self) -> Vec<&str>;

    /// Turn the item array of one scan reply into items.
    fn decode(raw: Vec<RespValue>) -> Result<Vec<Self::Item>>;

    /// Identity used to merge repeated items across rounds; items without
    /// one are appended as they come.
    fn merge_key(_item: &Self::Item) -> Option<&str> {
        None
    }
}

/// Every key of the selected database (SCAN / DBSIZE).
#[derive(Debug, Clone, Copy, Default)]
pub struct Keyspace;

/// Members of a set (SSCAN / SCARD).
#[derive(Debug, Clone, Copy)]
pub struct SetMembers<'a>(pub &'a str);

/// Field/value pairs of a hash (HSCAN / HLEN).
#[derive(Debug, Clone, Copy)]
pub struct HashFields<'a>(pub &'a str);

/// Member/score pairs of a sorted set (ZSCAN / ZCARD).
#[derive(Debug, Clone, Copy)]
pub struct ZSetMembers<'a>(pub &'a str);

impl Collection for Keyspace {
    type Item = String;

    fn scan_command(&self) -> Vec<&str> {
        vec!["SCAN"]
    }

    fn cardinality_command(&self) -> Vec<&str> {
        vec!["DBSIZE"]
    }

    fn decode(raw: Vec<RespValue>) -> Result<Vec<String>> {
        raw.iter().map(|v| text(v, "SCAN")).collect()
    }
}

impl Collection for SetMembers<'_> {
    type Item = String;

    fn scan_command(&self) -> Vec<&str> {
        vec!["SSCAN", self.0]
    }

    fn cardinality_command(&self) -> Vec<&str> {
        vec!["SCARD", self.0]
    }

    fn decode(raw: Vec<RespValue>) -> Result<Vec<String>> {
        raw.iter().map(|v| text(v, "SSCAN")).collect()
    }
}

impl Collection for HashFields<'_> {
    type Item = (String, String);

    fn scan_command(&self) -> Vec<&str> {
        vec!["HSCAN", self.0]
    }

    fn cardinality_command(&self) -> Vec<&str> {
        vec!["HLEN", self.0]
    }

    fn decode(raw: Vec<RespValue>) -> Result<Vec<(String, String)>> {
        pairs(&raw, "HSCAN")?
            .map(|(field, value)| Ok((text(field, "HSCAN")?, text(value, "HSCAN")?)))
            .collect()
    }

    /// A field seen twice within one page keeps its first value.
    fn merge_key(item: &(String, String)) -> Option<&str> {
        Some(&item.0)
    }
}

impl Collection for ZSetMembers<'_> {
    type Item = (String, f64);

    fn scan_command(&self) -> Vec<&str> {
        vec!["ZSCAN", self.0]
    }

    fn cardinality_command(&self) -> Vec<&str> {
        vec!["ZCARD", self.0]
    }

    fn decode(raw: Vec<RespValue>) -> Result<Vec<(String, f64)>> {
        pairs(&raw, "ZSCAN")?
            .map(|(member, score)| Ok((text(member, "ZSCAN")?, parse_score(score)?)))
            .collect()
    }
}

// ── Engine ─────────────────────────────────────────────────────────

/// One scan round trip: returns the next cursor and the decoded items.
pub async fn scan_once<E: Execute, C: Collection>(
    exec: &mut E,
    collection: &C,
    cursor: u64,
    count: usize,
    pattern: Option<&str>,
) -> Result<(u64, Vec<C::Item>)> {
    let cursor_str = cursor.to_string();
    let count_str = count.to_string();
    let mut args = collection.scan_command();
    let command = args[0];
    args.push(&cursor_str);
    if let Some(p) = pattern {
        args.extend(["MATCH", p]);
    }
    args.extend(["COUNT", count_str.as_str()]);

    debug!(command, cursor, count, pattern, "scan round");
    let reply = exec.execute(&args).await?;

    let mut parts = reply
        .into_array()
        .filter(|parts| parts.len() == 2)
        .ok_or_else(|| Error::unexpected(command, "expected [cursor, items]"))?;
    let raw_items = parts
        .pop()
        .and_then(RespValue::into_array)
        .ok_or_else(|| Error::unexpected(command, "items is not an array"))?;
    let next = parts
        .pop()
        .as_ref()
        .and_then(RespValue::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::unexpected(command, "cursor is not a number"))?;

    Ok((next, C::decode(raw_items)?))
}

/// Total element count of the collection.
pub async fn cardinality<E: Execute, C: Collection>(exec: &mut E, collection: &C) -> Result<u64> {
    let args = collection.cardinality_command();
    let command = args[0];
    let reply = exec.execute(&args).await?;
    reply
        .as_int()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Error::unexpected(command, reply.type_name()))
}

/// Assemble one page of up to `request.size` items.
///
/// The first round asks for the full page size; follow-up rounds ask for one
/// element at a time so the page boundary is not overshot by much. A single
/// failed round trip aborts the whole page; the caller may retry with the
/// cursor it already holds.
pub async fn fetch_page<E: Execute, C: Collection>(
    exec: &mut E,
    collection: &C,
    request: &PageRequest,
) -> Result<Page<C::Item>> {
    if request.size == 0 {
        return Err(Error::InvalidRequest("page size must be positive".into()));
    }
    let scanned = collection.scan_command().join(" ");
    info!(
        collection = %scanned,
        cursor = request.cursor,
        size = request.size,
        keywords = %request.keywords,
        "page scan"
    );

    let result = assemble(exec, collection, request).await;
    if let Err(e) = &result {
        error!(collection = %scanned, cursor = request.cursor, error = %e, "page scan failed");
    }
    result
}

async fn assemble<E: Execute, C: Collection>(
    exec: &mut E,
    collection: &C,
    request: &PageRequest,
) -> Result<Page<C::Item>> {
    let pattern = request.pattern();
    let mut items = Vec::with_capacity(request.size.min(MAX_PREALLOC));
    let mut seen = HashSet::new();

    let (mut cursor, batch) =
        scan_once(exec, collection, request.cursor, request.size, pattern).await?;
    absorb::<C>(&mut items, &mut seen, batch);

    while cursor != 0 && items.len() < request.size {
        let (next, batch) = scan_once(exec, collection, cursor, 1, pattern).await?;
        absorb::<C>(&mut items, &mut seen, batch);
        cursor = next;
    }

    let total = cardinality(exec, collection).await?;
    Ok(Page { items, total, cursor })
}

fn absorb<C: Collection>(items: &mut Vec<C::Item>, seen: &mut HashSet<String>, batch: Vec<C::Item>) {
    for item in batch {
        let fresh = match C::merge_key(&item) {
            Some(key) => seen.insert(key.to_owned()),
            None => true,
        };
        if fresh {
            items.push(item);
        }
    }
}

// ── Reply decoding helpers ─────────────────────────────────────────

fn text(value: &RespValue, command: &str) -> Result<String> {
    value
        .to_text()
        .ok_or_else(|| Error::unexpected(command, value.type_name()))
}

fn pairs<'a>(
    raw: &'a [RespValue],
    command: &str,
) -> Result<impl Iterator<Item = (&'a RespValue, &'a RespValue)>> {
    if raw.len() % 2 != 0 {
        return Err(Error::unexpected(command, "odd number of elements"));
    }
    Ok(raw.chunks_exact(2).map(|pair| (&pair[0], &pair[1])))
}

/// Scores arrive as strings; Redis spells infinities `inf` / `-inf`.
pub(crate) fn parse_score(value: &RespValue) -> Result<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid score: {value:?}")))
}

// ── Tests ──────────────────────────────────────────────────────────
