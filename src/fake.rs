//! In-memory executors for unit tests.
//!
//! [`FakeRedis`] keeps a small keyspace and answers the commands the client
//! issues with Redis semantics, including real cursor iteration: a cursor is
//! an index into the (sorted) element order, COUNT is how many elements one
//! call examines, and MATCH filters after examination, so a filtered round
//! can legitimately come back empty. [`Scripted`] replays canned replies and
//! records what was sent.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{Error, Result};
use crate::manager::Execute;
use crate::resp::types::RespValue;

const DATABASES: usize = 16;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(Vec<(String, String)>),
    ZSet(Vec<(String, f64)>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::ZSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(v) => v.is_empty(),
            Value::Set(v) => v.is_empty(),
            Value::Hash(v) => v.is_empty(),
            Value::ZSet(v) => v.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    ttl_ms: Option<i64>,
}

/// Single-process stand-in for a Redis server.
#[derive(Debug)]
pub struct FakeRedis {
    dbs: Vec<BTreeMap<String, Entry>>,
    db: usize,
    sent: Vec<String>,
    /// Fail every command whose name matches, as a dropped connection would.
    pub fail_command: Option<String>,
}

impl Default for FakeRedis {
    fn default() -> Self {
        Self::new()
    }
}

fn wrongtype() -> Error {
    Error::redis("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn not_integer() -> Error {
    Error::redis("ERR value is not an integer or out of range")
}

fn syntax() -> Error {
    Error::redis("ERR syntax error")
}

fn int_arg(s: &str) -> Result<i64> {
    s.parse().map_err(|_| not_integer())
}

fn bulk_array<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> RespValue {
    RespValue::Array(items.into_iter().map(|s| RespValue::bulk(s.as_ref())).collect())
}

fn count(n: usize) -> RespValue {
    RespValue::Integer(n as i64)
}

fn ok() -> RespValue {
    RespValue::SimpleString("OK".into())
}

/// Glob match with `*`, `?`, `[...]` and `\` escapes.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((&b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((&b'[', rest)) => {
            let Some(close) = rest.iter().position(|&b| b == b']') else {
                return text.first() == Some(&b'[') && glob_match(rest, &text[1..]);
            };
            let Some((&c, tail)) = text.split_first() else {
                return false;
            };
            let (negate, class) = match &rest[..close] {
                [b'^', class @ ..] => (true, class),
                class => (false, class),
            };
            let mut hit = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == b'-' {
                    hit |= class[i] <= c && c <= class[i + 2];
                    i += 3;
                } else {
                    hit |= class[i] == c;
                    i += 1;
                }
            }
            hit != negate && glob_match(&rest[close + 1..], tail)
        }
        Some((&b'\\', [escaped, rest @ ..])) => {
            text.first() == Some(escaped) && glob_match(rest, &text[1..])
        }
        Some((&p, rest)) => text.first() == Some(&p) && glob_match(rest, &text[1..]),
    }
}

/// Parsed `cursor [MATCH pattern] [COUNT n]` tail of a scan command.
struct ScanArgs<'a> {
    cursor: usize,
    pattern: Option<&'a str>,
    count: usize,
}

impl<'a> ScanArgs<'a> {
    fn parse(args: &[&'a str]) -> Result<Self> {
        let (cursor, rest) = args.split_first().ok_or_else(syntax)?;
        let cursor = cursor
            .parse()
            .map_err(|_| Error::redis("ERR invalid cursor"))?;
        let mut parsed = ScanArgs { cursor, pattern: None, count: 10 };
        let mut rest = rest.iter();
        while let Some(opt) = rest.next() {
            let value = rest.next().ok_or_else(syntax)?;
            match opt.to_ascii_uppercase().as_str() {
                "MATCH" => parsed.pattern = Some(*value),
                "COUNT" => {
                    parsed.count = value.parse().map_err(|_| not_integer())?;
                    if parsed.count == 0 {
                        return Err(syntax());
                    }
                }
                _ => return Err(syntax()),
            }
        }
        Ok(parsed)
    }

    /// Examine up to `count` elements from the cursor; keep the ones whose
    /// name matches.
    fn walk<T: Clone>(&self, elems: &[T], name: impl Fn(&T) -> &str) -> (usize, Vec<T>) {
        let start = self.cursor.min(elems.len());
        let end = start.saturating_add(self.count).min(elems.len());
        let hits = elems[start..end]
            .iter()
            .filter(|e| {
                self.pattern
                    .map_or(true, |p| glob_match(p.as_bytes(), name(*e).as_bytes()))
            })
            .cloned()
            .collect();
        let next = if end >= elems.len() { 0 } else { end };
        (next, hits)
    }
}

fn scan_reply(next: usize, items: Vec<String>) -> RespValue {
    RespValue::Array(vec![RespValue::bulk(next.to_string()), bulk_array(items)])
}

impl FakeRedis {
    pub fn new() -> Self {
        Self {
            dbs: vec![BTreeMap::new(); DATABASES],
            db: 0,
            sent: Vec::new(),
            fail_command: None,
        }
    }

    // ── Seeding ────────────────────────────────────────────────────

    fn seed(&mut self, key: &str, value: Value) {
        self.keys().insert(key.to_string(), Entry { value, ttl_ms: None });
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.seed(key, Value::Str(value.to_string()));
    }

    pub fn set_list(&mut self, key: &str, items: &[&str]) {
        self.seed(key, Value::List(items.iter().map(|s| s.to_string()).collect()));
    }

    pub fn set_set<S: AsRef<str>>(&mut self, key: &str, members: &[S]) {
        self.seed(key, Value::Set(members.iter().map(|s| s.as_ref().to_string()).collect()));
    }

    pub fn set_hash(&mut self, key: &str, fields: &[(String, String)]) {
        self.seed(key, Value::Hash(fields.to_vec()));
    }

    pub fn set_zset(&mut self, key: &str, members: &[(&str, f64)]) {
        self.seed(
            key,
            Value::ZSet(members.iter().map(|(m, s)| (m.to_string(), *s)).collect()),
        );
    }

    /// Give `key` a fixed remaining lifetime; PTTL reports it unchanged.
    pub fn set_ttl_ms(&mut self, key: &str, ttl_ms: i64) {
        if let Some(entry) = self.keys().get_mut(key) {
            entry.ttl_ms = Some(ttl_ms);
        }
    }

    // ── Inspection ─────────────────────────────────────────────────

    /// Every command received, space-joined.
    pub fn commands(&self) -> &[String] {
        &self.sent
    }

    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        match self.dbs[self.db].get(key).map(|e| &e.value) {
            Some(Value::List(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn members(&self, key: &str) -> Option<Vec<String>> {
        match self.dbs[self.db].get(key).map(|e| &e.value) {
            Some(Value::Set(v)) => Some(v.iter().cloned().collect()),
            _ => None,
        }
    }

    pub fn zset(&self, key: &str) -> Option<Vec<(String, f64)>> {
        match self.dbs[self.db].get(key).map(|e| &e.value) {
            Some(Value::ZSet(v)) => Some(v.clone()),
            _ => None,
        }
    }

    // ── Command handling ───────────────────────────────────────────

    fn keys(&mut self) -> &mut BTreeMap<String, Entry> {
        &mut self.dbs[self.db]
    }

    /// Fetch a collection of the wanted kind, creating it when `create`.
    fn entry_mut(&mut self, key: &str, create: Option<Value>) -> Result<Option<&mut Value>> {
        let keys = self.keys();
        if !keys.contains_key(key) {
            match create {
                Some(empty) => {
                    keys.insert(key.to_string(), Entry { value: empty, ttl_ms: None });
                }
                None => return Ok(None),
            }
        }
        Ok(keys.get_mut(key).map(|e| &mut e.value))
    }

    fn drop_if_empty(&mut self, key: &str) {
        let keys = self.keys();
        if keys.get(key).is_some_and(|e| e.value.is_empty()) {
            keys.remove(key);
        }
    }

    fn handle(&mut self, args: &[&str]) -> Result<RespValue> {
        let (name, rest) = args.split_first().ok_or_else(syntax)?;
        let name = name.to_ascii_uppercase();
        if self.fail_command.as_deref() == Some(name.as_str()) {
            return Err(Error::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by fake",
            )));
        }

        match (name.as_str(), rest) {
            ("PING", []) => Ok(RespValue::SimpleString("PONG".into())),
            ("SELECT", [db]) => {
                let db: usize = db.parse().map_err(|_| not_integer())?;
                if db >= DATABASES {
                    return Err(Error::redis("ERR DB index is out of range"));
                }
                self.db = db;
                Ok(ok())
            }
            ("CONFIG", [sub, param]) if sub.eq_ignore_ascii_case("GET") => {
                if glob_match(param.as_bytes(), b"databases") {
                    Ok(bulk_array(["databases".to_string(), DATABASES.to_string()]))
                } else {
                    Ok(RespValue::Array(vec![]))
                }
            }
            ("DBSIZE", []) => Ok(count(self.keys().len())),
            ("TYPE", [key]) => Ok(RespValue::SimpleString(
                self.keys()
                    .get(*key)
                    .map_or("none", |e| e.value.type_name())
                    .to_string(),
            )),
            ("SCAN", tail) => {
                let scan = ScanArgs::parse(tail)?;
                let names: Vec<String> = self.keys().keys().cloned().collect();
                let (next, hits) = scan.walk(&names, |k| k.as_str());
                Ok(scan_reply(next, hits))
            }
            ("SSCAN" | "HSCAN" | "ZSCAN", [key, tail @ ..]) => self.scan_collection(&name, key, tail),

            // strings and keys
            ("GET", [key]) => match self.keys().get(*key).map(|e| &e.value) {
                None => Ok(RespValue::Null),
                Some(Value::Str(s)) => Ok(RespValue::bulk(s)),
                Some(_) => Err(wrongtype()),
            },
            ("SET", [key, value]) => {
                self.set_string(key, value);
                Ok(ok())
            }
            ("SETEX", [key, secs, value]) => {
                let secs = int_arg(secs)?;
                if secs <= 0 {
                    return Err(Error::redis("ERR invalid expire time in 'setex' command"));
                }
                self.set_string(key, value);
                self.set_ttl_ms(key, secs * 1000);
                Ok(ok())
            }
            ("DEL", keys) if !keys.is_empty() => {
                let store = self.keys();
                Ok(count(keys.iter().filter(|k| store.remove(**k).is_some()).count()))
            }
            ("EXPIRE", [key, secs]) => {
                let secs = int_arg(secs)?;
                let store = self.keys();
                if !store.contains_key(*key) {
                    return Ok(RespValue::Integer(0));
                }
                if secs <= 0 {
                    store.remove(*key);
                } else if let Some(e) = store.get_mut(*key) {
                    e.ttl_ms = Some(secs * 1000);
                }
                Ok(RespValue::Integer(1))
            }
            ("PERSIST", [key]) => {
                let had = self
                    .keys()
                    .get_mut(*key)
                    .and_then(|e| e.ttl_ms.take())
                    .is_some();
                Ok(RespValue::Integer(had as i64))
            }
            ("PTTL", [key]) => Ok(RespValue::Integer(match self.keys().get(*key) {
                None => -2,
                Some(e) => e.ttl_ms.unwrap_or(-1),
            })),
            ("RENAME", [from, to]) => {
                let store = self.keys();
                let entry = store.remove(*from).ok_or_else(|| Error::redis("ERR no such key"))?;
                store.insert(to.to_string(), entry);
                Ok(ok())
            }

            // hashes
            ("HGET", [key, field]) => match self.keys().get(*key).map(|e| &e.value) {
                None => Ok(RespValue::Null),
                Some(Value::Hash(h)) => Ok(h
                    .iter()
                    .find(|(f, _)| f == field)
                    .map_or(RespValue::Null, |(_, v)| RespValue::bulk(v))),
                Some(_) => Err(wrongtype()),
            },
            ("HSET", [key, pairs @ ..]) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                let Some(Value::Hash(h)) = self.entry_mut(key, Some(Value::Hash(vec![])))? else {
                    return Err(wrongtype());
                };
                let mut added = 0;
                for pair in pairs.chunks_exact(2) {
                    match h.iter_mut().find(|(f, _)| f == pair[0]) {
                        Some(slot) => slot.1 = pair[1].to_string(),
                        None => {
                            h.push((pair[0].to_string(), pair[1].to_string()));
                            added += 1;
                        }
                    }
                }
                Ok(count(added))
            }
            ("HDEL", [key, fields @ ..]) if !fields.is_empty() => {
                let removed = match self.entry_mut(key, None)? {
                    None => 0,
                    Some(Value::Hash(h)) => {
                        let before = h.len();
                        h.retain(|(f, _)| !fields.contains(&f.as_str()));
                        before - h.len()
                    }
                    Some(_) => return Err(wrongtype()),
                };
                self.drop_if_empty(key);
                Ok(count(removed))
            }
            ("HLEN", [key]) => match self.entry_mut(key, None)? {
                None => Ok(count(0)),
                Some(Value::Hash(h)) => Ok(count(h.len())),
                Some(_) => Err(wrongtype()),
            },

            // lists
            ("LLEN", [key]) => match self.entry_mut(key, None)? {
                None => Ok(count(0)),
                Some(Value::List(l)) => Ok(count(l.len())),
                Some(_) => Err(wrongtype()),
            },
            ("LRANGE", [key, start, stop]) => {
                let (start, stop) = (int_arg(start)?, int_arg(stop)?);
                match self.entry_mut(key, None)? {
                    None => Ok(RespValue::Array(vec![])),
                    Some(Value::List(l)) => {
                        let len = l.len() as i64;
                        let norm = |i: i64| if i < 0 { len + i } else { i };
                        let (start, stop) = (norm(start).max(0), norm(stop).min(len - 1));
                        if start > stop {
                            return Ok(RespValue::Array(vec![]));
                        }
                        Ok(bulk_array(&l[start as usize..=stop as usize]))
                    }
                    Some(_) => Err(wrongtype()),
                }
            }
            ("LSET", [key, index, value]) => {
                let index = int_arg(index)?;
                match self.entry_mut(key, None)? {
                    None => Err(Error::redis("ERR no such key")),
                    Some(Value::List(l)) => {
                        let len = l.len() as i64;
                        let i = if index < 0 { len + index } else { index };
                        if i < 0 || i >= len {
                            return Err(Error::redis("ERR index out of range"));
                        }
                        l[i as usize] = value.to_string();
                        Ok(ok())
                    }
                    Some(_) => Err(wrongtype()),
                }
            }
            ("LREM", [key, n, value]) => {
                let n = int_arg(n)?;
                let removed = match self.entry_mut(key, None)? {
                    None => 0,
                    Some(Value::List(l)) => {
                        let limit = if n == 0 { usize::MAX } else { n.unsigned_abs() as usize };
                        let hits: Vec<usize> = l
                            .iter()
                            .enumerate()
                            .filter(|(_, v)| v == value)
                            .map(|(i, _)| i)
                            .collect();
                        let doomed: Vec<usize> = if n < 0 {
                            hits.into_iter().rev().take(limit).collect()
                        } else {
                            hits.into_iter().take(limit).collect()
                        };
                        let mut i = 0;
                        l.retain(|_| {
                            let keep = !doomed.contains(&i);
                            i += 1;
                            keep
                        });
                        doomed.len()
                    }
                    Some(_) => return Err(wrongtype()),
                };
                self.drop_if_empty(key);
                Ok(count(removed))
            }
            ("LPUSH" | "RPUSH", [key, values @ ..]) if !values.is_empty() => {
                let Some(Value::List(l)) = self.entry_mut(key, Some(Value::List(vec![])))? else {
                    return Err(wrongtype());
                };
                for v in values {
                    if name == "LPUSH" {
                        l.insert(0, v.to_string());
                    } else {
                        l.push(v.to_string());
                    }
                }
                Ok(count(l.len()))
            }

            // sets
            ("SADD", [key, members @ ..]) if !members.is_empty() => {
                let Some(Value::Set(s)) = self.entry_mut(key, Some(Value::Set(BTreeSet::new())))?
                else {
                    return Err(wrongtype());
                };
                Ok(count(members.iter().filter(|m| s.insert(m.to_string())).count()))
            }
            ("SREM", [key, members @ ..]) if !members.is_empty() => {
                let removed = match self.entry_mut(key, None)? {
                    None => 0,
                    Some(Value::Set(s)) => members.iter().filter(|m| s.remove(**m)).count(),
                    Some(_) => return Err(wrongtype()),
                };
                self.drop_if_empty(key);
                Ok(count(removed))
            }
            ("SCARD", [key]) => match self.entry_mut(key, None)? {
                None => Ok(count(0)),
                Some(Value::Set(s)) => Ok(count(s.len())),
                Some(_) => Err(wrongtype()),
            },

            // sorted sets
            ("ZADD", [key, score, member]) => {
                let score: f64 = score
                    .parse()
                    .map_err(|_| Error::redis("ERR value is not a valid float"))?;
                let Some(Value::ZSet(z)) = self.entry_mut(key, Some(Value::ZSet(vec![])))? else {
                    return Err(wrongtype());
                };
                match z.iter_mut().find(|(m, _)| m == member) {
                    Some(slot) => {
                        slot.1 = score;
                        Ok(count(0))
                    }
                    None => {
                        z.push((member.to_string(), score));
                        Ok(count(1))
                    }
                }
            }
            ("ZREM", [key, members @ ..]) if !members.is_empty() => {
                let removed = match self.entry_mut(key, None)? {
                    None => 0,
                    Some(Value::ZSet(z)) => {
                        let before = z.len();
                        z.retain(|(m, _)| !members.contains(&m.as_str()));
                        before - z.len()
                    }
                    Some(_) => return Err(wrongtype()),
                };
                self.drop_if_empty(key);
                Ok(count(removed))
            }
            ("ZCARD", [key]) => match self.entry_mut(key, None)? {
                None => Ok(count(0)),
                Some(Value::ZSet(z)) => Ok(count(z.len())),
                Some(_) => Err(wrongtype()),
            },

            _ => Err(Error::redis(format!("ERR unknown command '{}'", args.join(" ")))),
        }
    }

    fn scan_collection(&mut self, name: &str, key: &str, tail: &[&str]) -> Result<RespValue> {
        let scan = ScanArgs::parse(tail)?;
        let Some(value) = self.entry_mut(key, None)? else {
            return Ok(scan_reply(0, vec![]));
        };
        let (next, items) = match (name, value) {
            ("SSCAN", Value::Set(s)) => {
                let members: Vec<String> = s.iter().cloned().collect();
                scan.walk(&members, |m| m.as_str())
            }
            ("HSCAN", Value::Hash(h)) => {
                let (next, hits) = scan.walk(h.as_slice(), |(f, _)| f.as_str());
                (next, hits.into_iter().flat_map(|(f, v)| [f, v]).collect())
            }
            ("ZSCAN", Value::ZSet(z)) => {
                let (next, hits) = scan.walk(z.as_slice(), |(m, _)| m.as_str());
                (next, hits.into_iter().flat_map(|(m, s)| [m, s.to_string()]).collect())
            }
            _ => return Err(wrongtype()),
        };
        Ok(scan_reply(next, items))
    }
}

impl Execute for FakeRedis {
    async fn execute(&mut self, args: &[&str]) -> Result<RespValue> {
        self.sent.push(args.join(" "));
        self.handle(args)
    }
}

/// Replays a fixed list of replies in order and records each command sent.
#[derive(Debug, Default)]
pub struct Scripted {
    replies: VecDeque<Result<RespValue>>,
    sent: Vec<String>,
}

impl Scripted {
    pub fn new(replies: Vec<Result<RespValue>>) -> Self {
        Self {
            replies: replies.into(),
            sent: Vec::new(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.sent.clone()
    }
}

impl Execute for Scripted {
    async fn execute(&mut self, args: &[&str]) -> Result<RespValue> {
        self.sent.push(args.join(" "));
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(Error::Protocol(format!("no scripted reply for {}", args.join(" ")))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match(b"user*", b"user:1"));
        assert!(!glob_match(b"user*", b"item"));
        assert!(glob_match(b"h?llo", b"hallo"));
        assert!(glob_match(b"h[ae]llo", b"hello"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"k[0-9]", b"k7"));
        assert!(glob_match(b"a\\*", b"a*"));
        assert!(!glob_match(b"a\\*", b"ab"));
        assert!(glob_match(b"*", b""));
    }

    #[tokio::test]
    async fn scan_walks_by_index() {
        let mut fake = FakeRedis::new();
        for k in ["a", "b", "c", "d", "e"] {
            fake.set_string(k, "v");
        }
        let reply = fake.execute(&["SCAN", "0", "COUNT", "2"]).await.unwrap();
        assert_eq!(reply, scan_reply(2, vec!["a".into(), "b".into()]));
        let reply = fake.execute(&["SCAN", "4", "COUNT", "2"]).await.unwrap();
        assert_eq!(reply, scan_reply(0, vec!["e".into()]));
    }

    #[tokio::test]
    async fn lrem_directions() {
        let mut fake = FakeRedis::new();
        fake.set_list("l", &["x", "a", "x", "b", "x"]);
        fake.execute(&["LREM", "l", "-1", "x"]).await.unwrap();
        assert_eq!(fake.list("l").unwrap(), vec!["x", "a", "x", "b"]);
        fake.execute(&["LREM", "l", "1", "x"]).await.unwrap();
        assert_eq!(fake.list("l").unwrap(), vec!["a", "x", "b"]);
    }
}
