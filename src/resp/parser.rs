//! Incremental RESP2 reply parser.
//!
//! [`parse`] reads one reply from the front of a buffer and returns
//! `Ok((RespValue, bytes_consumed))`, `Err(Incomplete)` when the buffer ends
//! mid-frame, or `Err(Protocol(…))` on malformed input. Bulk strings are
//! sliced out of the shared `Bytes` buffer without copying.

use bytes::Bytes;
use memchr::memchr;

use crate::error::{Error, Result};
use crate::resp::types::RespValue;

/// Deepest array nesting accepted from a server. Replies used here nest two
/// levels (a SCAN reply); anything far deeper is a broken or hostile peer.
const MAX_DEPTH: usize = 32;

/// Parse one RESP value from the front of `buf`.
pub fn parse(buf: &Bytes) -> Result<(RespValue, usize)> {
    parse_at(buf, 0, 0)
}

/// Convenience wrapper: parse from a byte slice (copies into `Bytes` first).
pub fn parse_slice(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

/// Parse the value starting at `offset`; returns the value and the offset
/// just past it.
fn parse_at(buf: &Bytes, offset: usize, depth: usize) -> Result<(RespValue, usize)> {
    let Some(&tag) = buf.get(offset) else {
        return Err(Error::Incomplete);
    };
    let (line, next) = read_line(buf, offset + 1)?;

    match tag {
        b'+' => Ok((RespValue::SimpleString(utf8(line, "simple string")?), next)),
        b'-' => Ok((RespValue::Error(utf8(line, "error")?), next)),
        b':' => Ok((RespValue::Integer(parse_int(line)?), next)),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok((RespValue::Null, next));
            }
            let end = next + len as usize;
            if buf.len() < end + 2 {
                return Err(Error::Incomplete);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(Error::Protocol(
                    "bulk string not terminated by \\r\\n".into(),
                ));
            }
            Ok((RespValue::BulkString(buf.slice(next..end)), end + 2))
        }
        b'*' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok((RespValue::Null, next));
            }
            if depth >= MAX_DEPTH {
                return Err(Error::Protocol("array nesting too deep".into()));
            }
            // Cap the preallocation: the count comes from the wire.
            let mut items = Vec::with_capacity((count as usize).min(1024));
            let mut pos = next;
            for _ in 0..count {
                let (item, after) = parse_at(buf, pos, depth + 1)?;
                items.push(item);
                pos = after;
            }
            Ok((RespValue::Array(items), pos))
        }
        other => Err(Error::Protocol(format!(
            "unsupported RESP type byte: 0x{other:02x}"
        ))),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Read the line starting at `buf[offset]` up to `\r\n`.
/// Returns `(line_bytes, index_after_crlf)`.
#[inline]
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let search = buf.get(offset..).ok_or(Error::Incomplete)?;
    let cr = memchr(b'\r', search).ok_or(Error::Incomplete)? + offset;
    match buf.get(cr + 1) {
        None => Err(Error::Incomplete),
        Some(b'\n') => Ok((&buf[offset..cr], cr + 2)),
        Some(_) => Err(Error::Protocol("expected \\n after \\r".into())),
    }
}

fn utf8(line: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| Error::Protocol(format!("invalid UTF-8 in {what}: {e}")))
}

/// Parse a signed decimal integer without allocating.
fn parse_int(bytes: &[u8]) -> Result<i64> {
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return Err(Error::Protocol("integer has no digits".into()));
    }

    // Accumulate negatively so i64::MIN parses without overflow.
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(Error::Protocol(format!("invalid byte in integer: 0x{b:02x}")));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_sub(i64::from(b - b'0')))
            .ok_or_else(|| Error::Protocol("integer overflow".into()))?;
    }
    if negative {
        Ok(n)
    } else {
        n.checked_neg()
            .ok_or_else(|| Error::Protocol("integer overflow".into()))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
