//! RESP command serializer.
//!
//! Commands go out as an array of bulk strings:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`

use itoa::Buffer;

/// Encode a command (list of binary-safe arguments) into RESP wire format.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    // '*' + count + CRLF, then '$' + len + CRLF + data + CRLF per argument
    let cap = 13 + args.iter().map(|a| a.as_ref().len() + 15).sum::<usize>();
    let mut buf = Vec::with_capacity(cap);
    let mut digits = Buffer::new();

    buf.push(b'*');
    buf.extend_from_slice(digits.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(digits.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }

    buf
}

// ── Tests ──────────────────────────────────────────────────────────
