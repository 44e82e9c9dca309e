/*!
 * RESP-2 Wire Codec
 *
 * This module implements the RESP-2 framing used between clients and the
 * server: five value kinds (simple string, error, integer, bulk string,
 * array), each introduced by a one-byte prefix and terminated by CRLF.
 * The decoder is incremental so the connection layer can feed it partial
 * network reads, and the encoders emit bit-exact frames.
 */

use anyhow::{anyhow, bail, Result};

/// Maximum array nesting the decoder will follow before treating the
/// input as malformed.
pub const MAX_NESTING_DEPTH: usize = 128;

/// A single RESP-2 value.
///
/// Bulk strings and arrays have dedicated null variants (`$-1\r\n` and
/// `*-1\r\n` on the wire) so a decoded frame re-encodes to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+<line>\r\n` - status replies such as `+OK`
    Simple(String),
    /// `-<line>\r\n` - error replies such as `-ERR unknown command`
    Error(String),
    /// `:<n>\r\n` - signed 64-bit integer replies
    Integer(i64),
    /// `$<len>\r\n<bytes>\r\n` - binary-safe string
    Bulk(Vec<u8>),
    /// `$-1\r\n` - absent value
    NullBulk,
    /// `*<count>\r\n<frames...>` - nested sequence of frames
    Array(Vec<Frame>),
    /// `*-1\r\n` - absent array
    NullArray,
}

/// Attempt to decode one complete frame from the start of `data`.
///
/// # Returns
/// * `Ok(Some((frame, consumed)))` - a complete frame and how many bytes it
///   occupied
/// * `Ok(None)` - the buffer holds a valid prefix of a frame; feed more bytes
/// * `Err(...)` - malformed input (unknown prefix, bad length, overflow,
///   missing CRLF, nesting too deep); the caller should drop the connection
pub fn decode(data: &[u8]) -> Result<Option<(Frame, usize)>> {
    decode_at(data, 0)
}

fn decode_at(data: &[u8], depth: usize) -> Result<Option<(Frame, usize)>> {
    if depth > MAX_NESTING_DEPTH {
        bail!("protocol error: array nesting exceeds {} levels", MAX_NESTING_DEPTH);
    }

    let Some(&prefix) = data.first() else {
        return Ok(None);
    };

    match prefix {
        b'+' => Ok(read_line(data, 1).map(|(line, end)| {
            (Frame::Simple(String::from_utf8_lossy(line).into_owned()), end)
        })),

        b'-' => Ok(read_line(data, 1).map(|(line, end)| {
            (Frame::Error(String::from_utf8_lossy(line).into_owned()), end)
        })),

        b':' => match read_line(data, 1) {
            None => Ok(None),
            Some((line, end)) => Ok(Some((Frame::Integer(parse_int(line)?), end))),
        },

        b'$' => {
            let Some((line, body)) = read_line(data, 1) else {
                return Ok(None);
            };
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Frame::NullBulk, body)));
            }
            if len < 0 {
                bail!("protocol error: invalid bulk string length {}", len);
            }

            // Body plus trailing CRLF must be fully buffered
            let len = len as usize;
            if data.len() < body + len + 2 {
                return Ok(None);
            }
            if &data[body + len..body + len + 2] != b"\r\n" {
                bail!("protocol error: bulk string missing CRLF terminator");
            }
            Ok(Some((Frame::Bulk(data[body..body + len].to_vec()), body + len + 2)))
        }

        b'*' => {
            let Some((line, mut cursor)) = read_line(data, 1) else {
                return Ok(None);
            };
            let count = parse_int(line)?;
            if count == -1 {
                return Ok(Some((Frame::NullArray, cursor)));
            }
            if count < 0 {
                bail!("protocol error: invalid array length {}", count);
            }

            let mut items = Vec::with_capacity((count as usize).min(64));
            for _ in 0..count {
                match decode_at(&data[cursor..], depth + 1)? {
                    None => return Ok(None),
                    Some((frame, used)) => {
                        items.push(frame);
                        cursor += used;
                    }
                }
            }
            Ok(Some((Frame::Array(items), cursor)))
        }

        other => bail!("protocol error: unknown type prefix {:?}", other as char),
    }
}

/// Find the line starting at `start` and ending at the first CRLF.
///
/// Returns the line body (without CRLF) and the offset just past the CRLF,
/// or `None` if the terminator has not arrived yet.
fn read_line(data: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Some((&data[start..i], i + 2));
        }
        i += 1;
    }
    None
}

/// Parse a complete decimal line (optional leading minus) with overflow
/// checking. Non-digits and overflow are protocol errors.
fn parse_int(line: &[u8]) -> Result<i64> {
    let (digits, sign) = match line.first() {
        Some(b'-') => (&line[1..], -1i64),
        _ => (line, 1i64),
    };
    if digits.is_empty() {
        bail!("protocol error: empty numeric field");
    }

    let mut num: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            bail!("protocol error: non-numeric field");
        }
        num = num
            .checked_mul(10)
            .and_then(|n| n.checked_add((b - b'0') as i64))
            .ok_or_else(|| anyhow!("protocol error: numeric field overflows"))?;
    }
    Ok(num * sign)
}

//
// RESP-2 Encoders
//
// These build reply frames for sending back to clients. The reply path
// uses the direct byte builders; `encode` renders any `Frame`.
//

/// Encode a simple string reply (`+OK\r\n`).
pub fn resp_simple(s: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(s.len() + 3);
    v.push(b'+');
    v.extend_from_slice(s.as_bytes());
    v.extend_from_slice(b"\r\n");
    v
}

/// Encode an error reply (`-ERR ...\r\n`).
pub fn resp_error(msg: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(msg.len() + 3);
    v.push(b'-');
    v.extend_from_slice(msg.as_bytes());
    v.extend_from_slice(b"\r\n");
    v
}

/// Encode a bulk string reply (`$<len>\r\n<data>\r\n`).
pub fn resp_bulk(b: &[u8]) -> Vec<u8> {
    let len_str = b.len().to_string();
    let mut v = Vec::with_capacity(1 + len_str.len() + 2 + b.len() + 2);
    v.push(b'$');
    v.extend_from_slice(len_str.as_bytes());
    v.extend_from_slice(b"\r\n");
    v.extend_from_slice(b);
    v.extend_from_slice(b"\r\n");
    v
}

/// Encode a null bulk string reply (`$-1\r\n`), used for missing keys.
pub fn resp_null() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

/// Encode an integer reply (`:<n>\r\n`).
pub fn resp_integer(i: i64) -> Vec<u8> {
    let i_str = i.to_string();
    let mut v = Vec::with_capacity(1 + i_str.len() + 2);
    v.push(b':');
    v.extend_from_slice(i_str.as_bytes());
    v.extend_from_slice(b"\r\n");
    v
}

/// Render any frame to its wire form.
pub fn encode(frame: &Frame) -> Vec<u8> {
    match frame {
        Frame::Simple(s) => resp_simple(s),
        Frame::Error(msg) => resp_error(msg),
        Frame::Integer(i) => resp_integer(*i),
        Frame::Bulk(b) => resp_bulk(b),
        Frame::NullBulk => resp_null(),
        Frame::Array(items) => {
            let mut out = format!("*{}\r\n", items.len()).into_bytes();
            for item in items {
                out.extend_from_slice(&encode(item));
            }
            out
        }
        Frame::NullArray => b"*-1\r\n".to_vec(),
    }
}

/// Encode a client request: an array of bulk strings, command name first.
pub fn encode_command(args: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(&resp_bulk(arg));
    }
    out
}
