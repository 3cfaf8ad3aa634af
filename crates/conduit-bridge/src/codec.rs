//! Newline-delimited JSON framing.
//!
//! Reads arrive as arbitrary byte chunks: one chunk may hold a fragment of a
//! line, exactly one line, or many lines. [`LineBuffer`] reassembles them.

use serde::Serialize;

use crate::Result;

/// Reassembles `\n`-terminated lines from a stream of byte chunks.
///
/// - A trailing `\r` is stripped from each line.
/// - Blank (whitespace-only) lines are skipped.
/// - A line longer than `max_line_bytes` is discarded up to and including its
///   terminating newline; the buffer then resynchronises on the next line.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
    discarded: u64,
}

impl LineBuffer {
    /// Create a buffer that accepts lines up to `max_line_bytes` long.
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes,
            discarding: false,
            discarded: 0,
        }
    }

    /// Feed a chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buf.len() + head.len() > self.max_line_bytes {
                self.buf.clear();
                self.discarded += 1;
                continue;
            }

            self.buf.extend_from_slice(head);
            let line = std::mem::take(&mut self.buf);
            if let Some(line) = clean(line) {
                lines.push(line);
            }
        }

        if !rest.is_empty() && !self.discarding {
            if self.buf.len() + rest.len() > self.max_line_bytes {
                self.buf.clear();
                self.discarding = true;
                self.discarded += 1;
            } else {
                self.buf.extend_from_slice(rest);
            }
        }

        lines
    }

    /// Take whatever unterminated data remains (called at end of stream).
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.discarding = false;
        clean(std::mem::take(&mut self.buf))
    }

    /// Bytes of the current partial line.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Number of overlong lines dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

fn clean(mut line: Vec<u8>) -> Option<Vec<u8>> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(line)
    }
}

/// Serialize `message` as one compact JSON line terminated by `\n`.
///
/// `serde_json` escapes control characters inside strings, so the output
/// never contains an embedded newline.
pub fn encode_line<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// A short printable preview of a line, for logs.
pub(crate) fn preview(line: &[u8]) -> String {
    const MAX: usize = 120;
    let text = String::from_utf8_lossy(line);
    if text.chars().count() <= MAX {
        text.into_owned()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}
