//! Incremental extraction of complete JSON values from a chunked byte stream
//!
//! The upstream model service streams JSON without aligning network chunks to
//! value boundaries: a single chunk may hold half an object, or several
//! sibling values separated by commas and newlines. [`IncrementalJsonExtractor`]
//! buffers raw bytes and hands out each top-level object or array as soon as
//! its closing bracket arrives.
//!
//! Only ASCII structural bytes are matched while scanning, so multi-byte UTF-8
//! sequences split across chunks are reassembled without any decoding step.
//!
//! # Examples
//!
//! ```
//! use streamforge::stream::IncrementalJsonExtractor;
//!
//! let mut extractor = IncrementalJsonExtractor::new();
//! extractor.append(r#"{"a":1},{"b""#);
//! let values: Vec<String> = extractor.drain().map(|v| v.into_string()).collect();
//! assert_eq!(values, vec![r#"{"a":1}"#.to_string()]);
//!
//! extractor.append(":2}");
//! let values: Vec<String> = extractor.drain().map(|v| v.into_string()).collect();
//! assert_eq!(values, vec![r#"{"b":2}"#.to_string()]);
//! ```

use std::fmt;

/// A syntactically complete JSON object or array taken from the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedValue(String);

impl ExtractedValue {
    /// Borrow the raw JSON text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the raw JSON text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ExtractedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stateful scanner that reconstructs complete JSON values from byte chunks
///
/// Each stream owns exactly one extractor. The buffer is only mutated by
/// [`append`](Self::append) and by the consume step that runs when a
/// [`Drain`] is dropped.
#[derive(Debug, Default)]
pub struct IncrementalJsonExtractor {
    buffer: Vec<u8>,
}

impl IncrementalJsonExtractor {
    /// Create an extractor with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk to the end of the buffer
    pub fn append(&mut self, chunk: impl AsRef<[u8]>) {
        self.buffer.extend_from_slice(chunk.as_ref());
    }

    /// Lazily extract every complete value currently in the buffer
    ///
    /// Values are yielded in buffer order. Dropping the returned iterator
    /// removes the yielded values (and the separators after them) from the
    /// buffer; anything not yet resolvable stays for the next `append`.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain {
            buffer: &mut self.buffer,
            scan_pos: 0,
            valid_start: 0,
            done: false,
        }
    }

    /// Bytes waiting for more input
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of buffered bytes
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Iterator returned by [`IncrementalJsonExtractor::drain`]
#[derive(Debug)]
pub struct Drain<'a> {
    buffer: &'a mut Vec<u8>,
    scan_pos: usize,
    valid_start: usize,
    done: bool,
}

impl Iterator for Drain<'_> {
    type Item = ExtractedValue;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let start = skip_separators(self.buffer.as_slice(), self.scan_pos);
            let Some(&lead) = self.buffer.get(start) else {
                self.done = true;
                break;
            };

            if lead != b'{' && lead != b'[' {
                tracing::trace!(
                    position = start,
                    byte = lead,
                    "Malformed lead-in, waiting for more upstream data"
                );
                self.done = true;
                break;
            }

            match scan_value(&self.buffer[start..]) {
                Scan::Complete(close) => {
                    let end = start + close + 1;
                    self.scan_pos = end;
                    self.valid_start = end;
                    match std::str::from_utf8(&self.buffer[start..end]) {
                        Ok(text) => return Some(ExtractedValue(text.to_owned())),
                        Err(e) => {
                            tracing::warn!("Skipping complete value with invalid UTF-8: {}", e);
                        }
                    }
                }
                Scan::Incomplete => {
                    self.done = true;
                }
                Scan::Mismatched(offset) => {
                    tracing::trace!(
                        position = start + offset,
                        "Mismatched closing bracket, leaving remainder unresolved"
                    );
                    self.done = true;
                }
            }
        }
        None
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        let cut = skip_separators(self.buffer.as_slice(), self.valid_start);
        if cut > 0 {
            self.buffer.drain(..cut);
        }
    }
}

/// Result of scanning one candidate value
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// Offset of the bracket that closes the value
    Complete(usize),
    /// Brackets still open at end of buffer
    Incomplete,
    /// Offset of a closer that does not match the innermost opener
    Mismatched(usize),
}

fn skip_separators(buffer: &[u8], from: usize) -> usize {
    let mut pos = from;
    while let Some(&b) = buffer.get(pos) {
        if b.is_ascii_whitespace() || b == b',' {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

/// Scan a value starting at `bytes[0]`, which must be `{` or `[`.
fn scan_value(bytes: &[u8]) -> Scan {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' | b']' => {
                let opener = if b == b'}' { b'{' } else { b'[' };
                if stack.last() != Some(&opener) {
                    return Scan::Mismatched(i);
                }
                stack.pop();
                if stack.is_empty() {
                    return Scan::Complete(i);
                }
            }
            _ => {}
        }
    }

    Scan::Incomplete
}
