//! Incremental UTF-8 decoding.
//!
//! Serial reads split text at arbitrary byte boundaries, so a multi-byte
//! character may arrive in two reads. The decoder holds back an incomplete
//! tail until the rest arrives. Bytes that can never form valid UTF-8
//! (line noise) become U+FFFD instead of failing the stream.

/// Stateful byte-to-text decoder.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Incomplete sequence carried over from the previous read.
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates an empty decoder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the next read, returning all text that is complete so far.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Truncated sequence at the end: wait for more bytes
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Returns `true` if bytes are held back waiting for completion.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
