//! Byte chunk to text line reassembly.
//!
//! Transports hand over bytes in whatever pieces the network produced. Lines
//! and even multi-byte characters can straddle those pieces, so the decoder
//! keeps two kinds of carry-over between calls:
//!
//! - a byte residue holding an incomplete UTF-8 sequence
//! - the text of the last, not yet terminated line

/// Incremental splitter turning byte chunks into complete lines.
///
/// One decoder serves exactly one upstream stream.
///
/// # Example
/// ```
/// use ollachat::line::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// assert!(decoder.feed(b"ab").is_empty());
/// assert_eq!(decoder.feed(b"c\nde"), vec!["abc".to_string()]);
/// assert_eq!(decoder.finish(), Some("de".to_string()));
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    residue: Vec<u8>,
    pending: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, terminators stripped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.residue.extend_from_slice(chunk);
        self.decode_residue();

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Flush the decoder at end of stream.
    ///
    /// Returns the unterminated last line, if it holds anything. Bytes that
    /// never formed a complete character are decoded lossily.
    pub fn finish(&mut self) -> Option<String> {
        if !self.residue.is_empty() {
            let tail = String::from_utf8_lossy(&self.residue).into_owned();
            self.pending.push_str(&tail);
            self.residue.clear();
        }

        let mut line = std::mem::take(&mut self.pending);
        if line.ends_with('\r') {
            line.pop();
        }
        (!line.is_empty()).then_some(line)
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.residue.is_empty() && self.pending.is_empty()
    }

    /// Move every decodable byte from the residue into `pending`.
    fn decode_residue(&mut self) {
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.residue[consumed..]) {
                Ok(text) => {
                    self.pending.push_str(text);
                    consumed = self.residue.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // The first `valid_up_to` bytes always decode.
                    let text = std::str::from_utf8(&self.residue[consumed..consumed + valid])
                        .unwrap_or_default();
                    self.pending.push_str(text);
                    consumed += valid;

                    match e.error_len() {
                        // Garbage in the middle of the stream.
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            consumed += len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => break,
                    }
                }
            }
        }
        self.residue.drain(..consumed);
    }
}
