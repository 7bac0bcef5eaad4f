//! Reassembles newline-delimited lines from arbitrarily chunked reads.

/// Holds the trailing partial line between reads.
///
/// Owned by exactly one reader loop; it is never shared.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed.
    ///
    /// Terminators (`\n`, optionally preceded by `\r`) are stripped and
    /// whitespace-only lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            let raw = std::mem::take(&mut self.pending);
            if let Some(line) = decode(raw) {
                lines.push(line);
            }
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// Flush an unterminated final line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        decode(std::mem::take(&mut self.pending))
    }

    /// Bytes currently buffered without a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode(mut raw: Vec<u8>) -> Option<String> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    let line = match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    if line.trim().is_empty() {
        None
    } else {
        Some(line)
    }
}
