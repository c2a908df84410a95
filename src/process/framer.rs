//! Newline framing for raw child output.

/// Splits a byte stream into complete `\n`-terminated lines.
///
/// Partial lines are held until their terminator arrives. Carriage returns
/// are left in place for the consumer.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Empty lines are dropped. Invalid UTF-8 is replaced lossily.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Discard any buffered partial line.
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            tracing::trace!(dropped = self.buffer.len(), "Discarding partial line");
        }
        self.buffer.clear();
    }

    /// Number of bytes waiting for a terminator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
