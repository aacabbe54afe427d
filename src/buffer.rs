use thiserror::Error;

use crate::normalize::normalize;

/// One chunk of upstream text, tagged with its arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub seq: u64,
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("fragment {got} arrived out of order (expected {expected})")]
    OutOfOrder { expected: u64, got: u64 },
}

/// Append-only raw text for one document plus its current normalized view.
///
/// The normalized view is recomputed from the whole raw buffer after every
/// append.
#[derive(Debug, Default, Clone)]
pub struct IncrementBuffer {
    raw: String,
    next_seq: u64,
    normalized: String,
}

impl IncrementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: Fragment) -> Result<&str, BufferError> {
        if fragment.seq != self.next_seq {
            return Err(BufferError::OutOfOrder {
                expected: self.next_seq,
                got: fragment.seq,
            });
        }
        Ok(self.push_text(&fragment.text))
    }

    /// Appends text as the next fragment in sequence.
    pub fn push_text(&mut self, text: &str) -> &str {
        self.next_seq += 1;
        self.raw.push_str(text);
        self.normalized = normalize(&self.raw);
        &self.normalized
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn fragments_received(&self) -> u64 {
        self.next_seq
    }
}
