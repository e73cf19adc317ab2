//! # lmhost-context
//!
//! Per-conversation mutable state: the [`TokenBuffer`] holding one
//! conversation's full context window, and the [`ScoreCache`] holding the
//! logits the backend produced for it.
//!
//! Both structures truncate in lock-step ("sliding window"): when the window
//! fills up, the oldest tokens and their cached scores are discarded
//! together so that position *i* in either structure always refers to the
//! same conversation token.
//!
//! # Invariants
//! - `committed <= len <= capacity` holds before and after every operation
//! - Truncation is idempotent at the same keep size once `len == keep`

use lmhost_engine::TokenId;

/// Error type for context buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// An append would exceed the context window. Callers are expected to
    /// truncate before appending; hitting this is a defect in the turn.
    #[error("context capacity exceeded: {requested} tokens into a window of {capacity} holding {len}")]
    CapacityExceeded {
        requested: usize,
        len: usize,
        capacity: usize,
    },
}

pub type ContextResult<T> = Result<T, ContextError>;

/// Fixed-capacity ordered sequence of token IDs for one conversation, plus a
/// cursor marking how much of it the inference backend has already consumed.
///
/// The buffer is the single source of truth for the conversation's token
/// state; the backend's incremental cache mirrors the committed prefix.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    tokens: Vec<TokenId>,
    capacity: usize,
    committed: usize,
}

impl TokenBuffer {
    /// Create an empty buffer sized to the model's context window.
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
            capacity,
            committed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of leading tokens already consumed by the backend's
    /// incremental state.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Tokens remaining before the window is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.tokens.len()
    }

    /// The full token sequence.
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    /// The suffix not yet pushed through the backend.
    pub fn uncommitted(&self) -> &[TokenId] {
        &self.tokens[self.committed..]
    }

    /// The trailing `n` tokens (the whole buffer if shorter).
    pub fn last_n(&self, n: usize) -> &[TokenId] {
        &self.tokens[self.tokens.len().saturating_sub(n)..]
    }

    /// Whether appending `n` more tokens would exceed the window.
    pub fn would_overflow(&self, n: usize) -> bool {
        self.tokens.len() + n > self.capacity
    }

    /// Append a batch of tokens, failing if the window would overflow.
    pub fn append(&mut self, tokens: &[TokenId]) -> ContextResult<()> {
        if self.would_overflow(tokens.len()) {
            return Err(ContextError::CapacityExceeded {
                requested: tokens.len(),
                len: self.tokens.len(),
                capacity: self.capacity,
            });
        }
        self.tokens.extend_from_slice(tokens);
        Ok(())
    }

    /// Append a single sampled token.
    pub fn push(&mut self, token: TokenId) -> ContextResult<()> {
        self.append(std::slice::from_ref(&token))
    }

    /// Advance the committed cursor after a successful evaluation chunk.
    pub fn advance(&mut self, n: usize) {
        self.committed = (self.committed + n).min(self.tokens.len());
    }

    /// Discard the oldest tokens, keeping the trailing `keep`.
    ///
    /// If `keep` is zero or at least the capacity, it falls back to half the
    /// window. After truncation both `len` and `committed` equal the
    /// effective keep size.
    ///
    /// This is deliberately lossy: the earliest conversation turns are gone.
    /// Returns the effective keep size.
    pub fn truncate(&mut self, keep: usize) -> usize {
        let keep = if keep == 0 || keep >= self.capacity {
            self.capacity / 2
        } else {
            keep
        };
        if self.tokens.len() > keep {
            let dropped = self.tokens.len() - keep;
            self.tokens.drain(..dropped);
            tracing::warn!(dropped, keep, "sliding window truncation dropped oldest tokens");
        }
        self.committed = keep.min(self.tokens.len());
        keep
    }

    /// Clear all state (session reset).
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.committed = 0;
    }
}

/// Retention mode for cached logits, fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// One slot holding the most recent position's distribution.
    LastOnly,
    /// One slot per buffer position, for callers that inspect historical
    /// distributions (e.g. custom stopping criteria).
    AllPositions,
}

/// Per-position storage for the logits vectors the backend produced.
#[derive(Debug, Clone)]
pub struct ScoreCache {
    retention: Retention,
    vocab_size: usize,
    rows: Vec<Vec<f32>>,
    /// Row index of the most recently saved distribution.
    current: usize,
}

impl ScoreCache {
    pub fn new(retention: Retention, vocab_size: usize, capacity: usize) -> Self {
        let rows = match retention {
            Retention::LastOnly => vec![vec![0.0; vocab_size]],
            Retention::AllPositions => vec![Vec::new(); capacity],
        };
        Self {
            retention,
            vocab_size,
            rows,
            current: 0,
        }
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Save the distribution produced for `position`.
    ///
    /// `LastOnly` overwrites its single slot regardless of position.
    pub fn save(&mut self, logits: &[f32], position: usize) {
        debug_assert_eq!(logits.len(), self.vocab_size);
        match self.retention {
            Retention::LastOnly => {
                self.rows[0].clear();
                self.rows[0].extend_from_slice(logits);
                self.current = 0;
            }
            Retention::AllPositions => {
                if position < self.rows.len() {
                    self.rows[position] = logits.to_vec();
                    self.current = position;
                }
            }
        }
    }

    /// Defensive copy of the currently relevant distribution.
    pub fn read(&self) -> Vec<f32> {
        self.rows[self.current].clone()
    }

    /// Distribution cached for an arbitrary position, if retained.
    pub fn read_at(&self, position: usize) -> Option<&[f32]> {
        match self.retention {
            Retention::LastOnly => None,
            Retention::AllPositions => self
                .rows
                .get(position)
                .filter(|r| !r.is_empty())
                .map(|r| r.as_slice()),
        }
    }

    /// Overwrite the current slot with a processed distribution.
    pub fn update(&mut self, scores: &[f32]) {
        debug_assert_eq!(scores.len(), self.vocab_size);
        self.rows[self.current].clear();
        self.rows[self.current].extend_from_slice(scores);
    }

    /// Shift cached rows forward by `removed` positions, in lock-step with a
    /// [`TokenBuffer::truncate`] that dropped the same count of tokens.
    pub fn shift(&mut self, removed: usize) {
        if removed == 0 {
            return;
        }
        if let Retention::AllPositions = self.retention {
            let n = removed.min(self.rows.len());
            self.rows.rotate_left(n);
            for row in self.rows.iter_mut().rev().take(n) {
                row.clear();
            }
            self.current = self.current.saturating_sub(removed);
        }
    }

    /// Clear all cached distributions (session reset).
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
        if let Retention::LastOnly = self.retention {
            self.rows[0].resize(self.vocab_size, 0.0);
        }
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_resolves_degenerate_keep_sizes() {
        let mut buf = TokenBuffer::new(10);
        buf.append(&[1; 10]).unwrap();
        assert_eq!(buf.truncate(0), 5);
        let mut buf = TokenBuffer::new(10);
        buf.append(&[1; 10]).unwrap();
        assert_eq!(buf.truncate(10), 5);
        assert_eq!(buf.truncate(99), 5);
    }

    #[test]
    fn advance_is_clamped_to_len() {
        let mut buf = TokenBuffer::new(4);
        buf.append(&[1, 2]).unwrap();
        buf.advance(10);
        assert_eq!(buf.committed(), 2);
    }
}
