//! One conversation's accumulated state.

use std::time::SystemTime;

use lmhost_context::{Retention, ScoreCache, TokenBuffer};

/// Token buffer plus score cache for one conversation, owned by the
/// [`SessionRegistry`](crate::SessionRegistry) and mutated by at most one
/// generation turn at a time.
#[derive(Debug)]
pub struct SessionState {
    id: String,
    buffer: TokenBuffer,
    scores: ScoreCache,
    /// Bound for the current turn; set per request, not persisted.
    max_new_tokens: usize,
    created_at: SystemTime,
}

impl SessionState {
    pub fn new(id: impl Into<String>, context_size: usize, vocab_size: usize, retention: Retention) -> Self {
        Self {
            id: id.into(),
            buffer: TokenBuffer::new(context_size),
            scores: ScoreCache::new(retention, vocab_size, context_size),
            max_new_tokens: 0,
            created_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn buffer(&self) -> &TokenBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TokenBuffer {
        &mut self.buffer
    }

    pub fn scores(&self) -> &ScoreCache {
        &self.scores
    }

    pub fn scores_mut(&mut self) -> &mut ScoreCache {
        &mut self.scores
    }

    pub fn max_new_tokens(&self) -> usize {
        self.max_new_tokens
    }

    pub fn set_max_new_tokens(&mut self, bound: usize) {
        self.max_new_tokens = bound;
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Sliding-window truncation: drop the oldest tokens and shift the
    /// cached scores in lock-step. Returns the effective keep size.
    pub fn truncate(&mut self, keep: usize) -> usize {
        let before = self.buffer.len();
        let keep = self.buffer.truncate(keep);
        self.scores.shift(before.saturating_sub(keep));
        keep
    }

    /// Clear all conversation state (explicit reset).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scores.clear();
        self.max_new_tokens = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_shifts_scores_with_buffer() {
        let mut state = SessionState::new("s", 4, 2, Retention::AllPositions);
        state.buffer_mut().append(&[1, 2, 3, 4]).unwrap();
        for pos in 0..4 {
            state.scores_mut().save(&[pos as f32, 0.0], pos);
        }
        state.truncate(2);
        assert_eq!(state.buffer().tokens(), &[3, 4]);
        assert_eq!(state.scores().read_at(0), Some(&[2.0, 0.0][..]));
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = SessionState::new("s", 4, 2, Retention::LastOnly);
        state.buffer_mut().append(&[1, 2]).unwrap();
        state.set_max_new_tokens(7);
        state.reset();
        assert!(state.buffer().is_empty());
        assert_eq!(state.buffer().committed(), 0);
        assert_eq!(state.max_new_tokens(), 0);
    }
}
