//! The per-step output unit of a generation turn.

use serde::Serialize;

use lmhost_engine::TokenId;

/// Why a terminal token ended its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Generation continues.
    None,
    /// The model emitted its end-of-sequence token.
    Finished,
    /// A stop word or stopping criterion matched.
    Stop,
    /// The turn hit its max-new-tokens bound.
    Length,
}

impl FinishReason {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FinishReason::None)
    }
}

/// One generated token. Immutable once emitted.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    /// Vocabulary index.
    pub id: TokenId,
    /// Decoded text fragment (may be empty).
    pub text: String,
    /// Probability mass under the final sampling distribution.
    pub prob: f32,
    /// Wall-clock timestamp of the sampling decision, in milliseconds.
    pub timestamp_ms: u64,
    /// Terminal state of the turn, if this token ended it.
    pub finish_reason: FinishReason,
}

impl Token {
    pub(crate) fn new(id: TokenId, text: String, prob: f32) -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id,
            text,
            prob,
            timestamp_ms,
            finish_reason: FinishReason::None,
        }
    }

    pub(crate) fn finish(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }
}
