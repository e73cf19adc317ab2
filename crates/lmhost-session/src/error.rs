//! Error types for the session layer.

use lmhost_context::ContextError;
use lmhost_engine::EngineError;
use lmhost_sampling::SamplingError;

pub type Result<T> = std::result::Result<T, GenerateError>;

/// Top-level error for generation turns.
///
/// Configuration and size-limit errors are raised before any engine call or
/// state mutation. Engine failures abort the in-flight turn and leave the
/// session at its last committed state; other sessions are unaffected. The
/// core never retries.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Invalid sampling or session parameters. Non-retryable.
    #[error("invalid generation options: {0}")]
    Config(String),

    /// Prompt token count meets or exceeds the context window. The caller
    /// must shorten the input.
    #[error("prompt tokens ({tokens}) exceed context window of {context}")]
    PromptTooLarge { tokens: usize, context: usize },

    /// Buffer invariant violation. Treated as a defect, fatal to the turn.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Backend failure (tokenization or evaluation). Fatal to the turn.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Sampling pipeline failure.
    #[error(transparent)]
    Sampling(#[from] SamplingError),
}
