//! # lmhost-engine
//!
//! The "narrow waist" of the lmhost stack. Defines the [`InferenceEngine`]
//! trait and associated types that all other crates depend on. Backends
//! (native bindings, test doubles) plug in behind this trait without any
//! change to the hosting layer above it.
//!
//! ## Design Notes
//!
//! ### Mutability
//! `evaluate` takes `&mut self` because it advances the backend's internal
//! incremental state ("past tokens"). Everything else is a read of
//! engine-reported constants or of the most recent evaluation's outputs.
//! Callers that share one engine across sessions are responsible for
//! serializing turns on it (see `lmhost-session::LlmHost`).
//!
//! ### Token Type
//! `TokenId` is aliased as `i32` for FFI compatibility, though token IDs are
//! logically non-negative.

pub type Result<T> = std::result::Result<T, EngineError>;

/// Token ID type (i32 for FFI compat; logically non-negative).
pub type TokenId = i32;

/// Errors reported by an inference backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The backend tokenizer rejected the input (negative token count).
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// An evaluation call returned a non-zero status. Fatal to the turn.
    #[error("evaluation failed with status {status}")]
    Evaluation { status: i32 },

    /// `embeddings` was called on an engine not initialized in embedding mode.
    #[error("engine was not initialized in embedding mode")]
    EmbeddingDisabled,

    /// Catch-all for backend-specific failures (library load, OOM, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// The collaborator surface the hosting layer consumes from an inference
/// backend.
///
/// The hosting layer never re-implements matrix math; it only drives this
/// trait: feed uncommitted tokens through [`evaluate`](Self::evaluate) in
/// batches, read back [`logits`](Self::logits), and decode chosen tokens.
pub trait InferenceEngine: Send {
    /// Convert text into token IDs, optionally prefixed with the
    /// begin-of-sequence token.
    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>>;

    /// Decode a single token into its UTF-8 text fragment.
    ///
    /// Best-effort: the fragment may be empty (the end-of-sequence token
    /// typically decodes to an empty or marker fragment, never an error).
    fn decode_token(&self, id: TokenId) -> String;

    /// Evaluate a batch of tokens at the given past position, advancing the
    /// backend's incremental state. A non-zero backend status surfaces as
    /// [`EngineError::Evaluation`].
    fn evaluate(&mut self, tokens: &[TokenId], past_position: usize, threads: usize) -> Result<()>;

    /// Logits for the most recent evaluated position, sized to the
    /// vocabulary.
    fn logits(&self) -> Vec<f32>;

    /// Embedding vector for the evaluated sequence, sized to the embedding
    /// dimension. Only valid when [`embedding_mode`](Self::embedding_mode)
    /// is true.
    fn embeddings(&self) -> Result<Vec<f32>>;

    /// Vocabulary size reported by the backend.
    fn vocab_size(&self) -> usize;

    /// Context window size (prompt + generated tokens the model attends to).
    fn context_size(&self) -> usize;

    /// Begin-of-sequence token ID.
    fn token_bos(&self) -> TokenId;

    /// End-of-sequence token ID.
    fn token_eos(&self) -> TokenId;

    /// Newline token ID (carved out of the repetition penalty on request).
    fn token_nl(&self) -> TokenId;

    /// Largest token chunk a single `evaluate` call accepts.
    fn batch_size(&self) -> usize {
        512
    }

    /// Worker threads the backend should use per evaluation call.
    fn thread_count(&self) -> usize {
        4
    }

    /// Whether the engine was initialized in embedding mode.
    fn embedding_mode(&self) -> bool {
        false
    }
}
