//! The top-level entry point tying an engine to its sessions.

use std::sync::Mutex;

use lmhost_context::{Retention, TokenBuffer};
use lmhost_engine::{EngineError, InferenceEngine, TokenId};
use serde::Serialize;

use crate::error::Result;
use crate::generator::Generator;
use crate::options::GenerateOptions;
use crate::registry::SessionRegistry;
use crate::token::FinishReason;

/// A loaded engine plus the registry of conversations served from it.
///
/// The engine sits behind a mutex because backends are not reentrant: a
/// generation turn holds the lock from first evaluation to last token, so
/// concurrent callers on different sessions serialize here rather than
/// interleave engine state.
pub struct LlmHost<E: InferenceEngine> {
    engine: Mutex<E>,
    registry: SessionRegistry,
}

/// Result of running a turn to completion.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
}

impl<E: InferenceEngine> LlmHost<E> {
    /// Wrap a loaded engine. Session dimensions are read from the engine
    /// once, here.
    pub fn new(engine: E, retention: Retention) -> Self {
        let registry = SessionRegistry::new(engine.context_size(), engine.vocab_size(), retention);
        Self {
            engine: Mutex::new(engine),
            registry,
        }
    }

    /// Start a generation turn on the named session, creating the session
    /// on first use. The returned generator holds the engine lock until it
    /// is dropped.
    pub fn generate(
        &self,
        session_id: &str,
        prompt: &str,
        opts: GenerateOptions,
    ) -> Result<Generator<'_, E>> {
        let session = self.registry.get_or_create(session_id);
        let engine = self.engine.lock().unwrap();
        Generator::new(engine, session, prompt, opts)
    }

    /// Run a whole turn eagerly and return the concatenated text.
    pub fn complete(
        &self,
        session_id: &str,
        prompt: &str,
        opts: GenerateOptions,
    ) -> Result<Completion> {
        let mut generator = self.generate(session_id, prompt, opts)?;
        let mut text = String::new();
        let mut finish_reason = FinishReason::None;
        for token in &mut generator {
            let token = token?;
            text.push_str(&token.text);
            finish_reason = token.finish_reason;
        }
        Ok(Completion {
            text,
            finish_reason,
        })
    }

    /// Compute an embedding for `text`, without touching any session.
    ///
    /// The evaluation runs on a scratch buffer from position zero; requires
    /// the engine to be loaded in embedding mode.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut engine = self.engine.lock().unwrap();
        if !engine.embedding_mode() {
            return Err(EngineError::EmbeddingDisabled.into());
        }
        let tokens = engine.tokenize(text, true)?;
        let mut buffer = TokenBuffer::new(engine.context_size());
        buffer.append(&tokens)?;

        let batch_size = engine.batch_size();
        let threads = engine.thread_count();
        while buffer.committed() < buffer.len() {
            let committed = buffer.committed();
            let chunk = (buffer.len() - committed).min(batch_size);
            engine.evaluate(&buffer.tokens()[committed..committed + chunk], committed, threads)?;
            buffer.advance(chunk);
        }
        Ok(engine.embeddings()?)
    }

    /// Tokenize without generating.
    pub fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        Ok(self.engine.lock().unwrap().tokenize(text, add_bos)?)
    }

    /// Decode a stream of token ids back to text.
    pub fn decode(&self, tokens: &[TokenId]) -> String {
        let engine = self.engine.lock().unwrap();
        tokens.iter().map(|&id| engine.decode_token(id)).collect()
    }

    /// Drop one session's conversation state. Returns whether it existed.
    pub fn reset(&self, session_id: &str) -> bool {
        self.registry.remove(session_id)
    }

    /// Drop every session's conversation state.
    pub fn reset_all(&self) {
        self.registry.remove_all();
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}
