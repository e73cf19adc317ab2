//! The per-turn generation state machine.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use lmhost_engine::InferenceEngine;
use uuid::Uuid;

use crate::error::{GenerateError, Result};
use crate::options::GenerateOptions;
use crate::state::SessionState;
use crate::token::{FinishReason, Token};

/// Lifecycle of one generation turn. Terminal states are disjoint and
/// irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Created,
    Running,
    Finished,
    Stopped,
    LengthLimited,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Finished | TurnState::Stopped | TurnState::LengthLimited
        )
    }
}

/// A lazy, single-pass producer of [`Token`]s for one turn.
///
/// Consuming the generator advances shared session state; it cannot be
/// iterated twice over the same logical turn. The engine lock is held for
/// the generator's whole lifetime — concurrent turns serialize here.
/// Dropping the generator early (consumer stops pulling) is a first-class
/// exit path: the engine lock is released and the turn timing is logged.
#[derive(Debug)]
pub struct Generator<'a, E: InferenceEngine> {
    engine: MutexGuard<'a, E>,
    session: Arc<Mutex<SessionState>>,
    opts: GenerateOptions,
    sampler: lmhost_sampling::Sampler,
    state: TurnState,
    generated: usize,
    turn_id: Uuid,
    started: Instant,
}

impl<'a, E: InferenceEngine> Generator<'a, E> {
    /// Tokenize the prompt and stage it into the session buffer.
    ///
    /// Fails with [`GenerateError::PromptTooLarge`] when the prompt alone
    /// meets or exceeds the context window; truncates the oldest
    /// conversation turns first when appending would overflow it.
    pub(crate) fn new(
        engine: MutexGuard<'a, E>,
        session: Arc<Mutex<SessionState>>,
        prompt: &str,
        opts: GenerateOptions,
    ) -> Result<Self> {
        opts.validate()?;

        let context_size = engine.context_size();
        let prompt_tokens = if prompt.trim().is_empty() {
            vec![engine.token_bos()]
        } else {
            engine.tokenize(prompt, true)?
        };
        if prompt_tokens.len() >= context_size {
            return Err(GenerateError::PromptTooLarge {
                tokens: prompt_tokens.len(),
                context: context_size,
            });
        }
        if opts.verbose_prompt {
            tracing::info!(prompt, "prompt text");
        }

        let turn_id = Uuid::new_v4();
        {
            let mut state = session.lock().unwrap();
            if state.buffer().len() + prompt_tokens.len() > context_size {
                state.truncate(opts.keep_context_tokens);
            }
            state.buffer_mut().append(&prompt_tokens)?;

            let mut max_new = if opts.max_new_tokens == 0 {
                context_size - prompt_tokens.len()
            } else {
                opts.max_new_tokens
            };
            if max_new + prompt_tokens.len() > context_size {
                max_new = context_size - prompt_tokens.len();
            }
            state.set_max_new_tokens(max_new);

            tracing::info!(
                session_id = state.id(),
                %turn_id,
                buffer_len = state.buffer().len(),
                prompt_tokens = prompt_tokens.len(),
                max_new_tokens = max_new,
                "generation starting"
            );
        }

        let seed = opts.sampler.seed;
        Ok(Self {
            engine,
            session,
            opts,
            sampler: lmhost_sampling::Sampler::new(seed),
            state: TurnState::Created,
            generated: 0,
            turn_id,
            started: Instant::now(),
        })
    }

    /// Current lifecycle state of the turn.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Tokens emitted so far this turn.
    pub fn generated(&self) -> usize {
        self.generated
    }

    /// Turn identifier, for log correlation.
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Feed the uncommitted buffer suffix through the engine in chunks of
    /// at most `batch_size`, advancing the committed cursor per chunk.
    fn evaluate_pending(&mut self, session: &mut SessionState) -> Result<()> {
        let batch_size = self.engine.batch_size();
        let threads = self.engine.thread_count();
        while session.buffer().committed() < session.buffer().len() {
            let committed = session.buffer().committed();
            let chunk = (session.buffer().len() - committed).min(batch_size);
            let batch = &session.buffer().tokens()[committed..committed + chunk];
            self.engine.evaluate(batch, committed, threads)?;
            session.buffer_mut().advance(chunk);
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Token> {
        self.state = TurnState::Running;
        let session = Arc::clone(&self.session);
        let mut session = session.lock().unwrap();

        // Bring the engine's incremental state up to date, then cache the
        // distribution it produced.
        self.evaluate_pending(&mut session)?;
        let logits = self.engine.logits();
        let position = session.buffer().committed().saturating_sub(1);
        session.scores_mut().save(&logits, position);

        let mut scores = session.scores().read();
        if !self.opts.logits_processors.is_empty() {
            self.opts
                .logits_processors
                .process(session.buffer().tokens(), &mut scores);
            session.scores_mut().update(&scores);
        }

        let window = if self.opts.sampler.last_n_tokens < 0 {
            self.engine.context_size()
        } else {
            self.opts.sampler.last_n_tokens as usize
        };
        let newline = self.engine.token_nl();
        let chosen = {
            let last_tokens = session.buffer().last_n(window);
            self.sampler
                .sample(&scores, last_tokens, newline, &self.opts.sampler)?
        };

        let text = self.engine.decode_token(chosen.id);
        let token = Token::new(chosen.id, text, chosen.prob);
        self.generated += 1;

        if session.buffer().would_overflow(1) {
            session.truncate(self.opts.keep_context_tokens);
        }
        session.buffer_mut().push(chosen.id)?;

        let (reason, next_state) = if chosen.id == self.engine.token_eos() {
            (FinishReason::Finished, TurnState::Finished)
        } else if !token.text.is_empty() && self.opts.stop_words.iter().any(|w| *w == token.text) {
            (FinishReason::Stop, TurnState::Stopped)
        } else if self
            .opts
            .stopping_criteria
            .should_stop(session.buffer().tokens(), &scores)
        {
            (FinishReason::Stop, TurnState::Stopped)
        } else if self.generated >= session.max_new_tokens() {
            (FinishReason::Length, TurnState::LengthLimited)
        } else {
            (FinishReason::None, TurnState::Running)
        };

        if next_state.is_terminal() {
            // The terminal token is already appended; mark it consumed so
            // the next turn evaluates only genuinely new input.
            session.buffer_mut().advance(1);
            self.state = next_state;
        }
        Ok(token.finish(reason))
    }
}

impl<E: InferenceEngine> Iterator for Generator<'_, E> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.is_terminal() {
            return None;
        }
        match self.step() {
            Ok(token) => Some(Ok(token)),
            Err(err) => {
                // Fatal to the turn; the session keeps whatever was
                // committed so far.
                self.state = TurnState::Stopped;
                Some(Err(err))
            }
        }
    }
}

impl<E: InferenceEngine> Drop for Generator<'_, E> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.generated as f64 / elapsed
        } else {
            0.0
        };
        tracing::debug!(
            turn_id = %self.turn_id,
            state = ?self.state,
            generated = self.generated,
            elapsed_ms = (elapsed * 1000.0) as u64,
            tokens_per_sec = format!("{rate:.1}"),
            "turn finished"
        );
    }
}
