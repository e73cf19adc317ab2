//! # lmhost-session
//!
//! The hosting layer proper: per-conversation session state, the registry
//! that owns it, and the generation state machine that drives an
//! [`InferenceEngine`](lmhost_engine::InferenceEngine) through the
//! truncate / evaluate / sample / append / stop loop.
//!
//! ## Concurrency model
//!
//! One generation turn runs on a single thread of control. Sessions for
//! different conversation ids are independent; the only shared mutable state
//! is the [`SessionRegistry`] map and the engine itself. [`LlmHost`] wraps
//! the engine in a mutex and holds the lock for the whole turn — the engine
//! is assumed non-reentrant, so turns serialize on it even though their
//! buffers are independent.

mod error;
mod generator;
mod host;
mod options;
mod processor;
mod registry;
mod state;
mod stopping;
mod token;

pub use error::{GenerateError, Result};
pub use generator::{Generator, TurnState};
pub use host::{Completion, LlmHost};
pub use options::GenerateOptions;
pub use processor::{LogitsProcessor, LogitsProcessorList, TokenBiasProcessor};
pub use registry::{SessionRegistry, DEFAULT_SESSION_ID};
pub use state::SessionState;
pub use stopping::{MaxTimeCriteria, StoppingCriteria, StoppingCriteriaList};
pub use token::{FinishReason, Token};
