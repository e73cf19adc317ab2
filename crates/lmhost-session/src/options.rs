//! Per-request generation options.

use serde::Deserialize;

use lmhost_sampling::SamplerOptions;

use crate::processor::LogitsProcessorList;
use crate::stopping::StoppingCriteriaList;
use crate::GenerateError;

fn default_keep_context_tokens() -> usize {
    1024
}

/// Everything one generation call needs beyond the prompt itself.
/// Immutable for the duration of the call.
#[derive(Debug, Deserialize)]
pub struct GenerateOptions {
    /// Numeric sampling policy.
    #[serde(default)]
    pub sampler: SamplerOptions,

    /// Bound on tokens this turn may add. Zero means "fill the remaining
    /// window"; the effective value is always clamped so prompt + new tokens
    /// never exceed the context window.
    #[serde(default)]
    pub max_new_tokens: usize,

    /// Trailing tokens to keep when sliding-window truncation fires.
    #[serde(default = "default_keep_context_tokens")]
    pub keep_context_tokens: usize,

    /// Generated fragments that end the turn with `FinishReason::Stop`.
    #[serde(default)]
    pub stop_words: Vec<String>,

    /// Log the prompt text before generating.
    #[serde(default)]
    pub verbose_prompt: bool,

    /// Logits adjustments applied between evaluation and sampling.
    #[serde(skip)]
    pub logits_processors: LogitsProcessorList,

    /// External stopping predicates, checked after the EOS and stop-word
    /// checks and before the length check.
    #[serde(skip)]
    pub stopping_criteria: StoppingCriteriaList,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            sampler: SamplerOptions::default(),
            max_new_tokens: 0,
            keep_context_tokens: default_keep_context_tokens(),
            stop_words: Vec::new(),
            verbose_prompt: false,
            logits_processors: LogitsProcessorList::default(),
            stopping_criteria: StoppingCriteriaList::default(),
        }
    }
}

impl GenerateOptions {
    /// Reject invalid parameter combinations before any engine call.
    pub fn validate(&self) -> Result<(), GenerateError> {
        let s = &self.sampler;
        if s.temperature < 0.0 || !s.temperature.is_finite() {
            return Err(GenerateError::Config(format!(
                "temperature must be finite and non-negative, got {}",
                s.temperature
            )));
        }
        if s.repeat_penalty <= 0.0 {
            return Err(GenerateError::Config(format!(
                "repeat_penalty must be positive, got {}",
                s.repeat_penalty
            )));
        }
        if !(0.0..=1.0).contains(&s.top_p) {
            return Err(GenerateError::Config(format!(
                "top_p must be within [0, 1], got {}",
                s.top_p
            )));
        }
        if s.mirostat_tau <= 0.0 || s.mirostat_eta <= 0.0 {
            return Err(GenerateError::Config(format!(
                "mirostat tau/eta must be positive, got tau={} eta={}",
                s.mirostat_tau, s.mirostat_eta
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(GenerateOptions::default().validate().is_ok());
    }

    #[test]
    fn negative_temperature_rejected() {
        let mut opts = GenerateOptions::default();
        opts.sampler.temperature = -0.5;
        assert!(matches!(opts.validate(), Err(GenerateError::Config(_))));
    }

    #[test]
    fn out_of_range_top_p_rejected() {
        let mut opts = GenerateOptions::default();
        opts.sampler.top_p = 1.5;
        assert!(opts.validate().is_err());
    }
}
