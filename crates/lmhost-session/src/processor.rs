//! Logits adjustment hooks applied between evaluation and sampling.

use std::collections::HashMap;

use lmhost_engine::TokenId;

/// Rewrites the score vector in place, given the full token history.
pub trait LogitsProcessor: Send + Sync {
    fn process(&self, tokens: &[TokenId], scores: &mut [f32]);
}

/// Ordered list of processors, applied in insertion order.
#[derive(Default)]
pub struct LogitsProcessorList {
    processors: Vec<Box<dyn LogitsProcessor>>,
}

impl LogitsProcessorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, processor: impl LogitsProcessor + 'static) {
        self.processors.push(Box::new(processor));
    }

    pub fn with(mut self, processor: impl LogitsProcessor + 'static) -> Self {
        self.push(processor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn process(&self, tokens: &[TokenId], scores: &mut [f32]) {
        for processor in &self.processors {
            processor.process(tokens, scores);
        }
    }
}

impl std::fmt::Debug for LogitsProcessorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogitsProcessorList")
            .field("len", &self.processors.len())
            .finish()
    }
}

/// Adds a fixed bias to selected tokens' logits.
pub struct TokenBiasProcessor {
    bias: HashMap<TokenId, f32>,
}

impl TokenBiasProcessor {
    pub fn new(bias: HashMap<TokenId, f32>) -> Self {
        Self { bias }
    }
}

impl LogitsProcessor for TokenBiasProcessor {
    fn process(&self, _tokens: &[TokenId], scores: &mut [f32]) {
        for (&token, &bias) in &self.bias {
            if let Some(score) = scores.get_mut(token as usize) {
                *score += bias;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_applies_to_listed_tokens_only() {
        let processor = TokenBiasProcessor::new(HashMap::from([(1, 2.0), (9, 1.0)]));
        let mut scores = vec![0.0, 0.0, 0.0];
        processor.process(&[], &mut scores);
        assert_eq!(scores, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn processors_apply_in_order() {
        let list = LogitsProcessorList::new()
            .with(TokenBiasProcessor::new(HashMap::from([(0, 1.0)])))
            .with(TokenBiasProcessor::new(HashMap::from([(0, 0.5)])));
        let mut scores = vec![0.0];
        list.process(&[], &mut scores);
        assert_eq!(scores, vec![1.5]);
    }
}
