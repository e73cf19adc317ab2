//! Composable stopping criteria for generation turns.
//!
//! The end-of-sequence check is implicit in the generator and cannot be
//! disabled; these criteria sit between it and the final length check.

use std::time::{Duration, Instant};

use lmhost_engine::TokenId;

/// A predicate over the full token history and the current score vector.
pub trait StoppingCriteria: Send + Sync {
    fn should_stop(&self, tokens: &[TokenId], scores: &[f32]) -> bool;
}

/// Ordered list of criteria; any match stops the turn (logical OR).
#[derive(Default)]
pub struct StoppingCriteriaList {
    criteria: Vec<Box<dyn StoppingCriteria>>,
}

impl StoppingCriteriaList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, criteria: impl StoppingCriteria + 'static) {
        self.criteria.push(Box::new(criteria));
    }

    pub fn with(mut self, criteria: impl StoppingCriteria + 'static) -> Self {
        self.push(criteria);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn should_stop(&self, tokens: &[TokenId], scores: &[f32]) -> bool {
        self.criteria.iter().any(|c| c.should_stop(tokens, scores))
    }
}

impl std::fmt::Debug for StoppingCriteriaList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoppingCriteriaList")
            .field("len", &self.criteria.len())
            .finish()
    }
}

/// Stops the turn once a wall-clock budget is exhausted.
pub struct MaxTimeCriteria {
    max: Duration,
    started: Instant,
}

impl MaxTimeCriteria {
    pub fn new(max: Duration) -> Self {
        Self {
            max,
            started: Instant::now(),
        }
    }

    pub fn from_millis(max_millis: u64) -> Self {
        Self::new(Duration::from_millis(max_millis))
    }
}

impl StoppingCriteria for MaxTimeCriteria {
    fn should_stop(&self, _tokens: &[TokenId], _scores: &[f32]) -> bool {
        self.started.elapsed() > self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(bool);

    impl StoppingCriteria for Always {
        fn should_stop(&self, _tokens: &[TokenId], _scores: &[f32]) -> bool {
            self.0
        }
    }

    #[test]
    fn list_is_a_logical_or() {
        let list = StoppingCriteriaList::new().with(Always(false)).with(Always(true));
        assert!(list.should_stop(&[], &[]));
        let list = StoppingCriteriaList::new().with(Always(false));
        assert!(!list.should_stop(&[], &[]));
    }

    #[test]
    fn empty_list_never_matches() {
        assert!(!StoppingCriteriaList::new().should_stop(&[1, 2], &[0.5]));
    }

    #[test]
    fn max_time_with_zero_budget_stops_immediately() {
        let criteria = MaxTimeCriteria::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(criteria.should_stop(&[], &[]));
    }
}
