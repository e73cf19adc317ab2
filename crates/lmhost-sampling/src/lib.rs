//! # lmhost-sampling
//!
//! Sampling and decoding strategies: the pure pipeline from (logits, recent
//! token history, options) to a chosen token and its probability.
//!
//! Supports:
//! - Greedy (argmax) when temperature is zero
//! - Repetition, frequency, and presence penalties over a trailing window
//! - Top-k, tail-free (TFS), typical, and top-p truncation filters
//! - Mirostat v1/v2 feedback-controlled sampling
//! - Deterministic seeded RNG for reproducible generation
//!
//! Penalties operate on raw logits before any softmax. Each truncation
//! filter shrinks the candidate set and renormalizes before the next filter
//! runs; the order is fixed (top-k, tail-free, typical, top-p, temperature)
//! and matters.

use serde::Deserialize;

use lmhost_engine::TokenId;

/// Sampling error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SamplingError {
    #[error("logits vector is empty")]
    EmptyLogits,
    #[error("no candidates left after filtering")]
    NoCandidates,
}

pub type SamplingResult<T> = Result<T, SamplingError>;

/// Deterministic RNG for reproducible sampling (xorshift64).
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        // Zero state would produce all zeros.
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Next random float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Mirostat feedback sampling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirostatMode {
    #[default]
    Disabled,
    V1,
    V2,
}

/// Numeric sampling policy. Immutable per generation call.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplerOptions {
    /// Randomness of the generated text. Zero selects greedy decoding.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Repetition penalty over the recent-token window (1.0 = disabled).
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Frequency penalty: per-occurrence logit subtraction.
    #[serde(default)]
    pub frequency_penalty: f32,

    /// Presence penalty: flat logit subtraction for any token that occurred.
    #[serde(default)]
    pub presence_penalty: f32,

    /// Whether the newline token is subject to the penalties above.
    #[serde(default = "default_true")]
    pub penalize_nl: bool,

    /// Top-k filter size. Zero or negative means the full vocabulary.
    #[serde(default = "default_top_k")]
    pub top_k: i32,

    /// Top-p (nucleus) cumulative probability threshold (1.0 = disabled).
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Tail-free sampling parameter z (1.0 = disabled).
    #[serde(default = "default_one")]
    pub tfs_z: f32,

    /// Typical sampling parameter. Currently held at 1.0 (disabled) by the
    /// pipeline regardless of this value.
    #[serde(default = "default_one")]
    pub typical_p: f32,

    /// Mirostat mode; when enabled, replaces the truncation-filter chain.
    #[serde(default)]
    pub mirostat: MirostatMode,

    /// Mirostat target entropy tau.
    #[serde(default = "default_mirostat_tau")]
    pub mirostat_tau: f32,

    /// Mirostat learning rate eta.
    #[serde(default = "default_mirostat_eta")]
    pub mirostat_eta: f32,

    /// Size of the trailing history window the penalties look at.
    /// Negative means the full context.
    #[serde(default = "default_last_n")]
    pub last_n_tokens: i32,

    /// RNG seed for stochastic selection.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_temperature() -> f32 {
    0.8
}
fn default_repeat_penalty() -> f32 {
    1.1
}
fn default_top_k() -> i32 {
    40
}
fn default_top_p() -> f32 {
    0.90
}
fn default_one() -> f32 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_mirostat_tau() -> f32 {
    5.0
}
fn default_mirostat_eta() -> f32 {
    0.1
}
fn default_last_n() -> i32 {
    -1
}
fn default_seed() -> u64 {
    42
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            repeat_penalty: default_repeat_penalty(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            penalize_nl: true,
            top_k: default_top_k(),
            top_p: default_top_p(),
            tfs_z: 1.0,
            typical_p: 1.0,
            mirostat: MirostatMode::Disabled,
            mirostat_tau: default_mirostat_tau(),
            mirostat_eta: default_mirostat_eta(),
            last_n_tokens: default_last_n(),
            seed: default_seed(),
        }
    }
}

impl SamplerOptions {
    /// Greedy decoding: deterministic argmax, no penalties.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            repeat_penalty: 1.0,
            top_k: 0,
            top_p: 1.0,
            ..Self::default()
        }
    }
}

/// One vocabulary entry flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: TokenId,
    pub logit: f32,
    pub p: f32,
}

/// The mutable candidate set the pipeline filters down.
///
/// `sorted` tracks whether `data` is ordered by descending logit, so repeated
/// softmax calls after non-reordering edits can skip the sort.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    data: Vec<Candidate>,
    sorted: bool,
}

impl CandidatePool {
    /// Build an unsorted pool with one candidate per vocabulary entry.
    pub fn from_logits(logits: &[f32]) -> Self {
        let data = logits
            .iter()
            .enumerate()
            .map(|(id, &logit)| Candidate {
                id: id as TokenId,
                logit,
                p: 0.0,
            })
            .collect();
        Self {
            data,
            sorted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.data
    }

    /// Scale/penalize logits of tokens present in the recent history.
    /// Dividing positive and multiplying negative logits both push the
    /// token's probability down.
    pub fn penalize_repetition(&mut self, last_tokens: &[TokenId], penalty: f32) {
        if penalty == 1.0 || last_tokens.is_empty() {
            return;
        }
        for candidate in &mut self.data {
            if last_tokens.contains(&candidate.id) {
                if candidate.logit <= 0.0 {
                    candidate.logit *= penalty;
                } else {
                    candidate.logit /= penalty;
                }
            }
        }
        self.sorted = false;
    }

    /// Subtract frequency/presence penalties from tokens that occur in the
    /// recent history, weighted by their occurrence counts.
    pub fn penalize_frequency_presence(
        &mut self,
        last_tokens: &[TokenId],
        alpha_frequency: f32,
        alpha_presence: f32,
    ) {
        if (alpha_frequency == 0.0 && alpha_presence == 0.0) || last_tokens.is_empty() {
            return;
        }
        let mut counts = std::collections::HashMap::with_capacity(last_tokens.len());
        for &token in last_tokens {
            *counts.entry(token).or_insert(0usize) += 1;
        }
        for candidate in &mut self.data {
            if let Some(&count) = counts.get(&candidate.id) {
                candidate.logit -= count as f32 * alpha_frequency + alpha_presence;
            }
        }
        self.sorted = false;
    }

    /// Force a token's logit back to a given value (newline carve-out).
    pub fn restore_logit(&mut self, id: TokenId, logit: f32) {
        // Penalties never reorder, so before any sort the pool is in id order.
        let idx = id as usize;
        if idx < self.data.len() && self.data[idx].id == id {
            self.data[idx].logit = logit;
        } else if let Some(candidate) = self.data.iter_mut().find(|c| c.id == id) {
            candidate.logit = logit;
        }
        self.sorted = false;
    }

    /// Sort by descending logit (stable, so ties keep ascending-id order)
    /// and fill in normalized probabilities.
    pub fn softmax(&mut self) {
        if !self.sorted {
            self.data
                .sort_by(|a, b| b.logit.partial_cmp(&a.logit).unwrap_or(std::cmp::Ordering::Equal));
            self.sorted = true;
        }
        let max_logit = self.data[0].logit;
        let mut cum_sum = 0.0;
        for candidate in &mut self.data {
            candidate.p = (candidate.logit - max_logit).exp();
            cum_sum += candidate.p;
        }
        for candidate in &mut self.data {
            candidate.p /= cum_sum;
        }
    }

    /// Keep only the `k` highest-logit candidates (at least `min_keep`).
    pub fn top_k(&mut self, k: usize, min_keep: usize) {
        let k = k.max(min_keep).min(self.data.len());
        if !self.sorted {
            self.data
                .sort_by(|a, b| b.logit.partial_cmp(&a.logit).unwrap_or(std::cmp::Ordering::Equal));
            self.sorted = true;
        }
        self.data.truncate(k);
    }

    /// Nucleus filter: keep the smallest prefix whose cumulative probability
    /// reaches `p`.
    pub fn top_p(&mut self, p: f32, min_keep: usize) {
        if p >= 1.0 {
            return;
        }
        self.softmax();
        let mut cum_sum = 0.0;
        let mut last_idx = self.data.len();
        for (i, candidate) in self.data.iter().enumerate() {
            cum_sum += candidate.p;
            if cum_sum >= p && i + 1 >= min_keep {
                last_idx = i + 1;
                break;
            }
        }
        self.data.truncate(last_idx);
    }

    /// Tail-free filter: drop the low-probability "tail" located via the
    /// second derivative of the sorted probability curve.
    pub fn tail_free(&mut self, z: f32, min_keep: usize) {
        if z >= 1.0 || self.data.len() <= 2 {
            return;
        }
        self.softmax();

        let first: Vec<f32> = self
            .data
            .windows(2)
            .map(|w| w[0].p - w[1].p)
            .collect();
        let mut second: Vec<f32> = first.windows(2).map(|w| (w[0] - w[1]).abs()).collect();
        let sum: f32 = second.iter().sum();
        if sum > 1e-6 {
            for value in &mut second {
                *value /= sum;
            }
        } else {
            let uniform = 1.0 / second.len() as f32;
            for value in &mut second {
                *value = uniform;
            }
        }

        let mut cum_sum = 0.0;
        let mut last_idx = self.data.len();
        for (i, &value) in second.iter().enumerate() {
            cum_sum += value;
            if cum_sum > z && i >= min_keep {
                last_idx = i;
                break;
            }
        }
        self.data.truncate(last_idx);
        // Renormalize over the survivors.
        self.softmax();
    }

    /// Locally typical filter: keep tokens whose surprise is closest to the
    /// distribution's entropy until their mass reaches `p`.
    pub fn typical(&mut self, p: f32, min_keep: usize) {
        if p >= 1.0 {
            return;
        }
        self.softmax();

        let entropy: f32 = self
            .data
            .iter()
            .filter(|c| c.p > 0.0)
            .map(|c| -c.p * c.p.ln())
            .sum();

        let mut indices: Vec<usize> = (0..self.data.len()).collect();
        indices.sort_by(|&a, &b| {
            let shift_a = (-self.data[a].p.ln() - entropy).abs();
            let shift_b = (-self.data[b].p.ln() - entropy).abs();
            shift_a.partial_cmp(&shift_b).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut cum_sum = 0.0;
        let mut last_idx = indices.len();
        for (i, &idx) in indices.iter().enumerate() {
            cum_sum += self.data[idx].p;
            if cum_sum > p && i + 1 >= min_keep {
                last_idx = i + 1;
                break;
            }
        }

        let kept: Vec<Candidate> = indices[..last_idx].iter().map(|&i| self.data[i]).collect();
        self.data = kept;
        self.sorted = false;
    }

    /// Temperature scaling on raw logits.
    pub fn temperature(&mut self, t: f32) {
        for candidate in &mut self.data {
            candidate.logit /= t;
        }
    }

    /// Deterministic argmax. Ties resolve to the lowest token id because the
    /// pool is built in id order and the sort is stable.
    pub fn greedy(&mut self) -> SamplingResult<usize> {
        if self.data.is_empty() {
            return Err(SamplingError::NoCandidates);
        }
        self.softmax();
        Ok(0)
    }

    /// Draw one candidate from the renormalized distribution.
    pub fn sample_token(&mut self, rng: &mut SeededRng) -> SamplingResult<usize> {
        if self.data.is_empty() {
            return Err(SamplingError::NoCandidates);
        }
        self.softmax();
        let r = rng.next_f32();
        let mut cum_sum = 0.0;
        for (i, candidate) in self.data.iter().enumerate() {
            cum_sum += candidate.p;
            if r < cum_sum {
                return Ok(i);
            }
        }
        // Rounding left us past the end; take the last positive-mass entry.
        for (i, candidate) in self.data.iter().enumerate().rev() {
            if candidate.p > 0.0 {
                return Ok(i);
            }
        }
        Err(SamplingError::NoCandidates)
    }

    /// Mirostat v1: estimate the Zipf exponent from the top `m` candidates,
    /// derive a top-k cutoff targeting surprise `mu`, then sample and update
    /// `mu` toward the target entropy `tau`.
    pub fn mirostat_v1(
        &mut self,
        rng: &mut SeededRng,
        tau: f32,
        eta: f32,
        m: usize,
        mu: &mut f32,
    ) -> SamplingResult<usize> {
        let n_vocab = self.data.len() as f32;
        self.softmax();

        let mut sum_ti_bi = 0.0;
        let mut sum_ti_sq = 0.0;
        let pairs = m.saturating_sub(1).min(self.data.len().saturating_sub(1));
        for i in 0..pairs {
            let t_i = ((i + 2) as f32 / (i + 1) as f32).ln();
            let b_i = (self.data[i].p / self.data[i + 1].p).ln();
            sum_ti_bi += t_i * b_i;
            sum_ti_sq += t_i * t_i;
        }
        let s_hat = if sum_ti_sq > 0.0 { sum_ti_bi / sum_ti_sq } else { 1.0 };

        let epsilon_hat = s_hat - 1.0;
        let k = ((epsilon_hat * 2f32.powf(*mu)) / (1.0 - n_vocab.powf(-epsilon_hat)))
            .powf(1.0 / s_hat);
        self.top_k(k as usize, 1);

        let idx = self.sample_token(rng)?;
        let observed_surprise = -self.data[idx].p.log2();
        *mu -= eta * (observed_surprise - tau);
        Ok(idx)
    }

    /// Mirostat v2: truncate candidates whose surprise exceeds `mu`, sample
    /// from the survivors, then update `mu` toward `tau`.
    pub fn mirostat_v2(
        &mut self,
        rng: &mut SeededRng,
        tau: f32,
        eta: f32,
        mu: &mut f32,
    ) -> SamplingResult<usize> {
        self.softmax();

        let cutoff = self
            .data
            .iter()
            .position(|c| -c.p.log2() > *mu)
            .unwrap_or(self.data.len())
            .max(1);
        self.data.truncate(cutoff);

        // Renormalize over the survivors.
        self.softmax();
        let idx = self.sample_token(rng)?;
        let observed_surprise = -self.data[idx].p.log2();
        *mu -= eta * (observed_surprise - tau);
        Ok(idx)
    }
}

/// The chosen token and its probability mass under the final distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chosen {
    pub id: TokenId,
    pub prob: f32,
}

/// Stateful sampler: carries the RNG across generation steps so stochastic
/// decoding is reproducible for a given seed.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: SeededRng,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SeededRng::new(seed),
        }
    }

    /// Run the full pipeline over one logits vector.
    ///
    /// `last_tokens` is the trailing history window the penalties inspect;
    /// `newline_token` is exempted from penalties unless `penalize_nl`.
    pub fn sample(
        &mut self,
        logits: &[f32],
        last_tokens: &[TokenId],
        newline_token: TokenId,
        opts: &SamplerOptions,
    ) -> SamplingResult<Chosen> {
        if logits.is_empty() {
            return Err(SamplingError::EmptyLogits);
        }

        let mut pool = CandidatePool::from_logits(logits);

        pool.penalize_repetition(last_tokens, opts.repeat_penalty);
        pool.penalize_frequency_presence(
            last_tokens,
            opts.frequency_penalty,
            opts.presence_penalty,
        );
        if !opts.penalize_nl {
            let idx = newline_token as usize;
            if idx < logits.len() {
                pool.restore_logit(newline_token, logits[idx]);
            }
        }

        let idx = if opts.temperature == 0.0 {
            pool.greedy()?
        } else {
            match opts.mirostat {
                MirostatMode::V1 => {
                    pool.temperature(opts.temperature);
                    let mut mu = 2.0 * opts.mirostat_tau;
                    pool.mirostat_v1(
                        &mut self.rng,
                        opts.mirostat_tau,
                        opts.mirostat_eta,
                        100,
                        &mut mu,
                    )?
                }
                MirostatMode::V2 => {
                    pool.temperature(opts.temperature);
                    let mut mu = 2.0 * opts.mirostat_tau;
                    pool.mirostat_v2(&mut self.rng, opts.mirostat_tau, opts.mirostat_eta, &mut mu)?
                }
                MirostatMode::Disabled => {
                    let k = if opts.top_k <= 0 {
                        pool.len()
                    } else {
                        opts.top_k as usize
                    };
                    pool.top_k(k, 1);
                    pool.tail_free(opts.tfs_z, 1);
                    pool.typical(1.0, 1);
                    pool.top_p(opts.top_p, 1);
                    pool.temperature(opts.temperature);
                    pool.sample_token(&mut self.rng)?
                }
            }
        };

        let candidate = pool.candidates()[idx];
        Ok(Chosen {
            id: candidate.id,
            prob: candidate.p,
        })
    }
}
