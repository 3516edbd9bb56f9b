use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, DrawCandidate};
use super::AssignmentError;

pub const DEFAULT_ALPHA: f64 = 0.0149;
pub const DEFAULT_GAMMA: f64 = 0.17628;

/// Shape of the rating-to-weight transform.
///
/// `f(r) = 100 - 90 * e^(-alpha * r)` squeezes ratings into `[10, 100)` and the
/// `gamma` power flattens that range further, so a veteran outweighs a newcomer
/// by well under two to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawConfig {
    pub alpha: f64,
    pub gamma: f64,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl DrawConfig {
    /// Relative draw weight for a rating. Negative ratings weigh the same as zero.
    pub fn contribution(&self, rating: i64) -> f64 {
        let rating = rating.max(0) as f64;
        let f = 100.0 - 90.0 * (-self.alpha * rating).exp();
        f.powf(self.gamma)
    }

    /// Expected win probability of every candidate, in input order.
    pub fn shares(&self, candidates: &[DrawCandidate]) -> Vec<f64> {
        let contributions: Vec<f64> = candidates
            .iter()
            .map(|candidate| self.contribution(candidate.rating))
            .collect();
        let sum: f64 = contributions.iter().sum();
        if sum <= 0.0 {
            return vec![0.0; contributions.len()];
        }
        contributions.into_iter().map(|c| c / sum).collect()
    }
}

/// Rating-weighted random draw over the applications of one offer.
pub struct WinnerSelector {
    config: DrawConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl std::fmt::Debug for WinnerSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinnerSelector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WinnerSelector {
    /// Entropy-seeded selector for production draws.
    pub fn new(config: DrawConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Reproducible selector; the same seed yields the same sequence of winners.
    pub fn seeded(config: DrawConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng<R>(config: DrawConfig, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        Self {
            config,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn config(&self) -> &DrawConfig {
        &self.config
    }

    /// Draws one winner. Candidates are walked in the order given.
    pub fn select(&self, candidates: &[DrawCandidate]) -> Result<ApplicationId, AssignmentError> {
        self.select_candidate(candidates)
            .map(|candidate| candidate.application_id)
    }

    pub fn select_candidate<'a>(
        &self,
        candidates: &'a [DrawCandidate],
    ) -> Result<&'a DrawCandidate, AssignmentError> {
        let Some(last) = candidates.last() else {
            return Err(AssignmentError::NoApplicants);
        };

        let contributions: Vec<f64> = candidates
            .iter()
            .map(|candidate| self.config.contribution(candidate.rating))
            .collect();
        let sum: f64 = contributions.iter().sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(AssignmentError::SelectionFailed(format!(
                "contribution total {sum} is not a positive finite weight"
            )));
        }

        let mut target = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0.0..sum)
        };

        for (candidate, contribution) in candidates.iter().zip(&contributions) {
            target -= contribution;
            if target < 0.0 {
                return Ok(candidate);
            }
        }

        // Rounding can leave a sliver of the total after the walk.
        Ok(last)
    }
}
