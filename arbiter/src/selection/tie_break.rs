//! Deterministic-first tie-break among finalists of equal quality.
//!
//! The structurally simplest SQL wins. If several share the minimum score one
//! is drawn uniformly at random from a seedable generator, so runs configured
//! with a seed are reproducible.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::complexity::ComplexityScorer;

/// Outcome of one tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieBreak {
    pub chosen: usize,
    /// Complexity score of every finalist.
    pub scores: BTreeMap<usize, u64>,
    /// Finalists sharing the minimum score; more than one means a random draw.
    pub tied: Vec<usize>,
}

impl TieBreak {
    pub fn was_random(&self) -> bool {
        self.tied.len() > 1
    }
}

pub struct TieBreaker {
    scorer: ComplexityScorer,
    rng: Mutex<StdRng>,
}

impl TieBreaker {
    /// `seed = None` draws from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            scorer: ComplexityScorer::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Pick among `finalists` (`(candidate index, sql)`); `None` if empty.
    pub fn choose(&self, finalists: &[(usize, &str)]) -> Option<TieBreak> {
        let scores: BTreeMap<usize, u64> = finalists
            .iter()
            .map(|(idx, sql)| (*idx, self.scorer.score(sql)))
            .collect();
        let min = *scores.values().min()?;
        let tied: Vec<usize> = scores
            .iter()
            .filter(|(_, s)| **s == min)
            .map(|(i, _)| *i)
            .collect();
        debug!(?scores, min, "complexity scores for finalists");

        let chosen = if tied.len() == 1 {
            tied[0]
        } else {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            let pick = tied[rng.gen_range(0..tied.len())];
            info!(tied = ?tied, score = min, chosen = pick, "complexity tie; chose at random");
            pick
        };

        Some(TieBreak {
            chosen,
            scores,
            tied,
        })
    }
}

impl std::fmt::Debug for TieBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieBreaker").finish_non_exhaustive()
    }
}
