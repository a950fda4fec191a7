//! Immutable scoring tables and the registry that swaps them on reload.

use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use crate::config::RankingConfig;
use crate::error::Result;
use crate::posting::key::{MAX_DENSITY_RANK, MAX_DIVERSITY_RANK, MAX_WORD_SPAM_RANK};
use crate::posting::{HashGroup, NUM_HASH_GROUPS};

const DIVERSITY_RANKS: usize = MAX_DIVERSITY_RANK as usize + 1;
const DENSITY_RANKS: usize = MAX_DENSITY_RANK as usize + 1;
const SPAM_RANKS: usize = MAX_WORD_SPAM_RANK as usize + 1;

/// Quadratic interpolation from `(x0, y0)` to `(x1, y1)`, clamped at both ends.
fn scale_quadratic(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    if x <= x0 {
        return y0;
    }
    if x >= x1 {
        return y1;
    }
    let dx = (x - x0) / (x1 - x0);
    y0 + dx * dx * (y1 - y0)
}

/// Lookup tables derived from a [`RankingConfig`].
///
/// Built once and shared read-only by every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    hash_group: [f32; NUM_HASH_GROUPS],
    diversity: [f32; DIVERSITY_RANKS],
    density: [f32; DENSITY_RANKS],
    word_spam: [f32; SPAM_RANKS],
    linker: [f32; SPAM_RANKS],
    pub fixed_distance: i32,
    pub wiki_weight: f32,
    pub wiki_bigram_weight: f32,
    pub site_rank_multiplier: f32,
    pub max_sublists: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::from_config(&RankingConfig::default())
    }
}

impl ScoringWeights {
    /// Validate `config` and build the tables.
    pub fn new(config: &RankingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: &RankingConfig) -> Self {
        let mut hash_group = [0.0; NUM_HASH_GROUPS];
        for group in HashGroup::ALL {
            hash_group[group.index()] = config.hash_group_weights.get(group);
        }

        let mut diversity = [0.0; DIVERSITY_RANKS];
        for (i, w) in diversity.iter_mut().enumerate() {
            *w = scale_quadratic(
                i as f32,
                0.0,
                MAX_DIVERSITY_RANK as f32,
                config.diversity_weight_min,
                config.diversity_weight_max,
            );
        }

        let mut density = [0.0; DENSITY_RANKS];
        for (i, w) in density.iter_mut().enumerate() {
            *w = scale_quadratic(
                i as f32,
                0.0,
                MAX_DENSITY_RANK as f32,
                config.density_weight_min,
                config.density_weight_max,
            );
        }

        let mut word_spam = [0.0; SPAM_RANKS];
        let mut linker = [0.0; SPAM_RANKS];
        for i in 0..SPAM_RANKS {
            word_spam[i] = (i as f32 + 1.0) / SPAM_RANKS as f32;
            linker[i] = (1.0 + i as f32).sqrt();
        }

        Self {
            hash_group,
            diversity,
            density,
            word_spam,
            linker,
            fixed_distance: config.fixed_distance,
            wiki_weight: config.wiki_weight,
            wiki_bigram_weight: config.wiki_bigram_weight,
            site_rank_multiplier: config.site_rank_multiplier,
            max_sublists: config.max_sublists,
        }
    }

    #[inline]
    pub fn hash_group(&self, group: HashGroup) -> f32 {
        self.hash_group[group.index()]
    }

    #[inline]
    pub fn diversity(&self, rank: u8) -> f32 {
        self.diversity[(rank as usize).min(DIVERSITY_RANKS - 1)]
    }

    #[inline]
    pub fn density(&self, rank: u8) -> f32 {
        self.density[(rank as usize).min(DENSITY_RANKS - 1)]
    }

    #[inline]
    pub fn word_spam(&self, rank: u8) -> f32 {
        self.word_spam[(rank as usize).min(SPAM_RANKS - 1)]
    }

    /// Weight of a link-text posting by the linking site's rank.
    #[inline]
    pub fn linker(&self, site_rank: u8) -> f32 {
        self.linker[(site_rank as usize).min(SPAM_RANKS - 1)]
    }

    /// Largest value of the spam or linker table, whichever applies.
    pub(crate) fn max_spam_or_linker(&self) -> f32 {
        self.word_spam
            .iter()
            .chain(self.linker.iter())
            .copied()
            .fold(0.0, f32::max)
    }
}

/// Holds the current [`ScoringWeights`] and replaces them atomically.
///
/// Evaluations take an `Arc` snapshot with [`current`](Self::current) and
/// keep using it even if a reload happens meanwhile.
#[derive(Debug)]
pub struct WeightRegistry {
    current: RwLock<Arc<ScoringWeights>>,
}

impl Default for WeightRegistry {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(ScoringWeights::default())),
        }
    }
}

impl WeightRegistry {
    pub fn new(config: &RankingConfig) -> Result<Self> {
        Ok(Self {
            current: RwLock::new(Arc::new(ScoringWeights::new(config)?)),
        })
    }

    /// Snapshot of the active weights.
    pub fn current(&self) -> Arc<ScoringWeights> {
        Arc::clone(&self.current.read())
    }

    /// Rebuild the tables from `config`. The old tables stay active if the
    /// config does not validate.
    pub fn reload(&self, config: &RankingConfig) -> Result<()> {
        let weights = Arc::new(ScoringWeights::new(config)?);
        *self.current.write() = weights;
        info!("scoring weights reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_quadratic() {
        assert_eq!(scale_quadratic(0.0, 0.0, 10.0, 1.0, 2.0), 1.0);
        assert_eq!(scale_quadratic(10.0, 0.0, 10.0, 1.0, 2.0), 2.0);
        assert!((scale_quadratic(5.0, 0.0, 10.0, 1.0, 2.0) - 1.25).abs() < 1e-6);
        assert_eq!(scale_quadratic(-3.0, 0.0, 10.0, 1.0, 2.0), 1.0);
    }

    #[test]
    fn test_default_tables() {
        let w = ScoringWeights::default();
        assert_eq!(w.hash_group(HashGroup::Title), 8.0);
        assert!((w.diversity(0) - 0.15).abs() < 1e-6);
        assert_eq!(w.diversity(MAX_DIVERSITY_RANK), 1.0);
        assert!((w.density(0) - 0.35).abs() < 1e-6);
        assert_eq!(w.density(MAX_DENSITY_RANK), 1.0);
        assert_eq!(w.word_spam(15), 1.0);
        assert!((w.word_spam(0) - 1.0 / 16.0).abs() < 1e-6);
        assert_eq!(w.linker(0), 1.0);
        assert_eq!(w.linker(15), 4.0);
        assert_eq!(w.max_spam_or_linker(), 4.0);
        // Out of range ranks clamp.
        assert_eq!(w.density(200), 1.0);
    }

    #[test]
    fn test_registry_reload() {
        let registry = WeightRegistry::default();
        let before = registry.current();
        assert_eq!(before.hash_group(HashGroup::Title), 8.0);

        let mut config = RankingConfig::default();
        config.hash_group_weights.title = 3.0;
        registry.reload(&config).unwrap();
        assert_eq!(registry.current().hash_group(HashGroup::Title), 3.0);
        // Old snapshots are untouched.
        assert_eq!(before.hash_group(HashGroup::Title), 8.0);

        config.wiki_weight = f32::NAN;
        assert!(registry.reload(&config).is_err());
        assert_eq!(registry.current().hash_group(HashGroup::Title), 3.0);
    }
}
