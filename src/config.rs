//! Ranking configuration.
//!
//! [`RankingConfig`] holds the tunable weights that shape scoring. It is
//! serializable so deployments can keep it in a JSON file, and every field
//! has a default.
//!
//! # Examples
//!
//! ```
//! use posrank::config::RankingConfig;
//!
//! let config = RankingConfig::default();
//! assert_eq!(config.hash_group_weights.title, 8.0);
//! assert_eq!(config.fixed_distance, 400);
//!
//! let custom = RankingConfig::from_json_str(r#"{"wiki_bigram_weight": 2.0}"#).unwrap();
//! assert_eq!(custom.wiki_bigram_weight, 2.0);
//! assert_eq!(custom.density_weight_min, 0.35);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};
use crate::posting::HashGroup;

/// Upper bound on the number of top slots summed per term or term pair.
pub const MAX_TOP: usize = 10;

/// Default limit on sublists grouped under one query term.
pub const DEFAULT_MAX_SUBLISTS: usize = 50;

/// Per-zone weight applied to every posting in that zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashGroupWeights {
    pub body: f32,
    pub title: f32,
    pub heading: f32,
    pub in_list: f32,
    pub in_meta_tag: f32,
    pub in_link_text: f32,
    pub in_tag: f32,
    pub neighborhood: f32,
    pub internal_link_text: f32,
    pub in_url: f32,
    pub in_menu: f32,
}

impl Default for HashGroupWeights {
    fn default() -> Self {
        Self {
            body: 1.0,
            title: 8.0,
            heading: 1.5,
            in_list: 0.3,
            in_meta_tag: 0.1,
            in_link_text: 16.0,
            in_tag: 1.0,
            neighborhood: 0.0,
            internal_link_text: 4.0,
            in_url: 1.0,
            in_menu: 0.2,
        }
    }
}

impl HashGroupWeights {
    pub fn get(&self, group: HashGroup) -> f32 {
        match group {
            HashGroup::Body => self.body,
            HashGroup::Title => self.title,
            HashGroup::Heading => self.heading,
            HashGroup::InList => self.in_list,
            HashGroup::InMetaTag => self.in_meta_tag,
            HashGroup::InLinkText => self.in_link_text,
            HashGroup::InTag => self.in_tag,
            HashGroup::Neighborhood => self.neighborhood,
            HashGroup::InternalLinkText => self.internal_link_text,
            HashGroup::InUrl => self.in_url,
            HashGroup::InMenu => self.in_menu,
        }
    }
}

/// Weights and constants used to build the scoring tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight per document zone.
    pub hash_group_weights: HashGroupWeights,
    /// Weight of the lowest diversity rank; scales quadratically to the max.
    pub diversity_weight_min: f32,
    pub diversity_weight_max: f32,
    /// Weight of the lowest density rank; scales quadratically to the max.
    pub density_weight_min: f32,
    pub density_weight_max: f32,
    /// Distance assumed for pairs that are not in the same running text.
    pub fixed_distance: i32,
    /// Multiplier for pairs from the same wiki phrase.
    pub wiki_weight: f32,
    /// Multiplier for half-stop wiki bigram occurrences.
    pub wiki_bigram_weight: f32,
    /// Site rank contribution: score *= site_rank * multiplier + 1.
    pub site_rank_multiplier: f32,
    /// Largest number of sublists one query term may group.
    pub max_sublists: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            hash_group_weights: HashGroupWeights::default(),
            diversity_weight_min: 0.15,
            diversity_weight_max: 1.0,
            density_weight_min: 0.35,
            density_weight_max: 1.0,
            fixed_distance: 400,
            wiki_weight: 0.10,
            wiki_bigram_weight: 1.40,
            site_rank_multiplier: 0.333_333_33,
            max_sublists: DEFAULT_MAX_SUBLISTS,
        }
    }
}

impl RankingConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RankingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check that every weight is usable.
    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f32| -> Result<()> {
            if !value.is_finite() || value < 0.0 {
                return Err(RankError::config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
            Ok(())
        };

        for group in HashGroup::ALL {
            check(group.name(), self.hash_group_weights.get(group))?;
        }
        check("diversity_weight_min", self.diversity_weight_min)?;
        check("diversity_weight_max", self.diversity_weight_max)?;
        check("density_weight_min", self.density_weight_min)?;
        check("density_weight_max", self.density_weight_max)?;
        check("wiki_weight", self.wiki_weight)?;
        check("wiki_bigram_weight", self.wiki_bigram_weight)?;
        check("site_rank_multiplier", self.site_rank_multiplier)?;

        if self.diversity_weight_min > self.diversity_weight_max {
            return Err(RankError::config(
                "diversity_weight_min is larger than diversity_weight_max",
            ));
        }
        if self.density_weight_min > self.density_weight_max {
            return Err(RankError::config(
                "density_weight_min is larger than density_weight_max",
            ));
        }
        if self.fixed_distance < 2 {
            return Err(RankError::config("fixed_distance must be at least 2"));
        }
        if self.max_sublists == 0 {
            return Err(RankError::config("max_sublists must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RankingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hash_group_weights.get(HashGroup::InLinkText), 16.0);
        assert_eq!(config.max_sublists, 50);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"hash_group_weights": {"title": 4.0}, "fixed_distance": 300}"#;
        let config = RankingConfig::from_json_str(json).unwrap();
        assert_eq!(config.hash_group_weights.title, 4.0);
        assert_eq!(config.hash_group_weights.body, 1.0);
        assert_eq!(config.fixed_distance, 300);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(RankingConfig::from_json_str(r#"{"wiki_weight": -1.0}"#).is_err());
        assert!(RankingConfig::from_json_str(r#"{"density_weight_min": 2.0}"#).is_err());
        assert!(RankingConfig::from_json_str(r#"{"fixed_distance": 1}"#).is_err());
        assert!(RankingConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"site_rank_multiplier": 0.5}}"#).unwrap();
        let config = RankingConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.site_rank_multiplier, 0.5);
    }
}
