//! Per-query ranking knobs.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::MAX_TOP;
use crate::error::{RankError, Result};

/// Number of site flag bits that carry a score multiplier.
pub const NUM_SITE_FLAGS: usize = 26;

/// Language id meaning "unknown" in postings and "any" in requests.
pub const LANG_UNKNOWN: u8 = 0;

/// Options of one ranking evaluation.
///
/// Every field has a default, so a request can be deserialized from a
/// partial JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingRequest {
    /// Number of results the caller asked for.
    pub docs_to_get: usize,
    /// Run the explain pass after scoring.
    pub get_doc_id_scoring_info: bool,
    /// Skip documents whose score bound cannot reach the top-K.
    pub do_max_score_algo: bool,
    /// Query language, [`LANG_UNKNOWN`] for none.
    pub language: u8,
    pub same_lang_weight: f32,
    pub unknown_lang_weight: f32,
    /// Applied per side to synonym postings.
    pub synonym_weight: f32,
    /// Top slots summed per term and per term pair, capped at [`MAX_TOP`].
    pub real_max_top: usize,
    pub use_page_temperature: bool,
    pub page_temperature_weight_min: f32,
    pub page_temperature_weight_max: f32,
    /// Multiplier per site flag bit.
    pub flag_score_multipliers: Vec<f32>,
    /// Paging cursor: only results ranking after (`max_serp_score`,
    /// `min_serp_doc_id`) are kept.
    pub max_serp_score: Option<f64>,
    pub min_serp_doc_id: Option<u64>,
    /// Restricts the explain pass to documents in this range.
    pub doc_id_range: Option<Range<u64>>,
    /// Log per document score breakdowns.
    pub debug: bool,
}

impl Default for RankingRequest {
    fn default() -> Self {
        Self {
            docs_to_get: 10,
            get_doc_id_scoring_info: false,
            do_max_score_algo: true,
            language: LANG_UNKNOWN,
            same_lang_weight: 20.0,
            unknown_lang_weight: 10.0,
            synonym_weight: 0.90,
            real_max_top: MAX_TOP,
            use_page_temperature: false,
            page_temperature_weight_min: 1.0,
            page_temperature_weight_max: 1.0,
            flag_score_multipliers: vec![1.0; NUM_SITE_FLAGS],
            max_serp_score: None,
            min_serp_doc_id: None,
            doc_id_range: None,
            debug: false,
        }
    }
}

impl RankingRequest {
    pub fn new(docs_to_get: usize) -> Self {
        Self {
            docs_to_get,
            ..Self::default()
        }
    }

    pub fn with_scoring_info(mut self, on: bool) -> Self {
        self.get_doc_id_scoring_info = on;
        self
    }

    pub fn with_max_score_algo(mut self, on: bool) -> Self {
        self.do_max_score_algo = on;
        self
    }

    pub fn with_language(mut self, language: u8) -> Self {
        self.language = language;
        self
    }

    /// Slot count actually used, always within `1..=MAX_TOP`.
    pub fn max_top(&self) -> usize {
        self.real_max_top.clamp(1, MAX_TOP)
    }

    /// Multiplier of the given site flag bit.
    pub fn flag_multiplier(&self, bit: usize) -> f32 {
        self.flag_score_multipliers.get(bit).copied().unwrap_or(1.0)
    }

    /// Product of the multipliers of every bit set in `flags`.
    pub fn flags_multiplier(&self, flags: u32) -> f32 {
        (0..NUM_SITE_FLAGS)
            .filter(|bit| flags & (1 << bit) != 0)
            .map(|bit| self.flag_multiplier(bit))
            .product()
    }

    /// Language multiplier of a document written in `doc_lang`.
    pub fn language_weight(&self, doc_lang: u8) -> f32 {
        if self.language == LANG_UNKNOWN {
            1.0
        } else if doc_lang == self.language {
            self.same_lang_weight
        } else if doc_lang == LANG_UNKNOWN {
            self.unknown_lang_weight
        } else {
            1.0
        }
    }

    pub fn has_serp_cursor(&self) -> bool {
        self.min_serp_doc_id.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f32| -> Result<()> {
            if !value.is_finite() || value < 0.0 {
                return Err(RankError::query(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
            Ok(())
        };
        check("same_lang_weight", self.same_lang_weight)?;
        check("unknown_lang_weight", self.unknown_lang_weight)?;
        check("synonym_weight", self.synonym_weight)?;
        check(
            "page_temperature_weight_min",
            self.page_temperature_weight_min,
        )?;
        check(
            "page_temperature_weight_max",
            self.page_temperature_weight_max,
        )?;
        for (bit, m) in self.flag_score_multipliers.iter().enumerate() {
            check(&format!("flag_score_multipliers[{bit}]"), *m)?;
        }
        if self.flag_score_multipliers.len() > NUM_SITE_FLAGS {
            return Err(RankError::query(format!(
                "at most {NUM_SITE_FLAGS} flag multipliers are supported"
            )));
        }
        if self.max_serp_score.is_some() != self.min_serp_doc_id.is_some() {
            return Err(RankError::query(
                "max_serp_score and min_serp_doc_id must be given together",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let req = RankingRequest::default();
        assert!(req.do_max_score_algo);
        assert_eq!(req.max_top(), MAX_TOP);
        assert_eq!(req.flags_multiplier(0), 1.0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_max_top_is_capped() {
        let mut req = RankingRequest::default();
        req.real_max_top = 40;
        assert_eq!(req.max_top(), MAX_TOP);
        req.real_max_top = 0;
        assert_eq!(req.max_top(), 1);
    }

    #[test]
    fn test_flags_multiplier() {
        let mut req = RankingRequest::default();
        req.flag_score_multipliers[1] = 0.5;
        req.flag_score_multipliers[3] = 4.0;
        assert_eq!(req.flags_multiplier(0b1010), 2.0);
        assert_eq!(req.flags_multiplier(0b0001), 1.0);
    }

    #[test]
    fn test_language_weight() {
        let req = RankingRequest::default().with_language(2);
        assert_eq!(req.language_weight(2), 20.0);
        assert_eq!(req.language_weight(LANG_UNKNOWN), 10.0);
        assert_eq!(req.language_weight(5), 1.0);
        assert_eq!(RankingRequest::default().language_weight(2), 1.0);
    }

    #[test]
    fn test_partial_json() {
        let req: RankingRequest =
            serde_json::from_str(r#"{"docs_to_get": 3, "language": 2}"#).unwrap();
        assert_eq!(req.docs_to_get, 3);
        assert_eq!(req.language, 2);
        assert_eq!(req.synonym_weight, 0.90);
    }

    #[test]
    fn test_serp_cursor_needs_both_fields() {
        let mut req = RankingRequest::default();
        req.max_serp_score = Some(3.0);
        assert!(req.validate().is_err());
        req.min_serp_doc_id = Some(9);
        assert!(req.validate().is_ok());
        assert!(req.has_serp_cursor());
    }
}
