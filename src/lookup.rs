//! Per-document lookups the ranking core consults.
//!
//! Each lookup is a trait so callers can back it with whatever index they
//! have; the table types here are simple in-memory implementations.

use std::fmt::Debug;

use ahash::{AHashMap, AHashSet};

/// Whether a document is still present in the index.
pub trait DocumentIndex: Debug {
    fn exists(&self, doc_id: u64) -> bool;
}

/// Restricts results to documents from whitelisted sites.
pub trait SiteWhitelist: Debug {
    fn is_in_whitelist(&self, doc_id: u64) -> bool;
}

/// Popularity multiplier of a document, scaled into `[weight_min, weight_max]`.
pub trait PageTemperature: Debug {
    fn temperature(&self, doc_id: u64, weight_min: f32, weight_max: f32) -> f32;
}

/// Site flag bits of a document. Each set bit selects a score multiplier.
pub trait SiteFlags: Debug {
    fn flags(&self, doc_id: u64) -> u32;
}

/// Every document exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllDocuments;

impl DocumentIndex for AllDocuments {
    fn exists(&self, _doc_id: u64) -> bool {
        true
    }
}

/// A plain set of document ids.
#[derive(Debug, Clone, Default)]
pub struct DocIdSet {
    ids: AHashSet<u64>,
}

impl DocIdSet {
    pub fn new<I: IntoIterator<Item = u64>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, doc_id: u64) {
        self.ids.insert(doc_id);
    }

    pub fn remove(&mut self, doc_id: u64) {
        self.ids.remove(&doc_id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl DocumentIndex for DocIdSet {
    fn exists(&self, doc_id: u64) -> bool {
        self.ids.contains(&doc_id)
    }
}

impl SiteWhitelist for DocIdSet {
    fn is_in_whitelist(&self, doc_id: u64) -> bool {
        self.ids.contains(&doc_id)
    }
}

/// Raw temperatures per document on a `min..=max` scale.
#[derive(Debug, Clone)]
pub struct TemperatureTable {
    temperatures: AHashMap<u64, u32>,
    min_temperature: u32,
    max_temperature: u32,
    default_temperature: u32,
}

impl Default for TemperatureTable {
    fn default() -> Self {
        Self {
            temperatures: AHashMap::new(),
            min_temperature: 0,
            max_temperature: 10,
            default_temperature: 5,
        }
    }
}

impl TemperatureTable {
    pub fn new(min_temperature: u32, max_temperature: u32, default_temperature: u32) -> Self {
        let max_temperature = max_temperature.max(min_temperature);
        Self {
            temperatures: AHashMap::new(),
            min_temperature,
            max_temperature,
            default_temperature: default_temperature.clamp(min_temperature, max_temperature),
        }
    }

    pub fn insert(&mut self, doc_id: u64, temperature: u32) {
        self.temperatures.insert(
            doc_id,
            temperature.clamp(self.min_temperature, self.max_temperature),
        );
    }
}

impl PageTemperature for TemperatureTable {
    fn temperature(&self, doc_id: u64, weight_min: f32, weight_max: f32) -> f32 {
        let raw = self
            .temperatures
            .get(&doc_id)
            .copied()
            .unwrap_or(self.default_temperature);
        let range = self.max_temperature - self.min_temperature;
        if range == 0 {
            return weight_max;
        }
        let scaled = (raw - self.min_temperature) as f32 / range as f32;
        weight_min + scaled * (weight_max - weight_min)
    }
}

/// Site flags per document; missing documents have no flags.
#[derive(Debug, Clone, Default)]
pub struct SiteFlagTable {
    flags: AHashMap<u64, u32>,
}

impl SiteFlagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: u64, flags: u32) {
        self.flags.insert(doc_id, flags);
    }
}

impl SiteFlags for SiteFlagTable {
    fn flags(&self, doc_id: u64) -> u32 {
        self.flags.get(&doc_id).copied().unwrap_or(0)
    }
}
