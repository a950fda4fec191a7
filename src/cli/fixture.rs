//! JSON fixtures: a query with inline posting lists and the per-document
//! lookups needed to rank it.
//!
//! ```json
//! {
//!   "request": {"docs_to_get": 5},
//!   "terms": [
//!     {"text": "rust", "docs": [{"doc_id": 1, "postings": [{"word_pos": 10}]}]},
//!     {"text": "book", "docs": [{"doc_id": 1, "postings": [{"word_pos": 12}]}]}
//!   ],
//!   "missing_docs": [7],
//!   "site_flags": {"1": 3}
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RankingConfig;
use crate::error::{RankError, Result};
use crate::lookup::{DocIdSet, SiteFlagTable, TemperatureTable};
use crate::posting::key::{
    MAX_DENSITY_RANK, MAX_DIVERSITY_RANK, MAX_SITE_RANK, MAX_WORD_SPAM_RANK,
};
use crate::posting::{HashGroup, NumericValue, PostingFields, TermList, TermListBuilder};
use crate::query::{BoolExpr, FieldCode, Query, QueryTerm, TermSign};
use crate::ranking::{RankingContext, RankingRequest};

/// One positional posting. Ranks default to their best values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixturePosting {
    pub word_pos: u32,
    pub hash_group: HashGroup,
    pub density_rank: u8,
    pub diversity_rank: u8,
    pub word_spam_rank: u8,
    pub synonym: bool,
    pub half_stop_wiki_bigram: bool,
}

impl Default for FixturePosting {
    fn default() -> Self {
        Self::from(PostingFields::body(0))
    }
}

impl From<PostingFields> for FixturePosting {
    fn from(f: PostingFields) -> Self {
        Self {
            word_pos: f.word_pos,
            hash_group: f.hash_group,
            density_rank: f.density_rank,
            diversity_rank: f.diversity_rank,
            word_spam_rank: f.word_spam_rank,
            synonym: f.synonym,
            half_stop_wiki_bigram: f.half_stop_wiki_bigram,
        }
    }
}

impl From<&FixturePosting> for PostingFields {
    fn from(p: &FixturePosting) -> Self {
        PostingFields {
            word_pos: p.word_pos,
            hash_group: p.hash_group,
            density_rank: p.density_rank,
            diversity_rank: p.diversity_rank,
            word_spam_rank: p.word_spam_rank,
            synonym: p.synonym,
            half_stop_wiki_bigram: p.half_stop_wiki_bigram,
        }
    }
}

/// One document of a term's list. Positional terms use `postings`,
/// numeric field terms use `values`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDoc {
    pub doc_id: u64,
    pub site_rank: u8,
    pub lang: u8,
    /// Store the document head as a delete marker.
    pub deleted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub postings: Vec<FixturePosting>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<NumericValue>,
}

/// A query term with its inline posting list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureTerm {
    pub text: String,
    /// Defaults to the term's index plus one.
    pub term_id: Option<u64>,
    pub sign: TermSign,
    pub field: FieldCode,
    pub required: bool,
    pub piped: bool,
    pub left_phrase_term: Option<usize>,
    pub right_phrase_term: Option<usize>,
    pub wiki_half_stop_bigram: bool,
    pub synonym_of: Option<usize>,
    /// Defaults to twice the term's index.
    pub qpos: Option<i32>,
    pub wiki_phrase_id: i32,
    pub quoted_start: Option<usize>,
    pub freq_weight: f32,
    pub docs: Vec<FixtureDoc>,
}

impl Default for FixtureTerm {
    fn default() -> Self {
        Self {
            text: String::new(),
            term_id: None,
            sign: TermSign::None,
            field: FieldCode::Text,
            required: true,
            piped: false,
            left_phrase_term: None,
            right_phrase_term: None,
            wiki_half_stop_bigram: false,
            synonym_of: None,
            qpos: None,
            wiki_phrase_id: 0,
            quoted_start: None,
            freq_weight: 1.0,
            docs: Vec::new(),
        }
    }
}

impl FixtureTerm {
    /// Encode the inline documents into a termlist. Documents may be listed
    /// in any order.
    pub fn term_list(&self, term_id: u64) -> Result<TermList> {
        let mut docs: Vec<&FixtureDoc> = self.docs.iter().collect();
        docs.sort_by_key(|d| d.doc_id);

        let mut builder = TermListBuilder::new(term_id);
        for doc in docs {
            if self.field.is_numeric() {
                builder.add_numeric_doc(doc.doc_id, doc.site_rank, doc.lang, &doc.values)?;
                continue;
            }
            let mut postings: Vec<PostingFields> =
                doc.postings.iter().map(PostingFields::from).collect();
            postings.sort_by_key(|p| p.word_pos);
            if doc.deleted {
                if postings.is_empty() {
                    postings.push(PostingFields::body(0));
                }
                builder.add_deleted_doc(doc.doc_id, doc.site_rank, doc.lang, &postings)?;
            } else {
                builder.add_doc(doc.doc_id, doc.site_rank, doc.lang, &postings)?;
            }
        }
        Ok(builder.build())
    }

    fn to_query_term(&self, index: usize) -> Result<QueryTerm> {
        let term_id = self.term_id.unwrap_or(index as u64 + 1);
        let mut term = QueryTerm::new(self.text.clone(), term_id)
            .with_sign(self.sign)
            .with_field(self.field)
            .with_required(self.required)
            .with_piped(self.piped)
            .with_qpos(self.qpos.unwrap_or(2 * index as i32))
            .with_wiki_phrase_id(self.wiki_phrase_id)
            .with_freq_weight(self.freq_weight);
        term.left_phrase_term = self.left_phrase_term;
        term.right_phrase_term = self.right_phrase_term;
        term.wiki_half_stop_bigram = self.wiki_half_stop_bigram;
        term.synonym_of = self.synonym_of;
        term.quoted_start = self.quoted_start;
        if !self.docs.is_empty() {
            term = term.with_list(self.term_list(term_id)?);
        }
        Ok(term)
    }
}

/// Raw temperatures on a `min..=max` scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureTemperatures {
    pub min: u32,
    pub max: u32,
    pub default: u32,
    pub docs: BTreeMap<u64, u32>,
}

impl Default for FixtureTemperatures {
    fn default() -> Self {
        Self {
            min: 0,
            max: 10,
            default: 5,
            docs: BTreeMap::new(),
        }
    }
}

/// A complete ranking input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<RankingConfig>,
    pub request: RankingRequest,
    pub terms: Vec<FixtureTerm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<BoolExpr>,
    /// Documents that have left the index since the lists were read.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_docs: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub site_flags: BTreeMap<u64, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperatures: Option<FixtureTemperatures>,
}

impl Fixture {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(json)?;
        if fixture.terms.is_empty() {
            return Err(RankError::query("fixture has no terms"));
        }
        Ok(fixture)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        debug!(
            "read {} byte fixture from {}",
            content.len(),
            path.as_ref().display()
        );
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Build the query, encoding every term's inline documents.
    pub fn query(&self) -> Result<Query> {
        let terms = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| t.to_query_term(i))
            .collect::<Result<Vec<_>>>()?;
        let query = match &self.expression {
            Some(expr) => Query::boolean(terms, expr.clone()),
            None => Query::new(terms),
        };
        query.validate()?;
        Ok(query)
    }

    /// The fixture's config, or the defaults.
    pub fn ranking_config(&self) -> RankingConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Every document id mentioned by any term.
    pub fn doc_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.terms
            .iter()
            .flat_map(|t| t.docs.iter().map(|d| d.doc_id))
    }

    pub fn lookups(&self) -> FixtureLookups {
        let mut index = DocIdSet::new(self.doc_ids());
        for &doc_id in &self.missing_docs {
            index.remove(doc_id);
        }

        let mut site_flags = SiteFlagTable::new();
        for (&doc_id, &flags) in &self.site_flags {
            site_flags.insert(doc_id, flags);
        }

        let temperature = self.temperatures.as_ref().map(|t| {
            let mut table = TemperatureTable::new(t.min, t.max, t.default);
            for (&doc_id, &temp) in &t.docs {
                table.insert(doc_id, temp);
            }
            table
        });

        FixtureLookups {
            index,
            whitelist: self.whitelist.as_ref().map(|ids| DocIdSet::new(ids.iter().copied())),
            site_flags,
            temperature,
        }
    }
}

/// Owned lookup tables of a fixture.
#[derive(Debug, Clone)]
pub struct FixtureLookups {
    pub index: DocIdSet,
    pub whitelist: Option<DocIdSet>,
    pub site_flags: SiteFlagTable,
    pub temperature: Option<TemperatureTable>,
}

impl FixtureLookups {
    pub fn context(&self) -> RankingContext<'_> {
        let mut ctx = RankingContext::new(&self.index).with_site_flags(&self.site_flags);
        if let Some(whitelist) = &self.whitelist {
            ctx = ctx.with_whitelist(whitelist);
        }
        if let Some(temperature) = &self.temperature {
            ctx = ctx.with_temperature(temperature);
        }
        ctx
    }
}

/// Shape of a generated fixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateParams {
    pub docs: usize,
    pub terms: usize,
    /// Probability that a document contains a given term.
    pub density: f64,
    pub max_postings: usize,
    /// Word positions are drawn from `0..doc_length`.
    pub doc_length: u32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            docs: 1000,
            terms: 3,
            density: 0.3,
            max_postings: 8,
            doc_length: 2000,
        }
    }
}

const NON_BODY_GROUPS: [HashGroup; 6] = [
    HashGroup::Title,
    HashGroup::Heading,
    HashGroup::InLinkText,
    HashGroup::InUrl,
    HashGroup::InMenu,
    HashGroup::InMetaTag,
];

/// A random non-boolean fixture. Document ids run from 1 to `params.docs`.
pub fn random_fixture<R: Rng>(params: &GenerateParams, rng: &mut R) -> Fixture {
    let density = params.density.clamp(0.0, 1.0);
    let max_postings = params.max_postings.max(1);
    let doc_length = params.doc_length.max(1);

    let mut site_ranks = Vec::with_capacity(params.docs);
    let mut langs = Vec::with_capacity(params.docs);
    for _ in 0..params.docs {
        site_ranks.push(rng.random_range(0..=MAX_SITE_RANK));
        langs.push(rng.random_range(0..=3u8));
    }

    let mut terms = Vec::with_capacity(params.terms);
    for t in 0..params.terms {
        let mut docs = Vec::new();
        for d in 0..params.docs {
            if !rng.random_bool(density) {
                continue;
            }
            let count = rng.random_range(1..=max_postings);
            let mut postings: Vec<FixturePosting> = (0..count)
                .map(|_| {
                    let hash_group = if rng.random_bool(0.8) {
                        HashGroup::Body
                    } else {
                        NON_BODY_GROUPS[rng.random_range(0..NON_BODY_GROUPS.len())]
                    };
                    FixturePosting {
                        word_pos: rng.random_range(0..doc_length),
                        hash_group,
                        density_rank: rng.random_range(0..=MAX_DENSITY_RANK),
                        diversity_rank: rng.random_range(0..=MAX_DIVERSITY_RANK),
                        word_spam_rank: rng.random_range(0..=MAX_WORD_SPAM_RANK),
                        synonym: false,
                        half_stop_wiki_bigram: false,
                    }
                })
                .collect();
            postings.sort_by_key(|p| p.word_pos);
            postings.dedup_by_key(|p| p.word_pos);
            docs.push(FixtureDoc {
                doc_id: d as u64 + 1,
                site_rank: site_ranks[d],
                lang: langs[d],
                postings,
                ..FixtureDoc::default()
            });
        }
        terms.push(FixtureTerm {
            text: format!("term{t}"),
            docs,
            ..FixtureTerm::default()
        });
    }

    Fixture {
        terms,
        ..Fixture::default()
    }
}
