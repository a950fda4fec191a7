//! Parsed query terms as handed over by the query parser.

use serde::{Deserialize, Serialize};

use crate::posting::{PostingKey, TermList};

/// Explicit sign written in front of a term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermSign {
    #[default]
    None,
    /// `+term`
    Plus,
    /// `-term`, documents containing it are excluded.
    Minus,
}

/// Field operator attached to a term.
///
/// Everything except [`FieldCode::Text`] refers to a numeric field list whose
/// postings carry a value instead of a word position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCode {
    #[default]
    Text,
    SortByFloat,
    RevSortByFloat,
    SortByInt,
    RevSortByInt,
    NumberMin(f32),
    NumberMax(f32),
    NumberEqualFloat(f32),
    NumberMinInt(i32),
    NumberMaxInt(i32),
    NumberEqualInt(i32),
}

impl FieldCode {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldCode::Text)
    }

    pub fn is_sort_by_float(&self) -> bool {
        matches!(self, FieldCode::SortByFloat | FieldCode::RevSortByFloat)
    }

    pub fn is_sort_by_int(&self) -> bool {
        matches!(self, FieldCode::SortByInt | FieldCode::RevSortByInt)
    }

    pub fn is_reverse_sort(&self) -> bool {
        matches!(self, FieldCode::RevSortByFloat | FieldCode::RevSortByInt)
    }

    /// The value filter of a range term.
    pub fn range(&self) -> Option<RangeFilter> {
        match *self {
            FieldCode::NumberMin(v) => Some(RangeFilter::MinFloat(v)),
            FieldCode::NumberMax(v) => Some(RangeFilter::MaxFloat(v)),
            FieldCode::NumberEqualFloat(v) => Some(RangeFilter::EqualFloat(v)),
            FieldCode::NumberMinInt(v) => Some(RangeFilter::MinInt(v)),
            FieldCode::NumberMaxInt(v) => Some(RangeFilter::MaxInt(v)),
            FieldCode::NumberEqualInt(v) => Some(RangeFilter::EqualInt(v)),
            _ => None,
        }
    }
}

/// Value constraint a numeric posting must satisfy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeFilter {
    MinFloat(f32),
    MaxFloat(f32),
    EqualFloat(f32),
    MinInt(i32),
    MaxInt(i32),
    EqualInt(i32),
}

fn almost_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= f32::EPSILON * a.abs().max(b.abs()).max(1.0)
}

impl RangeFilter {
    pub fn accepts(&self, key: PostingKey<'_>) -> bool {
        match *self {
            RangeFilter::MinFloat(min) => key.float_value() >= min,
            RangeFilter::MaxFloat(max) => key.float_value() <= max,
            RangeFilter::EqualFloat(v) => almost_equal(key.float_value(), v),
            RangeFilter::MinInt(min) => key.int_value() >= min,
            RangeFilter::MaxInt(max) => key.int_value() <= max,
            RangeFilter::EqualInt(v) => key.int_value() == v,
        }
    }

    /// Whether any posting in `keys` passes the filter.
    pub fn accepts_any<'a, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = PostingKey<'a>>,
    {
        keys.into_iter().any(|key| self.accepts(key))
    }
}

/// One term of a parsed query together with its resolved termlist.
///
/// Phrase and synonym relations are indices into the query's term vector.
#[derive(Debug, Clone)]
pub struct QueryTerm {
    pub text: String,
    pub term_id: u64,
    /// Postings for the term, `None` when the term has no list.
    pub list: Option<TermList>,
    pub sign: TermSign,
    /// Whether the term has to be matched. Bigram and synonym terms are
    /// usually not required themselves.
    pub required: bool,
    pub field: FieldCode,
    /// Piped terms (`a|b`) match but do not take part in proximity scoring.
    pub piped: bool,
    /// Bigram formed with the previous word.
    pub left_phrase_term: Option<usize>,
    /// Bigram formed with the next word.
    pub right_phrase_term: Option<usize>,
    /// Set on a bigram term that is a wiki phrase containing a stop word.
    pub wiki_half_stop_bigram: bool,
    /// Base term this one is a synonym (or alternate form) of.
    pub synonym_of: Option<usize>,
    /// Word position inside the query.
    pub qpos: i32,
    /// Non-zero when the word belongs to a wiki phrase; terms of the same
    /// phrase share the id.
    pub wiki_phrase_id: i32,
    /// First term of the quoted phrase this term is in.
    pub quoted_start: Option<usize>,
    /// Inverse-frequency weight of the term.
    pub freq_weight: f32,
}

impl QueryTerm {
    /// A plain required term.
    pub fn new<S: Into<String>>(text: S, term_id: u64) -> Self {
        Self {
            text: text.into(),
            term_id,
            list: None,
            sign: TermSign::None,
            required: true,
            field: FieldCode::Text,
            piped: false,
            left_phrase_term: None,
            right_phrase_term: None,
            wiki_half_stop_bigram: false,
            synonym_of: None,
            qpos: 0,
            wiki_phrase_id: 0,
            quoted_start: None,
            freq_weight: 1.0,
        }
    }

    pub fn with_list(mut self, list: TermList) -> Self {
        self.list = Some(list);
        self
    }

    pub fn with_qpos(mut self, qpos: i32) -> Self {
        self.qpos = qpos;
        self
    }

    pub fn with_sign(mut self, sign: TermSign) -> Self {
        self.sign = sign;
        self
    }

    pub fn with_field(mut self, field: FieldCode) -> Self {
        self.field = field;
        self
    }

    pub fn with_freq_weight(mut self, weight: f32) -> Self {
        self.freq_weight = weight;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_piped(mut self, piped: bool) -> Self {
        self.piped = piped;
        self
    }

    pub fn with_wiki_phrase_id(mut self, id: i32) -> Self {
        self.wiki_phrase_id = id;
        self
    }

    pub fn with_quoted_start(mut self, start: usize) -> Self {
        self.quoted_start = Some(start);
        self
    }

    /// Mark as a synonym of `base`; synonyms are not required by themselves.
    pub fn as_synonym_of(mut self, base: usize) -> Self {
        self.synonym_of = Some(base);
        self.required = false;
        self
    }

    /// Mark as a bigram term; bigrams are not required by themselves.
    pub fn as_bigram(mut self, wiki_half_stop: bool) -> Self {
        self.wiki_half_stop_bigram = wiki_half_stop;
        self.required = false;
        self
    }

    pub fn is_negative(&self) -> bool {
        self.sign == TermSign::Minus
    }

    /// Size of the term's list in bytes.
    pub fn list_size(&self) -> usize {
        self.list.as_ref().map_or(0, TermList::len)
    }

    pub fn has_postings(&self) -> bool {
        self.list_size() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{NumericValue, TermListBuilder, WorkingList};

    #[test]
    fn test_field_code_classes() {
        assert!(!FieldCode::Text.is_numeric());
        assert!(FieldCode::SortByInt.is_numeric());
        assert!(FieldCode::RevSortByFloat.is_sort_by_float());
        assert!(FieldCode::RevSortByFloat.is_reverse_sort());
        assert!(FieldCode::SortByFloat.range().is_none());
        assert_eq!(FieldCode::NumberMin(2.0).range(), Some(RangeFilter::MinFloat(2.0)));
    }

    #[test]
    fn test_range_filter() {
        let mut builder = TermListBuilder::new(1);
        builder
            .add_numeric_doc(1, 0, 0, &[NumericValue::Float(3.5), NumericValue::Float(9.0)])
            .unwrap();
        builder.add_numeric_doc(2, 0, 0, &[NumericValue::Int(40)]).unwrap();
        let working = WorkingList::from_term_list(&builder.build()).unwrap();
        let blocks: Vec<_> = working.blocks().collect();

        assert!(RangeFilter::MinFloat(5.0).accepts_any(blocks[0].keys()));
        assert!(!RangeFilter::MinFloat(10.0).accepts_any(blocks[0].keys()));
        assert!(RangeFilter::MaxFloat(3.5).accepts_any(blocks[0].keys()));
        assert!(RangeFilter::EqualFloat(9.0).accepts_any(blocks[0].keys()));
        assert!(RangeFilter::EqualInt(40).accepts_any(blocks[1].keys()));
        assert!(!RangeFilter::MaxInt(39).accepts_any(blocks[1].keys()));
    }

    #[test]
    fn test_builder_helpers() {
        let term = QueryTerm::new("cats", 7).as_synonym_of(0).with_qpos(3);
        assert!(!term.required);
        assert_eq!(term.synonym_of, Some(0));
        assert_eq!(term.qpos, 3);
        assert_eq!(term.list_size(), 0);
        let neg = QueryTerm::new("dogs", 8).with_sign(TermSign::Minus);
        assert!(neg.is_negative());
    }
}
