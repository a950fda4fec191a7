//! Building termlists from logical postings.
//!
//! The index side normally produces these bytes; the builder exists for
//! fixtures, tests and benchmarks.
//!
//! # Examples
//!
//! ```
//! use posrank::posting::{PostingFields, TermListBuilder};
//!
//! let mut builder = TermListBuilder::new(1);
//! builder.add_doc(10, 3, 1, &[PostingFields::body(4)]).unwrap();
//! builder.add_doc(20, 0, 0, &[PostingFields::body(8), PostingFields::body(9)]).unwrap();
//! let list = builder.build();
//! assert_eq!(list.len(), 18 + 12 + 6);
//! ```

use crate::error::{RankError, Result};
use crate::posting::key::{
    DocHeader, MAX_DOC_ID, NumericValue, PostingFields, Ranks, RecordWidth, write_record,
};
use crate::posting::list::TermList;

/// Accumulates documents in increasing document id order.
#[derive(Debug, Clone)]
pub struct TermListBuilder {
    term_id: u64,
    bytes: Vec<u8>,
    last_doc: Option<u64>,
}

impl TermListBuilder {
    pub fn new(term_id: u64) -> Self {
        Self {
            term_id,
            bytes: Vec::new(),
            last_doc: None,
        }
    }

    fn check_order(&mut self, doc_id: u64) -> Result<()> {
        if doc_id > MAX_DOC_ID {
            return Err(RankError::other(format!(
                "document id {doc_id} exceeds {MAX_DOC_ID}"
            )));
        }
        if let Some(last) = self.last_doc {
            if doc_id <= last {
                return Err(RankError::other(format!(
                    "document {doc_id} added after {last}"
                )));
            }
        }
        self.last_doc = Some(doc_id);
        Ok(())
    }

    fn head_width(&self) -> RecordWidth {
        if self.bytes.is_empty() {
            RecordWidth::ListHead
        } else {
            RecordWidth::DocHead
        }
    }

    /// Add one document with its positional postings. Postings are stored in
    /// the order given, which should be increasing word position.
    pub fn add_doc(
        &mut self,
        doc_id: u64,
        site_rank: u8,
        lang_id: u8,
        postings: &[PostingFields],
    ) -> Result<&mut Self> {
        self.add_doc_with_marker(doc_id, site_rank, lang_id, postings, false)
    }

    /// Like [`add_doc`](Self::add_doc) but stores the document head as a
    /// delete marker.
    pub fn add_deleted_doc(
        &mut self,
        doc_id: u64,
        site_rank: u8,
        lang_id: u8,
        postings: &[PostingFields],
    ) -> Result<&mut Self> {
        self.add_doc_with_marker(doc_id, site_rank, lang_id, postings, true)
    }

    fn add_doc_with_marker(
        &mut self,
        doc_id: u64,
        site_rank: u8,
        lang_id: u8,
        postings: &[PostingFields],
        delete_marker: bool,
    ) -> Result<&mut Self> {
        if postings.is_empty() {
            return Err(RankError::other(format!(
                "document {doc_id} has no postings"
            )));
        }
        self.check_order(doc_id)?;
        let header = DocHeader::new(doc_id, site_rank, lang_id);
        for (i, fields) in postings.iter().enumerate() {
            let width = if i == 0 {
                self.head_width()
            } else {
                RecordWidth::Continuation
            };
            write_record(
                &mut self.bytes,
                width,
                Ranks::from(fields),
                fields.payload(),
                header,
                self.term_id,
                delete_marker && i == 0,
            );
        }
        Ok(self)
    }

    /// Add one document of a numeric field list.
    pub fn add_numeric_doc(
        &mut self,
        doc_id: u64,
        site_rank: u8,
        lang_id: u8,
        values: &[NumericValue],
    ) -> Result<&mut Self> {
        if values.is_empty() {
            return Err(RankError::other(format!("document {doc_id} has no values")));
        }
        self.check_order(doc_id)?;
        let header = DocHeader::new(doc_id, site_rank, lang_id);
        let ranks = Ranks {
            density: 0,
            diversity: 0,
            word_spam: 0,
        };
        for (i, value) in values.iter().enumerate() {
            let width = if i == 0 {
                self.head_width()
            } else {
                RecordWidth::Continuation
            };
            write_record(
                &mut self.bytes,
                width,
                ranks,
                value.payload(),
                header,
                self.term_id,
                false,
            );
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn build(self) -> TermList {
        TermList::from_bytes(self.bytes)
    }
}
