//! The parsed query handed to the ranking core.
//!
//! Query parsing happens elsewhere; this module only models its output:
//! the terms with their resolved termlists, the phrase and synonym relations
//! between them and, for boolean queries, the expression to satisfy.

pub mod boolean;
pub mod term;

pub use boolean::BoolExpr;
pub use term::{FieldCode, QueryTerm, RangeFilter, TermSign};

use crate::error::{RankError, Result};

/// A parsed query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub terms: Vec<QueryTerm>,
    /// Set for boolean queries.
    pub expression: Option<BoolExpr>,
}

impl Query {
    pub fn new(terms: Vec<QueryTerm>) -> Self {
        Self {
            terms,
            expression: None,
        }
    }

    /// A boolean query over `terms`.
    pub fn boolean(terms: Vec<QueryTerm>, expression: BoolExpr) -> Self {
        Self {
            terms,
            expression: Some(expression),
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.expression.is_some()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Check that every term relation points inside the query.
    pub fn validate(&self) -> Result<()> {
        let n = self.terms.len();
        let check = |what: &str, from: usize, to: Option<usize>| -> Result<()> {
            match to {
                Some(idx) if idx >= n || idx == from => Err(RankError::query(format!(
                    "term {from} has {what} {idx} outside the query"
                ))),
                _ => Ok(()),
            }
        };
        for (i, term) in self.terms.iter().enumerate() {
            check("left bigram", i, term.left_phrase_term)?;
            check("right bigram", i, term.right_phrase_term)?;
            check("synonym base", i, term.synonym_of)?;
            if let Some(start) = term.quoted_start {
                if start >= n {
                    return Err(RankError::query(format!(
                        "term {i} has quoted phrase start {start} outside the query"
                    )));
                }
            }
            if !term.freq_weight.is_finite() || term.freq_weight < 0.0 {
                return Err(RankError::query(format!(
                    "term {i} has invalid frequency weight {}",
                    term.freq_weight
                )));
            }
        }
        if let Some(expr) = &self.expression {
            expr.validate(n)?;
        }
        Ok(())
    }
}
