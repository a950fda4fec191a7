//! Boolean expressions over query terms.

use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};

/// A boolean expression whose leaves are query term indices.
///
/// Serialized externally tagged, e.g.
/// `{"and": [{"term": 0}, {"not": {"term": 2}}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolExpr {
    Term(usize),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
    Not(Box<BoolExpr>),
}

impl BoolExpr {
    pub fn term(index: usize) -> Self {
        BoolExpr::Term(index)
    }

    pub fn and(children: Vec<BoolExpr>) -> Self {
        BoolExpr::And(children)
    }

    pub fn or(children: Vec<BoolExpr>) -> Self {
        BoolExpr::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: BoolExpr) -> Self {
        BoolExpr::Not(Box::new(child))
    }

    /// Evaluate with `is_set` telling whether a query term matched.
    pub fn matches<F>(&self, is_set: &F) -> bool
    where
        F: Fn(usize) -> bool,
    {
        match self {
            BoolExpr::Term(idx) => is_set(*idx),
            BoolExpr::And(children) => children.iter().all(|c| c.matches(is_set)),
            BoolExpr::Or(children) => children.iter().any(|c| c.matches(is_set)),
            BoolExpr::Not(child) => !child.matches(is_set),
        }
    }

    /// Check every leaf refers to one of `num_terms` terms.
    pub fn validate(&self, num_terms: usize) -> Result<()> {
        match self {
            BoolExpr::Term(idx) if *idx >= num_terms => Err(RankError::query(format!(
                "boolean expression references term {idx} but the query has {num_terms} terms"
            ))),
            BoolExpr::Term(_) => Ok(()),
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                if children.is_empty() {
                    return Err(RankError::query("empty boolean operator"));
                }
                children.iter().try_for_each(|c| c.validate(num_terms))
            }
            BoolExpr::Not(child) => child.validate(num_terms),
        }
    }

    /// Indices of all leaves, in expression order.
    pub fn terms(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms(&self, out: &mut Vec<usize>) {
        match self {
            BoolExpr::Term(idx) => out.push(*idx),
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                children.iter().for_each(|c| c.collect_terms(out))
            }
            BoolExpr::Not(child) => child.collect_terms(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        // (0 AND 1) OR (2 AND NOT 3)
        let expr = BoolExpr::or(vec![
            BoolExpr::and(vec![BoolExpr::term(0), BoolExpr::term(1)]),
            BoolExpr::and(vec![BoolExpr::term(2), BoolExpr::not(BoolExpr::term(3))]),
        ]);
        let eval = |set: &[usize]| expr.matches(&|i| set.contains(&i));
        assert!(eval(&[0, 1]));
        assert!(eval(&[2]));
        assert!(!eval(&[2, 3]));
        assert!(!eval(&[0, 3]));
        assert_eq!(expr.terms(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_validate() {
        assert!(BoolExpr::term(2).validate(3).is_ok());
        assert!(BoolExpr::term(3).validate(3).is_err());
        assert!(BoolExpr::and(vec![]).validate(3).is_err());
    }

    #[test]
    fn test_serde_shape() {
        let expr: BoolExpr =
            serde_json::from_str(r#"{"and": [{"term": 0}, {"not": {"term": 1}}]}"#).unwrap();
        assert_eq!(
            expr,
            BoolExpr::and(vec![BoolExpr::term(0), BoolExpr::not(BoolExpr::term(1))])
        );
    }
}
