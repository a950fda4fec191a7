//! Top-K result retention.
//!
//! The ranking driver only talks to the [`TopTree`] trait; [`BoundedTopTree`]
//! is the in-process implementation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// One retained result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopNode {
    pub doc_id: u64,
    pub score: f32,
    /// Used instead of `score` when the tree is in integer mode.
    pub int_score: i32,
    /// Site flags of the document.
    pub flags: u32,
}

impl TopNode {
    pub fn new(doc_id: u64, score: f32) -> Self {
        Self {
            doc_id,
            score,
            int_score: 0,
            flags: 0,
        }
    }

    pub fn with_int_score(doc_id: u64, int_score: i32) -> Self {
        Self {
            doc_id,
            score: 0.0,
            int_score,
            flags: 0,
        }
    }
}

/// Contract of the top-K structure.
pub trait TopTree: Debug {
    /// Number of results the caller wants.
    fn docs_wanted(&self) -> usize;

    fn num_used_nodes(&self) -> usize;

    fn use_int_scores(&self) -> bool;

    fn set_use_int_scores(&mut self, on: bool);

    /// Insert a result. Returns false when the tree is full and the node does
    /// not beat the lowest retained one.
    fn add_node(&mut self, node: TopNode) -> bool;

    /// Lowest retained float score once the tree is full.
    fn lowest_score(&self) -> Option<f32>;

    fn contains_doc_id(&self, doc_id: u64) -> bool;

    /// Retained nodes from the highest score to the lowest.
    fn nodes(&self) -> Vec<TopNode>;
}

/// Heap entry ordered so the worst retained node sits on top.
#[derive(Debug, Clone, Copy)]
struct HeapNode {
    node: TopNode,
    by_int: bool,
}

impl HeapNode {
    /// Natural ranking order: higher scores first, lower doc ids first on
    /// ties.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        let by_score = if self.by_int {
            self.node.int_score.cmp(&other.node.int_score)
        } else {
            self.node
                .score
                .partial_cmp(&other.node.score)
                .unwrap_or(Ordering::Equal)
        };
        by_score.then_with(|| other.node.doc_id.cmp(&self.node.doc_id))
    }
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: the worst ranked node comes first
        other.rank_cmp(self)
    }
}

/// A top-K tree backed by a min-heap.
///
/// A full tree only admits nodes whose score is strictly above the lowest
/// retained score.
#[derive(Debug)]
pub struct BoundedTopTree {
    docs_wanted: usize,
    use_int_scores: bool,
    heap: BinaryHeap<HeapNode>,
    doc_ids: AHashSet<u64>,
}

impl BoundedTopTree {
    pub fn new(docs_wanted: usize) -> Self {
        Self {
            docs_wanted,
            use_int_scores: false,
            heap: BinaryHeap::with_capacity(docs_wanted + 1),
            doc_ids: AHashSet::with_capacity(docs_wanted + 1),
        }
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.docs_wanted
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.doc_ids.clear();
    }

    fn beats(&self, node: &TopNode, worst: &TopNode) -> bool {
        if self.use_int_scores {
            node.int_score > worst.int_score
        } else {
            node.score > worst.score
        }
    }
}

impl TopTree for BoundedTopTree {
    fn docs_wanted(&self) -> usize {
        self.docs_wanted
    }

    fn num_used_nodes(&self) -> usize {
        self.heap.len()
    }

    fn use_int_scores(&self) -> bool {
        self.use_int_scores
    }

    fn set_use_int_scores(&mut self, on: bool) {
        if self.use_int_scores == on {
            return;
        }
        self.use_int_scores = on;
        let nodes: Vec<HeapNode> = self
            .heap
            .drain()
            .map(|h| HeapNode {
                node: h.node,
                by_int: on,
            })
            .collect();
        self.heap.extend(nodes);
    }

    fn add_node(&mut self, node: TopNode) -> bool {
        if self.docs_wanted == 0 || self.doc_ids.contains(&node.doc_id) {
            return false;
        }
        if self.is_full() {
            match self.heap.peek() {
                Some(worst) if self.beats(&node, &worst.node) => {
                    if let Some(evicted) = self.heap.pop() {
                        self.doc_ids.remove(&evicted.node.doc_id);
                    }
                }
                _ => return false,
            }
        }
        self.doc_ids.insert(node.doc_id);
        self.heap.push(HeapNode {
            node,
            by_int: self.use_int_scores,
        });
        true
    }

    fn lowest_score(&self) -> Option<f32> {
        if !self.is_full() {
            return None;
        }
        self.heap.peek().map(|h| {
            if self.use_int_scores {
                h.node.int_score as f32
            } else {
                h.node.score
            }
        })
    }

    fn contains_doc_id(&self, doc_id: u64) -> bool {
        self.doc_ids.contains(&doc_id)
    }

    fn nodes(&self) -> Vec<TopNode> {
        let mut nodes: Vec<HeapNode> = self.heap.iter().copied().collect();
        nodes.sort_by(|a, b| b.rank_cmp(a));
        nodes.into_iter().map(|h| h.node).collect()
    }
}
