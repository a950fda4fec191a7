//! Per-sublist document cursors.

use crate::posting::{DocBlock, DocBlocks, WorkingList};

/// Walks the documents of one compacted sublist.
///
/// Seeking forward steps through the blocks in order. Seeking backwards
/// (descending candidate order or the explain pass) falls back to a binary
/// search over an offset table built on first use.
#[derive(Debug, Clone)]
pub struct SubListCursor<'a> {
    bytes: &'a [u8],
    blocks: DocBlocks<'a>,
    current: Option<DocBlock<'a>>,
    last_doc: Option<u64>,
    offsets: Option<Vec<(u64, usize)>>,
}

impl<'a> SubListCursor<'a> {
    pub fn new(list: &'a WorkingList) -> Self {
        Self {
            bytes: list.as_bytes(),
            blocks: list.blocks(),
            current: None,
            last_doc: None,
            offsets: None,
        }
    }

    /// Block of `doc_id`, if the sublist holds that document.
    pub fn seek(&mut self, doc_id: u64) -> Option<DocBlock<'a>> {
        match self.current {
            Some(block) if block.doc_id() == doc_id => return Some(block),
            Some(block) if block.doc_id() > doc_id => return self.seek_indexed(doc_id),
            None if self.last_doc.is_some_and(|last| doc_id <= last) => {
                return self.seek_indexed(doc_id);
            }
            _ => {}
        }
        for block in self.blocks.by_ref() {
            self.last_doc = Some(block.doc_id());
            self.current = Some(block);
            if block.doc_id() >= doc_id {
                return (block.doc_id() == doc_id).then_some(block);
            }
        }
        self.current = None;
        None
    }

    fn seek_indexed(&mut self, doc_id: u64) -> Option<DocBlock<'a>> {
        let bytes = self.bytes;
        let offsets = self.offsets.get_or_insert_with(|| {
            DocBlocks::new(bytes, 0)
                .map(|b| (b.doc_id(), b.offset))
                .collect()
        });
        let idx = offsets.partition_point(|&(id, _)| id < doc_id);
        let Some(&(_, offset)) = offsets.get(idx) else {
            // Past the end: park the cursor there.
            self.blocks = DocBlocks::new(bytes, bytes.len());
            self.current = None;
            return None;
        };
        self.blocks = DocBlocks::new(bytes, offset);
        self.current = self.blocks.next();
        self.last_doc = self.current.map(|b| b.doc_id());
        self.current.filter(|b| b.doc_id() == doc_id)
    }

    /// Back to the first document.
    pub fn rewind(&mut self) {
        self.blocks = DocBlocks::new(self.bytes, 0);
        self.current = None;
        self.last_doc = None;
    }
}
