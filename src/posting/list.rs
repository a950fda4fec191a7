//! Termlists and their validated working copies.

use log::error;

use crate::error::Result;
use crate::posting::key::{
    CONTINUATION_SIZE, DOC_HEAD_SIZE, DocHeader, PostingKey, RecordWidth, write_retagged,
};

/// A raw termlist as produced by the index: one list head followed by
/// document heads and continuations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermList {
    bytes: Vec<u8>,
}

impl TermList {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the list in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Term id stored in the list head.
    pub fn term_id(&self) -> Option<u64> {
        PostingKey::parse(&self.bytes).and_then(|key| key.term_id())
    }
}

/// A per-evaluation copy of a termlist.
///
/// The list head is rewritten to a document head so every document starts
/// with a 12-byte record. Every record has been checked: widths are valid,
/// no list head appears past the start and document ids never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingList {
    bytes: Vec<u8>,
    num_docs: usize,
    truncated_at: Option<usize>,
}

impl WorkingList {
    /// Validate and copy `list`.
    ///
    /// A corrupt record drops the document it belongs to and everything
    /// after it; the problem is logged and the remaining prefix is kept.
    pub fn from_term_list(list: &TermList) -> Result<Self> {
        let raw = list.as_bytes();
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(raw.len())?;

        let mut num_docs: usize = 0;
        let mut block_start = 0;
        let mut last_doc: Option<u64> = None;
        let mut pos = 0;
        // Reason and whether the bad record would have started a new document.
        let mut corruption: Option<(&str, bool)> = None;

        while pos < raw.len() {
            let Some(key) = PostingKey::parse(&raw[pos..]) else {
                corruption = Some(("invalid or truncated record", false));
                break;
            };
            let width = key.width();
            let starts_doc = key.doc_id().is_some_and(|doc_id| Some(doc_id) != last_doc);
            if pos == 0 && width != RecordWidth::ListHead {
                corruption = Some(("list does not start with a list head", true));
                break;
            }
            if pos > 0 && width == RecordWidth::ListHead {
                corruption = Some(("list head inside list", starts_doc));
                break;
            }
            if let Some(doc_id) = key.doc_id() {
                match last_doc {
                    Some(last) if doc_id < last => {
                        corruption = Some(("document ids out of order", true));
                        break;
                    }
                    Some(last) if doc_id == last => {}
                    _ => {
                        block_start = bytes.len();
                        num_docs += 1;
                        last_doc = Some(doc_id);
                    }
                }
            }
            let out_width = match width {
                RecordWidth::ListHead => RecordWidth::DocHead,
                other => other,
            };
            write_retagged(&mut bytes, key, out_width, key.header_bytes(), None);
            pos += key.len();
        }

        let mut truncated_at = None;
        if let Some((why, starts_doc)) = corruption {
            // A bad head only loses its own document; a bad record inside a
            // document loses the document it belongs to.
            if !starts_doc {
                bytes.truncate(block_start);
                num_docs = num_docs.saturating_sub(1);
            }
            truncated_at = Some(pos);
            error!(
                "corrupt termlist (term id {:?}) at byte {}: {}; keeping {} documents",
                list.term_id(),
                pos,
                why,
                num_docs
            );
        }

        Ok(Self {
            bytes,
            num_docs,
            truncated_at,
        })
    }

    /// Build a working list from records that already satisfy the working
    /// layout.
    pub(crate) fn from_validated(bytes: Vec<u8>, num_docs: usize) -> Self {
        Self {
            bytes,
            num_docs,
            truncated_at: None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Byte offset of the first corrupt record, if the source was corrupt.
    pub fn truncated_at(&self) -> Option<usize> {
        self.truncated_at
    }

    /// Iterate the list one document at a time.
    pub fn blocks(&self) -> DocBlocks<'_> {
        DocBlocks::new(&self.bytes, 0)
    }
}

/// All records of one document inside a working list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocBlock<'a> {
    pub header: DocHeader,
    /// Offset of the block inside its list.
    pub offset: usize,
    bytes: &'a [u8],
}

impl<'a> DocBlock<'a> {
    #[inline]
    pub fn doc_id(&self) -> u64 {
        self.header.doc_id
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// End offset of the block inside its list.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }

    /// The first record of the block.
    #[inline]
    pub fn head(&self) -> PostingKey<'a> {
        PostingKey::from_validated(&self.bytes[..DOC_HEAD_SIZE])
    }

    /// Whether the first record is a delete marker.
    pub fn is_delete_marker(&self) -> bool {
        self.head().is_delete_marker()
    }

    /// Every record of the document in list order.
    pub fn keys(&self) -> Keys<'a> {
        Keys::new(self.bytes)
    }
}

/// Iterator over the records of a validated byte range.
#[derive(Debug, Clone)]
pub struct Keys<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Keys<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl<'a> Iterator for Keys<'a> {
    type Item = PostingKey<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = PostingKey::parse(&self.bytes[self.pos..])?;
        self.pos += key.len();
        Some(key)
    }
}

/// Iterator over the documents of a validated working list.
#[derive(Debug, Clone)]
pub struct DocBlocks<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DocBlocks<'a> {
    /// Start iterating at `offset`, which must be a document boundary.
    pub(crate) fn new(bytes: &'a [u8], offset: usize) -> Self {
        Self { bytes, pos: offset }
    }

    /// Offset of the next block.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for DocBlocks<'a> {
    type Item = DocBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let head = PostingKey::parse(&self.bytes[start..])?;
        let header = head.doc_header()?;
        let mut end = start + head.len();
        while end < self.bytes.len() {
            let Some(key) = PostingKey::parse(&self.bytes[end..]) else {
                break;
            };
            match key.width() {
                RecordWidth::Continuation => end += CONTINUATION_SIZE,
                // Repeated heads for the same document fold into one block.
                RecordWidth::DocHead if key.doc_id() == Some(header.doc_id) => {
                    end += DOC_HEAD_SIZE
                }
                _ => break,
            }
        }
        self.pos = end;
        Some(DocBlock {
            header,
            offset: start,
            bytes: &self.bytes[start..end],
        })
    }
}
