//! Per-document merge of sublists into one posting stream per term-info.

use std::ops::Range;

use crate::error::Result;
use crate::posting::key::{SYN_BIT_HALF_STOP_BIGRAM, SYN_BIT_SYNONYM, write_retagged};
use crate::posting::{DocBlock, DocHeader, HashGroup, PostingKey, RecordWidth};
use crate::ranking::term_info::SublistFlags;

/// One sublist's block for the document being merged.
#[derive(Debug, Clone, Copy)]
pub struct SourceBlock<'a> {
    pub flags: SublistFlags,
    pub block: DocBlock<'a>,
}

/// Merged postings of one document, one stream per term-info.
///
/// The buffers are reused from document to document.
#[derive(Debug, Clone, Default)]
pub struct MergedDoc {
    doc_id: u64,
    bytes: Vec<u8>,
    offsets: Vec<usize>,
    spans: Vec<Option<Range<usize>>>,
    headers: Vec<Option<DocHeader>>,
    highest_inlink_site_rank: Option<u8>,
}

impl MergedDoc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous document and prepare `num_infos` empty streams.
    pub fn reset(&mut self, doc_id: u64, num_infos: usize) {
        self.doc_id = doc_id;
        self.bytes.clear();
        self.offsets.clear();
        self.spans.clear();
        self.spans.resize(num_infos, None);
        self.headers.clear();
        self.headers.resize(num_infos, None);
        self.highest_inlink_site_rank = None;
    }

    pub fn doc_id(&self) -> u64 {
        self.doc_id
    }

    /// Merge the blocks of term-info `info` by word position.
    ///
    /// `sources` are in sublist precedence order; the earlier sublist wins
    /// ties. Leaves the stream absent when nothing survives.
    pub fn merge_info(&mut self, info: usize, sources: &[SourceBlock<'_>]) -> Result<()> {
        debug_assert!(sources.iter().all(|s| s.block.doc_id() == self.doc_id));
        let Some(first) = sources.first() else {
            return Ok(());
        };
        let capacity: usize = sources.iter().map(|s| s.block.len() + 6).sum();
        self.bytes.try_reserve(capacity)?;
        self.offsets.try_reserve(capacity / 6)?;

        let start_record = self.offsets.len();
        let numeric_as_is = sources.len() == 1
            && first.flags.contains(SublistFlags::NUMBER)
            && !first
                .flags
                .intersects(SublistFlags::SYNONYM | SublistFlags::HALF_STOP_WIKI_BIGRAM);

        if numeric_as_is {
            let base = self.bytes.len();
            let mut pos = base;
            for key in first.block.keys() {
                self.offsets.push(pos);
                pos += key.len();
            }
            self.bytes.extend_from_slice(first.block.as_bytes());
            self.headers[info] = Some(first.block.header);
        } else {
            self.merge_sorted(info, sources);
        }

        let end_record = self.offsets.len();
        if end_record > start_record {
            self.spans[info] = Some(start_record..end_record);
        }
        Ok(())
    }

    fn merge_sorted(&mut self, info: usize, sources: &[SourceBlock<'_>]) {
        let mut cursors: Vec<_> = sources.iter().map(|s| s.block.keys().peekable()).collect();
        let mut last_pos: Option<u32> = None;

        loop {
            let mut best: Option<(usize, u32)> = None;
            for (k, cursor) in cursors.iter_mut().enumerate() {
                if let Some(key) = cursor.peek() {
                    let wp = key.word_pos();
                    if best.is_none_or(|(_, b)| wp < b) {
                        best = Some((k, wp));
                    }
                }
            }
            let Some((k, wp)) = best else {
                break;
            };
            let Some(key) = cursors[k].next() else {
                break;
            };
            let source = &sources[k];

            // The bigram matched as two separate words.
            if source.flags.contains(SublistFlags::BIGRAM) && key.syn_bits() != 0 {
                continue;
            }
            if last_pos == Some(wp) {
                continue;
            }

            let syn_bits = if source.flags.contains(SublistFlags::NUMBER) {
                None
            } else {
                let mut bits = 0;
                if source
                    .flags
                    .intersects(SublistFlags::BIGRAM | SublistFlags::SYNONYM)
                {
                    bits |= SYN_BIT_SYNONYM;
                }
                if source.flags.contains(SublistFlags::HALF_STOP_WIKI_BIGRAM) {
                    bits |= SYN_BIT_HALF_STOP_BIGRAM;
                }
                Some(bits)
            };

            self.offsets.push(self.bytes.len());
            if last_pos.is_none() {
                write_retagged(
                    &mut self.bytes,
                    key,
                    RecordWidth::DocHead,
                    source.block.head().header_bytes(),
                    syn_bits,
                );
                self.headers[info] = Some(source.block.header);
            } else {
                write_retagged(
                    &mut self.bytes,
                    key,
                    RecordWidth::Continuation,
                    None,
                    syn_bits,
                );
            }
            last_pos = Some(wp);

            if syn_bits.is_some() && key.hash_group() == HashGroup::InLinkText {
                let linker = key.word_spam_rank();
                if self.highest_inlink_site_rank.is_none_or(|r| linker > r) {
                    self.highest_inlink_site_rank = Some(linker);
                }
            }
        }
    }

    /// Merged stream of term-info `info`, `None` when the term is absent
    /// from the document.
    pub fn stream(&self, info: usize) -> Option<MergedStream<'_>> {
        let span = self.spans.get(info)?.clone()?;
        Some(MergedStream {
            bytes: &self.bytes,
            offsets: &self.offsets[span],
        })
    }

    pub fn has_stream(&self, info: usize) -> bool {
        self.spans.get(info).is_some_and(|s| s.is_some())
    }

    /// Streams of every term-info in order.
    pub fn streams(&self) -> Vec<Option<MergedStream<'_>>> {
        (0..self.spans.len()).map(|i| self.stream(i)).collect()
    }

    /// Document fields of the block the stream of `info` started from.
    pub fn header(&self, info: usize) -> Option<DocHeader> {
        self.headers.get(info).copied().flatten()
    }

    /// Highest linker site rank over the link-text postings placed so far.
    pub fn highest_inlink_site_rank(&self) -> Option<u8> {
        self.highest_inlink_site_rank
    }
}

/// The ordered postings of one term in one document.
#[derive(Debug, Clone, Copy)]
pub struct MergedStream<'a> {
    bytes: &'a [u8],
    offsets: &'a [usize],
}

impl<'a> MergedStream<'a> {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The `idx`-th posting.
    ///
    /// # Panics
    ///
    /// When `idx` is out of bounds.
    #[inline]
    pub fn get(&self, idx: usize) -> PostingKey<'a> {
        let start = self.offsets[idx];
        let width = RecordWidth::from_tag(self.bytes[start]).unwrap_or(RecordWidth::Continuation);
        PostingKey::from_validated(&self.bytes[start..start + width.size()])
    }

    pub fn iter(&self) -> impl Iterator<Item = PostingKey<'a>> + 'a {
        let stream = *self;
        (0..stream.len()).map(move |i| stream.get(i))
    }

    /// Index of the first body-zone posting at or after `from`.
    pub fn next_body(&self, from: usize) -> Option<usize> {
        (from..self.len()).find(|&i| self.get(i).hash_group().is_body())
    }
}
