//! Packed posting records and a read-only view over them.
//!
//! Every record starts with the same 6-byte position part:
//!
//! ```text
//! byte 0      bit 0 positive (clear on delete markers)
//!             bit 1 half (no term id)
//!             bit 2 compressed (no document id)
//!             bits 3..8 density rank
//! byte 1      bits 0..4 diversity rank, bits 4..8 word spam rank
//! bytes 2..6  little-endian payload:
//!             bit 0 half-stop wiki bigram, bit 1 synonym,
//!             bits 2..6 hash group, bits 6..32 word position.
//!             Numeric lists store an f32 or i32 in the whole word.
//! ```
//!
//! Document heads append a 48-bit document part (38-bit document id,
//! 4-bit site rank, 6-bit language id) and list heads append a further
//! 48-bit term id.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::posting::hash_group::HashGroup;

pub const LIST_HEAD_SIZE: usize = 18;
pub const DOC_HEAD_SIZE: usize = 12;
pub const CONTINUATION_SIZE: usize = 6;

const POSITIVE_BIT: u8 = 0x01;
const HALF_BIT: u8 = 0x02;
const COMPRESSED_BIT: u8 = 0x04;
const WIDTH_MASK: u8 = HALF_BIT | COMPRESSED_BIT;

pub const MAX_DOC_ID: u64 = (1 << 38) - 1;
pub const MAX_TERM_ID: u64 = (1 << 48) - 1;
pub const MAX_WORD_POS: u32 = (1 << 26) - 1;
pub const MAX_DENSITY_RANK: u8 = 31;
pub const MAX_DIVERSITY_RANK: u8 = 15;
pub const MAX_WORD_SPAM_RANK: u8 = 15;
pub const MAX_SITE_RANK: u8 = 15;
pub const MAX_LANG_ID: u8 = 63;

/// Payload bit marking a posting that came from a half-stop wiki bigram.
pub const SYN_BIT_HALF_STOP_BIGRAM: u8 = 0x01;
/// Payload bit marking a synonym (or alternate form) posting.
pub const SYN_BIT_SYNONYM: u8 = 0x02;
const SYN_MASK: u32 = 0x03;

/// Width discriminant of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordWidth {
    /// First record of a list, carries the term id.
    ListHead,
    /// First record of each document.
    DocHead,
    /// Any further record of the same document.
    Continuation,
}

impl RecordWidth {
    /// Decode the width from the first byte of a record.
    ///
    /// Returns `None` for the unused "compressed but not half" tag.
    #[inline]
    pub fn from_tag(byte0: u8) -> Option<Self> {
        match byte0 & WIDTH_MASK {
            0 => Some(RecordWidth::ListHead),
            HALF_BIT => Some(RecordWidth::DocHead),
            WIDTH_MASK => Some(RecordWidth::Continuation),
            _ => None,
        }
    }

    /// Size of the record in bytes.
    #[inline]
    pub fn size(self) -> usize {
        match self {
            RecordWidth::ListHead => LIST_HEAD_SIZE,
            RecordWidth::DocHead => DOC_HEAD_SIZE,
            RecordWidth::Continuation => CONTINUATION_SIZE,
        }
    }

    fn tag(self) -> u8 {
        match self {
            RecordWidth::ListHead => 0,
            RecordWidth::DocHead => HALF_BIT,
            RecordWidth::Continuation => HALF_BIT | COMPRESSED_BIT,
        }
    }
}

/// Document-level fields carried by head records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocHeader {
    pub doc_id: u64,
    pub site_rank: u8,
    pub lang_id: u8,
}

impl DocHeader {
    pub fn new(doc_id: u64, site_rank: u8, lang_id: u8) -> Self {
        Self {
            doc_id,
            site_rank,
            lang_id,
        }
    }

    fn pack(self) -> u64 {
        (self.doc_id & MAX_DOC_ID)
            | (((self.site_rank.min(MAX_SITE_RANK)) as u64) << 38)
            | (((self.lang_id.min(MAX_LANG_ID)) as u64) << 42)
    }

    fn unpack(raw: u64) -> Self {
        Self {
            doc_id: raw & MAX_DOC_ID,
            site_rank: ((raw >> 38) & 0x0f) as u8,
            lang_id: ((raw >> 42) & 0x3f) as u8,
        }
    }
}

/// Logical content of a positional posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingFields {
    pub word_pos: u32,
    pub hash_group: HashGroup,
    pub density_rank: u8,
    pub diversity_rank: u8,
    pub word_spam_rank: u8,
    pub synonym: bool,
    pub half_stop_wiki_bigram: bool,
}

impl PostingFields {
    /// A body posting at `word_pos` with the best possible ranks.
    pub fn body(word_pos: u32) -> Self {
        Self::with_group(word_pos, HashGroup::Body)
    }

    pub fn with_group(word_pos: u32, hash_group: HashGroup) -> Self {
        Self {
            word_pos,
            hash_group,
            density_rank: MAX_DENSITY_RANK,
            diversity_rank: MAX_DIVERSITY_RANK,
            word_spam_rank: MAX_WORD_SPAM_RANK,
            synonym: false,
            half_stop_wiki_bigram: false,
        }
    }

    pub(crate) fn payload(&self) -> u32 {
        let mut payload = (self.word_pos.min(MAX_WORD_POS)) << 6;
        payload |= (self.hash_group as u32 & 0x0f) << 2;
        if self.synonym {
            payload |= SYN_BIT_SYNONYM as u32;
        }
        if self.half_stop_wiki_bigram {
            payload |= SYN_BIT_HALF_STOP_BIGRAM as u32;
        }
        payload
    }
}

/// Value stored by a numeric field posting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericValue {
    Float(f32),
    Int(i32),
}

impl NumericValue {
    pub(crate) fn payload(self) -> u32 {
        match self {
            NumericValue::Float(v) => v.to_bits(),
            NumericValue::Int(v) => v as u32,
        }
    }
}

/// Ranks shared by every record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ranks {
    pub density: u8,
    pub diversity: u8,
    pub word_spam: u8,
}

impl From<&PostingFields> for Ranks {
    fn from(fields: &PostingFields) -> Self {
        Self {
            density: fields.density_rank,
            diversity: fields.diversity_rank,
            word_spam: fields.word_spam_rank,
        }
    }
}

/// Append one record to `out`.
pub(crate) fn write_record(
    out: &mut Vec<u8>,
    width: RecordWidth,
    ranks: Ranks,
    payload: u32,
    header: DocHeader,
    term_id: u64,
    delete_marker: bool,
) {
    let mut byte0 = width.tag() | (ranks.density.min(MAX_DENSITY_RANK) << 3);
    if !delete_marker {
        byte0 |= POSITIVE_BIT;
    }
    let byte1 =
        ranks.diversity.min(MAX_DIVERSITY_RANK) | (ranks.word_spam.min(MAX_WORD_SPAM_RANK) << 4);

    let start = out.len();
    out.resize(start + width.size(), 0);
    let rec = &mut out[start..];
    rec[0] = byte0;
    rec[1] = byte1;
    LittleEndian::write_u32(&mut rec[2..6], payload);
    if width != RecordWidth::Continuation {
        LittleEndian::write_u48(&mut rec[6..12], header.pack());
    }
    if width == RecordWidth::ListHead {
        LittleEndian::write_u48(&mut rec[12..18], term_id & MAX_TERM_ID);
    }
}

/// Append `key` re-tagged as `width`, with synonym bits replaced by
/// `syn_bits` when given. Head widths take the document part from `header`.
pub(crate) fn write_retagged(
    out: &mut Vec<u8>,
    key: PostingKey<'_>,
    width: RecordWidth,
    header: Option<&[u8]>,
    syn_bits: Option<u8>,
) {
    let start = out.len();
    out.extend_from_slice(&key.bytes[..CONTINUATION_SIZE]);
    out[start] = (out[start] & !WIDTH_MASK) | width.tag();
    if let Some(bits) = syn_bits {
        let payload = LittleEndian::read_u32(&out[start + 2..start + 6]);
        let payload = (payload & !SYN_MASK) | (bits as u32 & SYN_MASK);
        LittleEndian::write_u32(&mut out[start + 2..start + 6], payload);
    }
    if width == RecordWidth::DocHead {
        match header {
            Some(doc) => out.extend_from_slice(&doc[..CONTINUATION_SIZE]),
            None => out.extend_from_slice(&[0u8; CONTINUATION_SIZE]),
        }
    }
}

/// Read-only view of one record.
///
/// The slice always holds at least the full record for the width its tag
/// announces.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PostingKey<'a> {
    bytes: &'a [u8],
}

impl std::fmt::Debug for PostingKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("PostingKey");
        dbg.field("width", &self.width());
        if let Some(header) = self.doc_header() {
            dbg.field("doc_id", &header.doc_id);
        }
        dbg.field("word_pos", &self.word_pos())
            .field("hash_group", &self.hash_group())
            .field("density", &self.density_rank())
            .field("diversity", &self.diversity_rank())
            .field("spam", &self.word_spam_rank())
            .field("syn_bits", &self.syn_bits())
            .finish()
    }
}

impl<'a> PostingKey<'a> {
    /// View the record at the start of `bytes`.
    ///
    /// Returns `None` when the tag is invalid or the slice is shorter than
    /// the announced width.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        let width = RecordWidth::from_tag(*bytes.first()?)?;
        if bytes.len() < width.size() {
            return None;
        }
        Some(Self {
            bytes: &bytes[..width.size()],
        })
    }

    #[inline]
    pub(crate) fn from_validated(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn width(&self) -> RecordWidth {
        RecordWidth::from_tag(self.bytes[0]).unwrap_or(RecordWidth::Continuation)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Delete markers have the positive bit cleared.
    #[inline]
    pub fn is_delete_marker(&self) -> bool {
        self.bytes[0] & POSITIVE_BIT == 0
    }

    #[inline]
    pub fn density_rank(&self) -> u8 {
        self.bytes[0] >> 3
    }

    #[inline]
    pub fn diversity_rank(&self) -> u8 {
        self.bytes[1] & 0x0f
    }

    /// Word spam rank. For link-text postings this holds the linker's site
    /// rank instead.
    #[inline]
    pub fn word_spam_rank(&self) -> u8 {
        self.bytes[1] >> 4
    }

    #[inline]
    fn payload(&self) -> u32 {
        LittleEndian::read_u32(&self.bytes[2..6])
    }

    #[inline]
    pub fn word_pos(&self) -> u32 {
        self.payload() >> 6
    }

    #[inline]
    pub fn hash_group(&self) -> HashGroup {
        HashGroup::from_raw(((self.payload() >> 2) & 0x0f) as u8)
    }

    #[inline]
    pub fn syn_bits(&self) -> u8 {
        (self.payload() & SYN_MASK) as u8
    }

    #[inline]
    pub fn is_synonym(&self) -> bool {
        self.syn_bits() & SYN_BIT_SYNONYM != 0
    }

    #[inline]
    pub fn is_half_stop_wiki_bigram(&self) -> bool {
        self.syn_bits() & SYN_BIT_HALF_STOP_BIGRAM != 0
    }

    /// Field value of a numeric float posting.
    #[inline]
    pub fn float_value(&self) -> f32 {
        f32::from_bits(self.payload())
    }

    /// Field value of a numeric int posting.
    #[inline]
    pub fn int_value(&self) -> i32 {
        self.payload() as i32
    }

    /// Raw 6-byte document part of a head record.
    #[inline]
    pub(crate) fn header_bytes(&self) -> Option<&'a [u8]> {
        match self.width() {
            RecordWidth::Continuation => None,
            _ => Some(&self.bytes[6..12]),
        }
    }

    /// Document fields, present on document heads and list heads.
    pub fn doc_header(&self) -> Option<DocHeader> {
        self.header_bytes()
            .map(|b| DocHeader::unpack(LittleEndian::read_u48(b)))
    }

    pub fn doc_id(&self) -> Option<u64> {
        self.doc_header().map(|h| h.doc_id)
    }

    pub fn term_id(&self) -> Option<u64> {
        match self.width() {
            RecordWidth::ListHead => Some(LittleEndian::read_u48(&self.bytes[12..18])),
            _ => None,
        }
    }

    /// Logical fields of a positional posting.
    pub fn fields(&self) -> PostingFields {
        PostingFields {
            word_pos: self.word_pos(),
            hash_group: self.hash_group(),
            density_rank: self.density_rank(),
            diversity_rank: self.diversity_rank(),
            word_spam_rank: self.word_spam_rank(),
            synonym: self.is_synonym(),
            half_stop_wiki_bigram: self.is_half_stop_wiki_bigram(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(width: RecordWidth, fields: PostingFields, header: DocHeader) -> Vec<u8> {
        let mut out = Vec::new();
        write_record(
            &mut out,
            width,
            Ranks::from(&fields),
            fields.payload(),
            header,
            0xABCDEF,
            false,
        );
        out
    }

    #[test]
    fn test_width_tags() {
        let fields = PostingFields::body(7);
        let head = DocHeader::new(42, 3, 1);
        assert_eq!(record(RecordWidth::ListHead, fields, head).len(), 18);
        assert_eq!(record(RecordWidth::DocHead, fields, head).len(), 12);
        assert_eq!(record(RecordWidth::Continuation, fields, head).len(), 6);
        assert_eq!(RecordWidth::from_tag(COMPRESSED_BIT), None);
    }

    #[test]
    fn test_field_access() {
        let fields = PostingFields {
            word_pos: 1234,
            hash_group: HashGroup::Title,
            density_rank: 20,
            diversity_rank: 9,
            word_spam_rank: 4,
            synonym: true,
            half_stop_wiki_bigram: false,
        };
        let bytes = record(RecordWidth::ListHead, fields, DocHeader::new(MAX_DOC_ID, 12, 40));
        let key = PostingKey::parse(&bytes).unwrap();
        assert_eq!(key.width(), RecordWidth::ListHead);
        assert_eq!(key.fields(), fields);
        assert_eq!(key.doc_header(), Some(DocHeader::new(MAX_DOC_ID, 12, 40)));
        assert_eq!(key.term_id(), Some(0xABCDEF));
        assert!(!key.is_delete_marker());
    }

    #[test]
    fn test_continuation_has_no_header() {
        let bytes = record(RecordWidth::Continuation, PostingFields::body(3), DocHeader::default());
        let key = PostingKey::parse(&bytes).unwrap();
        assert_eq!(key.doc_id(), None);
        assert_eq!(key.term_id(), None);
        assert_eq!(key.word_pos(), 3);
    }

    #[test]
    fn test_numeric_payload() {
        let mut out = Vec::new();
        let ranks = Ranks {
            density: 0,
            diversity: 0,
            word_spam: 0,
        };
        write_record(
            &mut out,
            RecordWidth::DocHead,
            ranks,
            NumericValue::Float(-2.5).payload(),
            DocHeader::new(9, 0, 0),
            0,
            false,
        );
        write_record(
            &mut out,
            RecordWidth::Continuation,
            ranks,
            NumericValue::Int(-77).payload(),
            DocHeader::default(),
            0,
            false,
        );
        let first = PostingKey::parse(&out).unwrap();
        assert_eq!(first.float_value(), -2.5);
        let second = PostingKey::parse(&out[first.len()..]).unwrap();
        assert_eq!(second.int_value(), -77);
    }

    #[test]
    fn test_retag_rewrites_syn_bits() {
        let fields = PostingFields {
            synonym: true,
            ..PostingFields::body(11)
        };
        let cont = record(RecordWidth::Continuation, fields, DocHeader::default());
        let head = record(RecordWidth::DocHead, PostingFields::body(1), DocHeader::new(5, 2, 3));
        let header = PostingKey::parse(&head).unwrap().header_bytes();

        let mut out = Vec::new();
        write_retagged(
            &mut out,
            PostingKey::parse(&cont).unwrap(),
            RecordWidth::DocHead,
            header,
            Some(SYN_BIT_HALF_STOP_BIGRAM),
        );
        let key = PostingKey::parse(&out).unwrap();
        assert_eq!(key.width(), RecordWidth::DocHead);
        assert_eq!(key.doc_id(), Some(5));
        assert_eq!(key.word_pos(), 11);
        assert!(key.is_half_stop_wiki_bigram());
        assert!(!key.is_synonym());
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = record(RecordWidth::DocHead, PostingFields::body(1), DocHeader::new(1, 0, 0));
        assert!(PostingKey::parse(&bytes[..8]).is_none());
    }
}
