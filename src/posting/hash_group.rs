//! Document zones a posting can occur in.

use serde::{Deserialize, Serialize};

/// Number of distinct hash groups.
pub const NUM_HASH_GROUPS: usize = 11;

/// The zone of a document a word was indexed from.
///
/// The discriminants are the on-disk values stored in a posting.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HashGroup {
    #[default]
    Body = 0,
    Title = 1,
    Heading = 2,
    InList = 3,
    InMetaTag = 4,
    InLinkText = 5,
    InTag = 6,
    Neighborhood = 7,
    InternalLinkText = 8,
    InUrl = 9,
    InMenu = 10,
}

impl HashGroup {
    /// All hash groups in on-disk order.
    pub const ALL: [HashGroup; NUM_HASH_GROUPS] = [
        HashGroup::Body,
        HashGroup::Title,
        HashGroup::Heading,
        HashGroup::InList,
        HashGroup::InMetaTag,
        HashGroup::InLinkText,
        HashGroup::InTag,
        HashGroup::Neighborhood,
        HashGroup::InternalLinkText,
        HashGroup::InUrl,
        HashGroup::InMenu,
    ];

    /// Decode a stored value. Out-of-range values clamp to the last group.
    pub fn from_raw(value: u8) -> Self {
        let idx = (value as usize).min(NUM_HASH_GROUPS - 1);
        Self::ALL[idx]
    }

    /// Table index of this group.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the group is part of the running body text.
    ///
    /// Body-zone postings take part in sliding-window proximity scoring;
    /// everything else is scored through the non-body pair matrix.
    #[inline]
    pub fn is_body(self) -> bool {
        matches!(
            self,
            HashGroup::Body | HashGroup::Heading | HashGroup::InList | HashGroup::InMenu
        )
    }

    /// Collapse body-like zones onto [`HashGroup::Body`].
    #[inline]
    pub fn reduced(self) -> Self {
        if self.is_body() { HashGroup::Body } else { self }
    }

    /// Link text from other sites. These postings are weighted by the linker's
    /// site rank and never deduplicated in top-slot selection.
    #[inline]
    pub fn is_link_text(self) -> bool {
        self == HashGroup::InLinkText
    }

    /// Two groups can be paired in the non-body matrix only when neither is a
    /// body zone.
    #[inline]
    pub fn is_compatible(self, other: HashGroup) -> bool {
        !self.is_body() && !other.is_body()
    }

    pub fn name(self) -> &'static str {
        match self {
            HashGroup::Body => "body",
            HashGroup::Title => "title",
            HashGroup::Heading => "heading",
            HashGroup::InList => "in_list",
            HashGroup::InMetaTag => "in_meta_tag",
            HashGroup::InLinkText => "in_link_text",
            HashGroup::InTag => "in_tag",
            HashGroup::Neighborhood => "neighborhood",
            HashGroup::InternalLinkText => "internal_link_text",
            HashGroup::InUrl => "in_url",
            HashGroup::InMenu => "in_menu",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_clamps() {
        assert_eq!(HashGroup::from_raw(0), HashGroup::Body);
        assert_eq!(HashGroup::from_raw(5), HashGroup::InLinkText);
        assert_eq!(HashGroup::from_raw(10), HashGroup::InMenu);
        assert_eq!(HashGroup::from_raw(15), HashGroup::InMenu);
    }

    #[test]
    fn test_body_zones() {
        let body: Vec<HashGroup> = HashGroup::ALL.iter().copied().filter(|g| g.is_body()).collect();
        assert_eq!(
            body,
            vec![HashGroup::Body, HashGroup::Heading, HashGroup::InList, HashGroup::InMenu]
        );
        assert_eq!(HashGroup::Heading.reduced(), HashGroup::Body);
        assert_eq!(HashGroup::Title.reduced(), HashGroup::Title);
    }

    #[test]
    fn test_compatibility() {
        assert!(HashGroup::Title.is_compatible(HashGroup::InUrl));
        assert!(!HashGroup::Title.is_compatible(HashGroup::Body));
        assert!(!HashGroup::InMenu.is_compatible(HashGroup::InMenu));
    }
}
