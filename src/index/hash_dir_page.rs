use std::ops::{Deref, DerefMut};

use crate::file::{PageData, PageId, INVALID_PAGEID, PAGE_SIZE};
use crate::page::{HfPage, PageKind, HEADER_SIZE};

/// Hash directory page: a flat array of bucket slots, each holding the
/// page id of the bucket's primary page or `INVALID_PAGEID` for an empty
/// bucket. Directories wider than one page chain through the next link.
pub struct HashDirPage<'a> {
    page: HfPage<'a>,
}

impl<'a> HashDirPage<'a> {
    /// Bucket slots that fit on one directory page
    pub const MAX_ENTRIES: usize = (PAGE_SIZE - HEADER_SIZE) / 4;

    /// Format `data` as a directory page carrying `slots` empty buckets
    pub fn init(data: &'a mut PageData, page_id: PageId, slots: usize) -> Self {
        let mut page = Self {
            page: HfPage::init(data, page_id, PageKind::HashDir),
        };
        page.page.set_raw_slot_count(slots as u16);
        for index in 0..slots {
            page.set_bucket_page_id(index, INVALID_PAGEID);
        }
        page
    }

    /// Wrap an existing directory page image
    pub fn view(data: &'a mut PageData) -> Self {
        Self {
            page: HfPage::view(data),
        }
    }

    /// Number of bucket slots on this page
    pub fn entry_count(&self) -> usize {
        self.page.slot_count() as usize
    }

    pub fn bucket_page_id(&self, index: usize) -> PageId {
        let pos = Self::slot_pos(index);
        let data = self.page.raw();
        i32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
    }

    pub fn set_bucket_page_id(&mut self, index: usize, page_id: PageId) {
        let pos = Self::slot_pos(index);
        self.page.raw_mut()[pos..pos + 4].copy_from_slice(&page_id.to_le_bytes());
    }

    fn slot_pos(index: usize) -> usize {
        HEADER_SIZE + 4 * index
    }
}

impl<'a> Deref for HashDirPage<'a> {
    type Target = HfPage<'a>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl DerefMut for HashDirPage<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BUCKET_COUNT;

    #[test]
    fn test_one_page_covers_all_buckets() {
        assert!(BUCKET_COUNT <= HashDirPage::MAX_ENTRIES);
    }

    #[test]
    fn test_init_empties_every_slot() {
        let mut data = [0u8; PAGE_SIZE];
        let dir = HashDirPage::init(&mut data, 9, BUCKET_COUNT);

        assert_eq!(dir.entry_count(), BUCKET_COUNT);
        assert_eq!(dir.kind(), Some(PageKind::HashDir));
        for index in 0..BUCKET_COUNT {
            assert_eq!(dir.bucket_page_id(index), INVALID_PAGEID);
        }
    }

    #[test]
    fn test_slot_round_trip() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = HashDirPage::init(&mut data, 9, BUCKET_COUNT);

        dir.set_bucket_page_id(0, 21);
        dir.set_bucket_page_id(127, 22);
        assert_eq!(dir.bucket_page_id(0), 21);
        assert_eq!(dir.bucket_page_id(1), INVALID_PAGEID);
        assert_eq!(dir.bucket_page_id(127), 22);
    }
}
