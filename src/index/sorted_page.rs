use std::ops::{Deref, DerefMut};

use crate::file::{PageData, PageId};
use crate::page::{HfPage, PageKind, EMPTY_SLOT};

use super::error::{IndexError, IndexResult};
use super::search_key::{DataEntry, SearchKey};

/// Largest serialized data entry a bucket page accepts; guarantees at
/// least two entries fit on one page
pub const MAX_ENTRY_SIZE: usize = 500;

/// A bucket page holding data entries in ascending key order.
///
/// Slots are kept contiguous: inserting shifts later slot entries right,
/// deleting shifts them left, so slot numbers on a sorted page are not
/// stable. Overflow chaining runs through the next-page link.
pub struct SortedPage<'a> {
    page: HfPage<'a>,
}

impl<'a> SortedPage<'a> {
    /// Format `data` as an empty bucket page
    pub fn init(data: &'a mut PageData, page_id: PageId) -> Self {
        Self {
            page: HfPage::init(data, page_id, PageKind::HashBucket),
        }
    }

    /// Wrap an existing bucket page image
    pub fn view(data: &'a mut PageData) -> Self {
        Self {
            page: HfPage::view(data),
        }
    }

    pub fn entry_count(&self) -> u16 {
        self.page.slot_count()
    }

    /// Insert `entry` at its key-ordered position
    pub fn insert_entry(&mut self, entry: &DataEntry) -> IndexResult<()> {
        let mut pos = self.entry_count() + 1;
        for slot in 1..=self.entry_count() {
            if self.entry_at(slot)?.key > entry.key {
                pos = slot;
                break;
            }
        }
        self.page.insert_record_at(pos, &entry.to_bytes())?;
        Ok(())
    }

    /// Remove the entry matching `entry` exactly (key and rid)
    pub fn delete_entry(&mut self, entry: &DataEntry) -> IndexResult<()> {
        for slot in 1..=self.entry_count() {
            if self.entry_at(slot)? == *entry {
                self.page.remove_record_at(slot)?;
                return Ok(());
            }
        }
        Err(IndexError::NotFound)
    }

    /// First slot after `from_slot` whose key equals `key`, or
    /// `EMPTY_SLOT` when no match remains on this page
    pub fn next_entry(&self, key: &SearchKey, from_slot: u16) -> IndexResult<u16> {
        for slot in from_slot + 1..=self.entry_count() {
            let entry = self.entry_at(slot)?;
            if entry.key == *key {
                return Ok(slot);
            }
            if entry.key > *key {
                break;
            }
        }
        Ok(EMPTY_SLOT)
    }

    pub fn entry_at(&self, slot_no: u16) -> IndexResult<DataEntry> {
        DataEntry::from_bytes(self.page.select_record(slot_no)?)
    }
}

impl<'a> Deref for SortedPage<'a> {
    type Target = HfPage<'a>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl DerefMut for SortedPage<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}
