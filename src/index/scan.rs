use crate::file::{PageGuard, PinMode, INVALID_PAGEID};
use crate::page::{Rid, EMPTY_SLOT};

use super::error::IndexResult;
use super::hash_index::HashIndex;
use super::search_key::SearchKey;
use super::sorted_page::SortedPage;

/// An equality scan returning the rid of every entry with the scan key.
///
/// Walks one bucket chain, pinning at most one bucket page at a time;
/// the pin is released when the scan is dropped.
pub struct HashScan<'i> {
    index: &'i HashIndex,
    key: SearchKey,
    current: Option<PageGuard<'i>>,
    slot_no: u16,
}

impl<'i> HashScan<'i> {
    pub(crate) fn new(index: &'i HashIndex, key: SearchKey, current: Option<PageGuard<'i>>) -> Self {
        Self {
            index,
            key,
            current,
            slot_no: EMPTY_SLOT,
        }
    }

    /// Release the scan's pin; dropping the scan does the same
    pub fn close(self) {}

    fn advance(&mut self) -> IndexResult<Option<Rid>> {
        while let Some(guard) = self.current.as_ref() {
            let (found, next_id) = {
                let mut data = guard.data_mut();
                let page = SortedPage::view(&mut data);
                let slot = page.next_entry(&self.key, self.slot_no)?;
                if slot != EMPTY_SLOT {
                    (Some((slot, page.entry_at(slot)?.rid)), INVALID_PAGEID)
                } else {
                    (None, page.next_page())
                }
            };

            if let Some((slot, rid)) = found {
                self.slot_no = slot;
                return Ok(Some(rid));
            }

            // Page exhausted: move to the next page of the chain
            self.current = None;
            self.slot_no = EMPTY_SLOT;
            if next_id != INVALID_PAGEID {
                self.current = Some(self.index.pool().pin_page(next_id, PinMode::DiskIo)?);
            }
        }
        Ok(None)
    }
}

impl Iterator for HashScan<'_> {
    type Item = IndexResult<Rid>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
