use crate::file::{PageGuard, PageId, PinMode, INVALID_PAGEID};
use crate::page::{HfPage, Rid, EMPTY_SLOT};

use super::dir_page::DirPage;
use super::error::HeapResult;
use super::heap_file::HeapFile;

/// A forward sequential scan over all records of a heap file.
///
/// Pins at most one directory page and one data page at a time; both
/// pins are released when the scan is dropped. Records mutated while a
/// scan is open are seen in no particular order, but each surviving
/// record is returned at most once.
pub struct HeapScan<'h> {
    file: &'h HeapFile,
    dir: Option<PageGuard<'h>>,
    entry_index: usize,
    data_page: Option<PageGuard<'h>>,
    slot_no: u16,
    finished: bool,
}

enum Step {
    DataPage(PageId),
    NextDir(PageId),
    Done,
}

impl<'h> HeapScan<'h> {
    pub(crate) fn open(file: &'h HeapFile) -> HeapResult<Self> {
        let dir = file.pool().pin_page(file.head_id(), PinMode::DiskIo)?;
        Ok(Self {
            file,
            dir: Some(dir),
            entry_index: 0,
            data_page: None,
            slot_no: EMPTY_SLOT,
            finished: false,
        })
    }

    /// Release the scan's pins; dropping the scan does the same
    pub fn close(self) {}

    fn advance(&mut self) -> HeapResult<Option<(Rid, Vec<u8>)>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            // Walk the pinned data page from the slot after the last hit
            if let Some(guard) = &self.data_page {
                let found = {
                    let mut data = guard.data_mut();
                    let page = HfPage::view(&mut data);
                    let mut found = None;
                    for slot in self.slot_no + 1..=page.slot_count() {
                        if page.slot_len(slot) != EMPTY_SLOT {
                            found = Some((slot, page.select_record(slot)?.to_vec()));
                            break;
                        }
                    }
                    found
                };
                match found {
                    Some((slot, bytes)) => {
                        self.slot_no = slot;
                        let rid = Rid::new(guard.page_id(), slot);
                        return Ok(Some((rid, bytes)));
                    }
                    None => {
                        self.data_page = None;
                        self.entry_index += 1;
                        continue;
                    }
                }
            }

            // No data page pinned: take the next directory entry, or move
            // to the next directory page
            let Some(dir_guard) = self.dir.as_ref() else {
                self.finished = true;
                return Ok(None);
            };
            let step = {
                let mut data = dir_guard.data_mut();
                let dir = DirPage::view(&mut data);
                if self.entry_index < dir.entry_count() {
                    Step::DataPage(dir.data_page_id(self.entry_index))
                } else if dir.next_page() != INVALID_PAGEID {
                    Step::NextDir(dir.next_page())
                } else {
                    Step::Done
                }
            };
            match step {
                Step::DataPage(page_id) => {
                    self.slot_no = EMPTY_SLOT;
                    self.data_page = Some(self.file.pool().pin_page(page_id, PinMode::DiskIo)?);
                }
                Step::NextDir(page_id) => {
                    // Release the old directory pin before taking the next
                    self.dir = None;
                    self.dir = Some(self.file.pool().pin_page(page_id, PinMode::DiskIo)?);
                    self.entry_index = 0;
                }
                Step::Done => {
                    self.dir = None;
                    self.finished = true;
                    return Ok(None);
                }
            }
        }
    }
}

impl Iterator for HeapScan<'_> {
    type Item = HeapResult<(Rid, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
