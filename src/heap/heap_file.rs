use std::rc::Rc;

use crate::file::{BufferPool, PageGuard, PageId, PinMode, INVALID_PAGEID};
use crate::page::{HfPage, PageKind, Rid, MAX_RECORD_SIZE, SLOT_SIZE};

use super::dir_page::DirPage;
use super::error::{HeapError, HeapResult};
use super::scan::HeapScan;

/// An unordered file of variable-length records.
///
/// Data pages are tracked by a directory: a doubly linked list of
/// directory pages whose entries record each data page's live record
/// count and free space. Record placement is first-fit over the
/// directory; data pages and non-head directory pages are reclaimed when
/// they empty out.
///
/// A heap file opened with a name is registered with the disk manager and
/// persists; one opened without a name is temporary and deletes itself
/// when the value is dropped.
pub struct HeapFile {
    pool: Rc<BufferPool>,
    name: Option<String>,
    head_id: PageId,
    is_temp: bool,
}

impl HeapFile {
    /// Open the named heap file, creating it if the registry does not
    /// know the name. A `None` name creates a temporary file.
    pub fn open(pool: Rc<BufferPool>, name: Option<&str>) -> HeapResult<Self> {
        let registered = name.and_then(|n| pool.get_file_entry(n));

        let head_id = match registered {
            Some(head_id) => head_id,
            None => {
                let (head_id, guard) = pool.new_page(1)?;
                {
                    let mut data = guard.data_mut();
                    DirPage::init(&mut data, head_id);
                }
                guard.mark_dirty();
                drop(guard);
                if let Some(n) = name {
                    pool.add_file_entry(n, head_id)?;
                }
                head_id
            }
        };

        Ok(Self {
            pool,
            name: name.map(str::to_string),
            head_id,
            is_temp: name.is_none(),
        })
    }

    /// Open a temporary heap file, deleted when the value is dropped
    pub fn temp(pool: Rc<BufferPool>) -> HeapResult<Self> {
        Self::open(pool, None)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Insert a record and return its rid
    pub fn insert_record(&self, record: &[u8]) -> HeapResult<Rid> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(HeapError::RecordTooLarge(record.len()));
        }

        let page_id = self.get_avail_page(record.len() + SLOT_SIZE)?;
        let guard = self.pool.pin_page(page_id, PinMode::DiskIo)?;
        let (slot_no, new_free) = {
            let mut data = guard.data_mut();
            let mut page = HfPage::view(&mut data);
            let slot_no = page.insert_record(record)?;
            (slot_no, page.free_space())
        };
        guard.mark_dirty();
        drop(guard);

        self.update_dir_entry(page_id, 1, new_free)?;
        Ok(Rid::new(page_id, slot_no))
    }

    /// Read the record `rid` refers to
    pub fn select_record(&self, rid: Rid) -> HeapResult<Vec<u8>> {
        let guard = self.pool.pin_page(rid.page_id, PinMode::DiskIo)?;
        let mut data = guard.data_mut();
        let page = HfPage::view(&mut data);
        Ok(page.select_record(rid.slot_no)?.to_vec())
    }

    /// Overwrite the record `rid` refers to; the length must match
    pub fn update_record(&self, rid: Rid, record: &[u8]) -> HeapResult<()> {
        let guard = self.pool.pin_page(rid.page_id, PinMode::DiskIo)?;
        {
            let mut data = guard.data_mut();
            let mut page = HfPage::view(&mut data);
            page.update_record(rid.slot_no, record)?;
        }
        // Record count and free space are unchanged, so the directory
        // entry needs no update
        guard.mark_dirty();
        Ok(())
    }

    /// Delete the record `rid` refers to, reclaiming its page if it was
    /// the last record there
    pub fn delete_record(&self, rid: Rid) -> HeapResult<()> {
        let guard = self.pool.pin_page(rid.page_id, PinMode::DiskIo)?;
        let new_free = {
            let mut data = guard.data_mut();
            let mut page = HfPage::view(&mut data);
            page.delete_record(rid.slot_no)?;
            page.free_space()
        };
        guard.mark_dirty();
        drop(guard);

        self.update_dir_entry(rid.page_id, -1, new_free)
    }

    /// Total number of live records
    pub fn rec_count(&self) -> HeapResult<usize> {
        let mut total = 0;
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let next = {
                let mut data = guard.data_mut();
                let dir = DirPage::view(&mut data);
                for index in 0..dir.entry_count() {
                    total += dir.record_count(index) as usize;
                }
                dir.next_page()
            };
            drop(guard);
            dir_id = next;
        }
        Ok(total)
    }

    /// Start a sequential scan over all records
    pub fn open_scan(&self) -> HeapResult<HeapScan<'_>> {
        HeapScan::open(self)
    }

    /// Delete the file from the database, freeing all of its pages and
    /// its registry entry if it has one
    pub fn delete_file(mut self) -> HeapResult<()> {
        self.free_pages()?;
        if let Some(name) = self.name.take() {
            self.pool.delete_file_entry(&name)?;
        }
        self.is_temp = false;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub(crate) fn head_id(&self) -> PageId {
        self.head_id
    }

    /// First data page with at least `needed` free bytes, in directory
    /// order; creates one when no page qualifies
    fn get_avail_page(&self, needed: usize) -> HeapResult<PageId> {
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let next = {
                let mut data = guard.data_mut();
                let dir = DirPage::view(&mut data);
                for index in 0..dir.entry_count() {
                    if dir.free_count(index) as usize >= needed {
                        return Ok(dir.data_page_id(index));
                    }
                }
                dir.next_page()
            };
            drop(guard);
            dir_id = next;
        }
        self.insert_page()
    }

    /// Create a new empty data page and its directory entry, adding a
    /// directory page if every existing one is full. Returns the data
    /// page id; nothing is left pinned.
    fn insert_page(&self) -> HeapResult<PageId> {
        let mut dir_id = self.head_id;
        let (dir_guard, index) = loop {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let (count, next) = {
                let mut data = guard.data_mut();
                let dir = DirPage::view(&mut data);
                (dir.entry_count(), dir.next_page())
            };

            if count < DirPage::MAX_ENTRIES {
                break (guard, count);
            }
            if next == INVALID_PAGEID {
                // Every directory page is full: append a fresh one
                let (new_id, new_guard) = self.pool.new_page(1)?;
                {
                    let mut data = new_guard.data_mut();
                    let mut new_dir = DirPage::init(&mut data, new_id);
                    new_dir.set_prev_page(dir_id);
                }
                new_guard.mark_dirty();
                {
                    let mut data = guard.data_mut();
                    let mut dir = DirPage::view(&mut data);
                    dir.set_next_page(new_id);
                }
                guard.mark_dirty();
                drop(guard);
                break (new_guard, 0);
            }

            drop(guard);
            dir_id = next;
        };

        let (data_id, data_guard) = self.pool.new_page(1)?;
        let free_space = {
            let mut data = data_guard.data_mut();
            let page = HfPage::init(&mut data, data_id, PageKind::HeapData);
            page.free_space()
        };
        data_guard.mark_dirty();
        drop(data_guard);

        {
            let mut data = dir_guard.data_mut();
            let mut dir = DirPage::view(&mut data);
            dir.set_entry(index, data_id, 0, free_space);
            dir.set_entry_count(index + 1);
        }
        dir_guard.mark_dirty();
        Ok(data_id)
    }

    /// Locate the directory entry for `page_id`: the pinned directory
    /// page and the entry index on it
    fn find_dir_entry(&self, page_id: PageId) -> HeapResult<(PageGuard<'_>, usize)> {
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let (found, next) = {
                let mut data = guard.data_mut();
                let dir = DirPage::view(&mut data);
                let found = (0..dir.entry_count()).find(|&i| dir.data_page_id(i) == page_id);
                (found, dir.next_page())
            };
            if let Some(index) = found {
                return Ok((guard, index));
            }
            drop(guard);
            dir_id = next;
        }
        Err(HeapError::MissingDirEntry(page_id))
    }

    /// Apply a record-count delta and the new free count to `page_id`'s
    /// directory entry; reclaims the data page when the count hits zero
    fn update_dir_entry(&self, page_id: PageId, delta: i32, new_free: u16) -> HeapResult<()> {
        let (dir_guard, index) = self.find_dir_entry(page_id)?;
        let record_count = {
            let mut data = dir_guard.data_mut();
            let dir = DirPage::view(&mut data);
            dir.record_count(index) as i32 + delta
        };

        if record_count >= 1 {
            {
                let mut data = dir_guard.data_mut();
                let mut dir = DirPage::view(&mut data);
                dir.set_record_count(index, record_count as u16);
                dir.set_free_count(index, new_free);
            }
            dir_guard.mark_dirty();
            Ok(())
        } else {
            self.delete_data_page(page_id, dir_guard, index)
        }
    }

    /// Free an empty data page and drop its directory entry. A non-head
    /// directory page left without entries is spliced out of the list and
    /// freed as well; the head directory page is never reclaimed.
    fn delete_data_page(
        &self,
        page_id: PageId,
        dir_guard: PageGuard<'_>,
        index: usize,
    ) -> HeapResult<()> {
        self.pool.free_page(page_id)?;

        let dir_id = dir_guard.page_id();
        let (remaining, prev, next) = {
            let mut data = dir_guard.data_mut();
            let mut dir = DirPage::view(&mut data);
            dir.remove_entry(index);
            (dir.entry_count(), dir.prev_page(), dir.next_page())
        };

        if remaining == 0 && dir_id != self.head_id {
            if prev != INVALID_PAGEID {
                let guard = self.pool.pin_page(prev, PinMode::DiskIo)?;
                {
                    let mut data = guard.data_mut();
                    let mut page = DirPage::view(&mut data);
                    page.set_next_page(next);
                }
                guard.mark_dirty();
            }
            if next != INVALID_PAGEID {
                let guard = self.pool.pin_page(next, PinMode::DiskIo)?;
                {
                    let mut data = guard.data_mut();
                    let mut page = DirPage::view(&mut data);
                    page.set_prev_page(prev);
                }
                guard.mark_dirty();
            }
            // The page is about to be freed; its own content can go stale
            drop(dir_guard);
            self.pool.free_page(dir_id)?;
        } else {
            dir_guard.mark_dirty();
        }
        Ok(())
    }

    /// Free every data and directory page of this file
    fn free_pages(&self) -> HeapResult<()> {
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let (data_pages, next) = {
                let mut data = guard.data_mut();
                let dir = DirPage::view(&mut data);
                let pages: Vec<PageId> =
                    (0..dir.entry_count()).map(|i| dir.data_page_id(i)).collect();
                (pages, dir.next_page())
            };
            drop(guard);

            for data_page in data_pages {
                self.pool.free_page(data_page)?;
            }
            self.pool.free_page(dir_id)?;
            dir_id = next;
        }
        Ok(())
    }

    /// Directory snapshot for consistency checks:
    /// (data_page_id, record_count, free_count) per entry, per directory page
    #[cfg(test)]
    pub(crate) fn dir_snapshot(&self) -> HeapResult<Vec<Vec<(PageId, u16, u16)>>> {
        let mut snapshot = Vec::new();
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let next = {
                let mut data = guard.data_mut();
                let dir = DirPage::view(&mut data);
                let entries = (0..dir.entry_count())
                    .map(|i| (dir.data_page_id(i), dir.record_count(i), dir.free_count(i)))
                    .collect();
                snapshot.push(entries);
                dir.next_page()
            };
            drop(guard);
            dir_id = next;
        }
        Ok(snapshot)
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        if self.is_temp {
            let _ = self.free_pages();
        }
    }
}
