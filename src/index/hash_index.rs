use std::fmt::Write as _;
use std::rc::Rc;

use crate::file::{BufferPool, PageGuard, PageId, PinMode, INVALID_PAGEID};
use crate::page::{PageError, Rid};

use super::error::{IndexError, IndexResult};
use super::hash_dir_page::HashDirPage;
use super::scan::HashScan;
use super::search_key::{DataEntry, SearchKey};
use super::sorted_page::{SortedPage, MAX_ENTRY_SIZE};
use super::{BUCKET_COUNT, DEPTH};

/// A static hash index mapping search keys to rids.
///
/// The directory is a flat array of `2^DEPTH` bucket slots spread over a
/// chain of directory pages; each slot points at the primary page of a
/// bucket, a singly linked chain of key-sorted pages. Overflow pages are
/// created when a bucket page fills and reclaimed when one empties; the
/// primary page is kept even when empty.
///
/// Like a heap file, a named index persists through the registry and a
/// nameless one is temporary, deleted when the value is dropped.
pub struct HashIndex {
    pool: Rc<BufferPool>,
    name: Option<String>,
    head_id: PageId,
    is_temp: bool,
}

impl HashIndex {
    /// Open the named index, creating it if the registry does not know
    /// the name. A `None` name creates a temporary index.
    pub fn open(pool: Rc<BufferPool>, name: Option<&str>) -> IndexResult<Self> {
        let registered = name.and_then(|n| pool.get_file_entry(n));

        let head_id = match registered {
            Some(head_id) => head_id,
            None => {
                let head_id = Self::create_directory(&pool)?;
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

    /// Open a temporary index, deleted when the value is dropped
    pub fn temp(pool: Rc<BufferPool>) -> IndexResult<Self> {
        Self::open(pool, None)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Allocate directory pages covering all buckets, every slot empty
    fn create_directory(pool: &BufferPool) -> IndexResult<PageId> {
        let mut remaining = BUCKET_COUNT;
        let slots = remaining.min(HashDirPage::MAX_ENTRIES);
        let (head_id, head_guard) = pool.new_page(1)?;
        {
            let mut data = head_guard.data_mut();
            HashDirPage::init(&mut data, head_id, slots);
        }
        head_guard.mark_dirty();
        remaining -= slots;

        let mut prev_id = head_id;
        let mut prev_guard = head_guard;
        while remaining > 0 {
            let slots = remaining.min(HashDirPage::MAX_ENTRIES);
            let (next_id, next_guard) = pool.new_page(1)?;
            {
                let mut data = next_guard.data_mut();
                let mut next_dir = HashDirPage::init(&mut data, next_id, slots);
                next_dir.set_prev_page(prev_id);
            }
            next_guard.mark_dirty();
            {
                let mut data = prev_guard.data_mut();
                let mut prev_dir = HashDirPage::view(&mut data);
                prev_dir.set_next_page(next_id);
            }
            drop(prev_guard);

            prev_id = next_id;
            prev_guard = next_guard;
            remaining -= slots;
        }
        drop(prev_guard);

        Ok(head_id)
    }

    /// Insert a (key, rid) entry
    pub fn insert_entry(&self, key: &SearchKey, rid: Rid) -> IndexResult<()> {
        let entry = DataEntry::new(key.clone(), rid);
        if entry.length() > MAX_ENTRY_SIZE {
            return Err(IndexError::EntryTooLarge(entry.length()));
        }

        let (dir_guard, index) = self.dir_slot_for(key.bucket(DEPTH))?;
        let primary = {
            let mut data = dir_guard.data_mut();
            HashDirPage::view(&mut data).bucket_page_id(index)
        };

        if primary == INVALID_PAGEID {
            // First entry for this bucket: allocate its primary page
            let (bucket_id, bucket_guard) = self.pool.new_page(1)?;
            {
                let mut data = bucket_guard.data_mut();
                SortedPage::init(&mut data, bucket_id);
            }
            {
                let mut data = dir_guard.data_mut();
                let mut dir = HashDirPage::view(&mut data);
                dir.set_bucket_page_id(index, bucket_id);
            }
            dir_guard.mark_dirty();
            drop(dir_guard);

            self.chain_insert(&bucket_guard, &entry)?;
            bucket_guard.mark_dirty();
        } else {
            drop(dir_guard);
            let bucket_guard = self.pool.pin_page(primary, PinMode::DiskIo)?;
            if self.chain_insert(&bucket_guard, &entry)? {
                bucket_guard.mark_dirty();
            }
        }
        Ok(())
    }

    /// Delete the entry matching (key, rid) exactly
    pub fn delete_entry(&self, key: &SearchKey, rid: Rid) -> IndexResult<()> {
        let entry = DataEntry::new(key.clone(), rid);

        let (dir_guard, index) = self.dir_slot_for(key.bucket(DEPTH))?;
        let primary = {
            let mut data = dir_guard.data_mut();
            HashDirPage::view(&mut data).bucket_page_id(index)
        };
        drop(dir_guard);

        if primary == INVALID_PAGEID {
            return Err(IndexError::NotFound);
        }
        let bucket_guard = self.pool.pin_page(primary, PinMode::DiskIo)?;
        if self.chain_delete(&bucket_guard, &entry)? {
            bucket_guard.mark_dirty();
        }
        Ok(())
    }

    /// Start an equality scan for `key`
    pub fn open_scan(&self, key: &SearchKey) -> IndexResult<HashScan<'_>> {
        let (dir_guard, index) = self.dir_slot_for(key.bucket(DEPTH))?;
        let primary = {
            let mut data = dir_guard.data_mut();
            HashDirPage::view(&mut data).bucket_page_id(index)
        };
        drop(dir_guard);

        let current = if primary != INVALID_PAGEID {
            Some(self.pool.pin_page(primary, PinMode::DiskIo)?)
        } else {
            None
        };
        Ok(HashScan::new(self, key.clone(), current))
    }

    /// Print which buckets are allocated and how many entries each chain
    /// holds; returns the total entry count.
    ///
    /// ```text
    /// <IX_Customers>
    /// --------------
    /// 0000000 : 35
    /// 0000001 : null
    /// ...
    /// --------------
    /// Total : 1500
    /// ```
    pub fn print_summary(&self) -> IndexResult<usize> {
        let label = self.name.as_deref().unwrap_or("Temp");
        let rule = "-".repeat(label.len() + 2);
        let mut out = String::new();
        out.push_str(&format!("<{label}>\n{rule}\n"));

        let mut total = 0;
        let mut bucket = 0usize;
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let (slots, next) = {
                let mut data = guard.data_mut();
                let dir = HashDirPage::view(&mut data);
                let slots: Vec<PageId> =
                    (0..dir.entry_count()).map(|i| dir.bucket_page_id(i)).collect();
                (slots, dir.next_page())
            };
            drop(guard);

            for primary in slots {
                let _ = write!(out, "{:0width$b} : ", bucket, width = DEPTH as usize);
                if primary == INVALID_PAGEID {
                    out.push_str("null\n");
                } else {
                    let count = self.chain_entry_count(primary)?;
                    let _ = writeln!(out, "{count}");
                    total += count;
                }
                bucket += 1;
            }
            dir_id = next;
        }

        let _ = write!(out, "{rule}\nTotal : {total}");
        println!("{out}");
        Ok(total)
    }

    /// Delete the index from the database, freeing all of its pages and
    /// its registry entry if it has one
    pub fn delete_file(mut self) -> IndexResult<()> {
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

    /// The directory page holding `bucket`, pinned, with the slot index
    /// local to that page
    fn dir_slot_for(&self, bucket: usize) -> IndexResult<(PageGuard<'_>, usize)> {
        let mut dir_id = self.head_id;
        let mut index = bucket;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let (count, next) = {
                let mut data = guard.data_mut();
                let dir = HashDirPage::view(&mut data);
                (dir.entry_count(), dir.next_page())
            };
            if index < count {
                return Ok((guard, index));
            }
            drop(guard);
            index -= count;
            dir_id = next;
        }
        Err(IndexError::Corrupted)
    }

    /// Insert into the chain starting at `guard`'s page, spilling into
    /// overflow pages and appending one when the chain is full. Returns
    /// whether the current page itself was modified.
    fn chain_insert(&self, guard: &PageGuard<'_>, entry: &DataEntry) -> IndexResult<bool> {
        let attempt = {
            let mut data = guard.data_mut();
            let mut page = SortedPage::view(&mut data);
            page.insert_entry(entry)
        };
        match attempt {
            Ok(()) => Ok(true),
            Err(IndexError::Page(PageError::SpaceExhausted)) => {
                let next_id = {
                    let mut data = guard.data_mut();
                    SortedPage::view(&mut data).next_page()
                };
                if next_id != INVALID_PAGEID {
                    let next_guard = self.pool.pin_page(next_id, PinMode::DiskIo)?;
                    if self.chain_insert(&next_guard, entry)? {
                        next_guard.mark_dirty();
                    }
                    Ok(false)
                } else {
                    // End of the chain: link a fresh overflow page
                    let (new_id, new_guard) = self.pool.new_page(1)?;
                    {
                        let mut data = new_guard.data_mut();
                        SortedPage::init(&mut data, new_id);
                    }
                    {
                        let mut data = guard.data_mut();
                        let mut page = SortedPage::view(&mut data);
                        page.set_next_page(new_id);
                    }
                    self.chain_insert(&new_guard, entry)?;
                    new_guard.mark_dirty();
                    Ok(true)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Delete from the chain starting at `guard`'s page. An overflow page
    /// emptied by the delete is spliced out and freed; the primary page
    /// is never reclaimed here. Returns whether the current page was
    /// modified.
    fn chain_delete(&self, guard: &PageGuard<'_>, entry: &DataEntry) -> IndexResult<bool> {
        let attempt = {
            let mut data = guard.data_mut();
            let mut page = SortedPage::view(&mut data);
            page.delete_entry(entry)
        };
        match attempt {
            Ok(()) => Ok(true),
            Err(IndexError::NotFound) => {
                let next_id = {
                    let mut data = guard.data_mut();
                    SortedPage::view(&mut data).next_page()
                };
                if next_id == INVALID_PAGEID {
                    return Err(IndexError::NotFound);
                }

                let next_guard = self.pool.pin_page(next_id, PinMode::DiskIo)?;
                let child_dirty = self.chain_delete(&next_guard, entry)?;
                let (next_count, next_next) = {
                    let mut data = next_guard.data_mut();
                    let page = SortedPage::view(&mut data);
                    (page.entry_count(), page.next_page())
                };

                if next_count == 0 {
                    // Underflow: splice the emptied overflow page out
                    {
                        let mut data = guard.data_mut();
                        let mut page = SortedPage::view(&mut data);
                        page.set_next_page(next_next);
                    }
                    drop(next_guard);
                    self.pool.free_page(next_id)?;
                    Ok(true)
                } else {
                    if child_dirty {
                        next_guard.mark_dirty();
                    }
                    Ok(false)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Total entries across one bucket's chain
    fn chain_entry_count(&self, primary: PageId) -> IndexResult<usize> {
        let mut total = 0;
        let mut page_id = primary;
        while page_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(page_id, PinMode::DiskIo)?;
            let next = {
                let mut data = guard.data_mut();
                let page = SortedPage::view(&mut data);
                total += page.entry_count() as usize;
                page.next_page()
            };
            drop(guard);
            page_id = next;
        }
        Ok(total)
    }

    /// Free every bucket chain and directory page of this index
    fn free_pages(&self) -> IndexResult<()> {
        let mut dir_id = self.head_id;
        while dir_id != INVALID_PAGEID {
            let guard = self.pool.pin_page(dir_id, PinMode::DiskIo)?;
            let (slots, next) = {
                let mut data = guard.data_mut();
                let dir = HashDirPage::view(&mut data);
                let slots: Vec<PageId> =
                    (0..dir.entry_count()).map(|i| dir.bucket_page_id(i)).collect();
                (slots, dir.next_page())
            };
            drop(guard);

            for primary in slots {
                let mut page_id = primary;
                while page_id != INVALID_PAGEID {
                    let bucket_guard = self.pool.pin_page(page_id, PinMode::DiskIo)?;
                    let next_bucket = {
                        let mut data = bucket_guard.data_mut();
                        SortedPage::view(&mut data).next_page()
                    };
                    drop(bucket_guard);
                    self.pool.free_page(page_id)?;
                    page_id = next_bucket;
                }
            }
            self.pool.free_page(dir_id)?;
            dir_id = next;
        }
        Ok(())
    }
}

impl Drop for HashIndex {
    fn drop(&mut self) {
        if self.is_temp {
            let _ = self.free_pages();
        }
    }
}
