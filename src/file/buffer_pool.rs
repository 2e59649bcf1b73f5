use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use super::disk_manager::{DiskManager, DiskStats};
use super::error::{PoolError, PoolResult};
use super::{PageData, PageId, INVALID_PAGEID, PAGE_SIZE};

const ZERO_PAGE: PageData = [0u8; PAGE_SIZE];

/// How the frame's contents are determined when a page is pinned
pub enum PinMode<'a> {
    /// Read the page from disk into the frame
    DiskIo,
    /// Copy the given image into the frame; fails if the page is already pinned
    MemCpy(&'a PageData),
    /// Leave the frame contents alone; the caller will overwrite them
    Noop,
}

/// One slot of the buffer pool
struct Frame {
    page: Rc<RefCell<PageData>>,
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    referenced: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            page: Rc::new(RefCell::new(ZERO_PAGE)),
            page_id: INVALID_PAGEID,
            pin_count: 0,
            dirty: false,
            referenced: false,
        }
    }

    fn reset(&mut self) {
        self.page_id = INVALID_PAGEID;
        self.pin_count = 0;
        self.dirty = false;
        self.referenced = false;
    }
}

struct PoolState {
    frames: Vec<Frame>,
    /// Maps resident page ids to frame indexes
    page_table: HashMap<PageId, usize>,
    free_frames: Vec<usize>,
    /// Clock hand: index the next eviction scan resumes from
    hand: usize,
}

impl PoolState {
    /// Pick the frame to load a new page into: a free frame if one exists,
    /// otherwise run the clock scan. A frame is evictable only when it is
    /// unpinned and its referenced bit is clear, so two full rotations
    /// suffice: one to clear referenced bits, one to find a victim.
    fn choose_frame(&mut self) -> PoolResult<usize> {
        if let Some(index) = self.free_frames.pop() {
            return Ok(index);
        }

        let n = self.frames.len();
        for _ in 0..2 * n {
            let index = self.hand;
            self.hand = (self.hand + 1) % n;
            let frame = &mut self.frames[index];
            if frame.pin_count > 0 {
                continue;
            }
            if frame.referenced {
                frame.referenced = false;
                continue;
            }
            return Ok(index);
        }

        Err(PoolError::PoolExhausted(n))
    }
}

/// A fixed-size pool of page frames mediating all page access.
///
/// Every page a client touches is pinned into a frame first and unpinned
/// when the client is done; replacement follows the clock policy and a
/// pinned page is never evicted. This is the only component that talks to
/// the disk manager.
pub struct BufferPool {
    disk: RefCell<DiskManager>,
    state: RefCell<PoolState>,
}

impl BufferPool {
    /// Create a pool of `num_frames` frames over the given disk manager
    pub fn new(disk: DiskManager, num_frames: usize) -> Self {
        let frames: Vec<Frame> = (0..num_frames).map(|_| Frame::new()).collect();
        let free_frames = (0..num_frames).rev().collect();

        Self {
            disk: RefCell::new(disk),
            state: RefCell::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_frames,
                hand: 0,
            }),
        }
    }

    /// Pin `page_id` into a frame and return a guard for its contents.
    ///
    /// If the page is resident this only bumps its pin count (except that
    /// `MemCpy` on a pinned page fails). Otherwise a frame is chosen,
    /// its previous occupant written back if dirty, and the frame filled
    /// according to `mode`. The guard unpins on drop.
    pub fn pin_page(&self, page_id: PageId, mode: PinMode) -> PoolResult<PageGuard<'_>> {
        let mut state = self.state.borrow_mut();

        if let Some(&index) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[index];
            if matches!(mode, PinMode::MemCpy(_)) && frame.pin_count > 0 {
                return Err(PoolError::AlreadyPinned(page_id));
            }
            frame.pin_count += 1;
            let page = Rc::clone(&frame.page);
            return Ok(PageGuard::new(self, page_id, page));
        }

        let index = state.choose_frame()?;

        // Write back the evicted occupant before reuse
        let old_id = state.frames[index].page_id;
        if old_id != INVALID_PAGEID {
            if state.frames[index].dirty {
                let frame = &state.frames[index];
                self.disk
                    .borrow_mut()
                    .write_page(old_id, &frame.page.borrow())?;
            }
            state.page_table.remove(&old_id);
        }

        let frame = &mut state.frames[index];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.dirty = false;
        frame.referenced = true;

        let filled = match mode {
            PinMode::DiskIo => self
                .disk
                .borrow_mut()
                .read_page(page_id, &mut frame.page.borrow_mut()),
            PinMode::MemCpy(image) => {
                frame.page.borrow_mut().copy_from_slice(image);
                Ok(())
            }
            PinMode::Noop => Ok(()),
        };
        if let Err(err) = filled {
            let frame = &mut state.frames[index];
            frame.reset();
            state.free_frames.push(index);
            return Err(err.into());
        }

        let page = Rc::clone(&state.frames[index].page);
        state.page_table.insert(page_id, index);
        Ok(PageGuard::new(self, page_id, page))
    }

    /// Drop one pin on `page_id`, folding `dirty` into the frame's dirty bit.
    ///
    /// Dirty pages are not written here; they are flushed on eviction or
    /// by `flush_all`. Normally called by `PageGuard::drop`.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> PoolResult<()> {
        let mut state = self.state.borrow_mut();
        let index = *state
            .page_table
            .get(&page_id)
            .ok_or(PoolError::NotPinned(page_id))?;

        let frame = &mut state.frames[index];
        if frame.pin_count == 0 {
            return Err(PoolError::NotPinned(page_id));
        }
        frame.pin_count -= 1;
        frame.dirty |= dirty;
        frame.referenced = true;
        Ok(())
    }

    /// Allocate a run of `run_size` disk pages and pin the first one,
    /// zero-filled, into the pool.
    ///
    /// If no frame can be found the allocated disk pages are not returned
    /// to the disk manager; the run is leaked.
    pub fn new_page(&self, run_size: usize) -> PoolResult<(PageId, PageGuard<'_>)> {
        let first_id = self.disk.borrow_mut().allocate_page(run_size)?;
        let guard = self.pin_page(first_id, PinMode::MemCpy(&ZERO_PAGE))?;
        Ok((first_id, guard))
    }

    /// Deallocate `page_id` on disk, dropping it from the pool if resident.
    ///
    /// The page is not flushed; its frame goes straight back to the free set.
    pub fn free_page(&self, page_id: PageId) -> PoolResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(&index) = state.page_table.get(&page_id) {
            if state.frames[index].pin_count > 0 {
                return Err(PoolError::PinnedFree(page_id));
            }
            state.frames[index].reset();
            state.page_table.remove(&page_id);
            state.free_frames.push(index);
        }
        drop(state);

        self.disk.borrow_mut().deallocate_page(page_id)?;
        Ok(())
    }

    /// Write every dirty resident page to disk and clear its dirty bit.
    /// Flushing involves only writing, not unpinning or unmapping.
    pub fn flush_all(&self) -> PoolResult<()> {
        let mut state = self.state.borrow_mut();
        let mut disk = self.disk.borrow_mut();
        for frame in &mut state.frames {
            if frame.page_id != INVALID_PAGEID && frame.dirty {
                disk.write_page(frame.page_id, &frame.page.borrow())?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Total number of frames
    pub fn num_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    /// Number of frames with no pins, free frames included
    pub fn num_unpinned(&self) -> usize {
        self.state
            .borrow()
            .frames
            .iter()
            .filter(|frame| frame.pin_count == 0)
            .count()
    }

    /// Look up the head page of a named file
    pub fn get_file_entry(&self, name: &str) -> Option<PageId> {
        self.disk.borrow().get_file_entry(name)
    }

    /// Register a named file's head page
    pub fn add_file_entry(&self, name: &str, page_id: PageId) -> PoolResult<()> {
        self.disk.borrow_mut().add_file_entry(name, page_id)?;
        Ok(())
    }

    /// Remove a named file from the registry
    pub fn delete_file_entry(&self, name: &str) -> PoolResult<()> {
        self.disk.borrow_mut().delete_file_entry(name)?;
        Ok(())
    }

    /// Number of disk pages currently allocated
    pub fn allocated_pages(&self) -> usize {
        self.disk.borrow().allocated_count()
    }

    /// Disk operation counters
    pub fn stats(&self) -> DiskStats {
        self.disk.borrow().stats()
    }
}

/// A pinned page. Holding the guard keeps the page in its frame; dropping
/// it releases the pin, dirty if `mark_dirty` was called.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    page: Rc<RefCell<PageData>>,
    dirty: Cell<bool>,
}

impl<'a> PageGuard<'a> {
    fn new(pool: &'a BufferPool, page_id: PageId, page: Rc<RefCell<PageData>>) -> Self {
        Self {
            pool,
            page_id,
            page,
            dirty: Cell::new(false),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Borrow the page bytes
    pub fn data(&self) -> Ref<'_, PageData> {
        self.page.borrow()
    }

    /// Borrow the page bytes mutably; callers still decide dirtiness
    /// explicitly via `mark_dirty`
    pub fn data_mut(&self) -> RefMut<'_, PageData> {
        self.page.borrow_mut()
    }

    /// Record that this page was modified; communicated at unpin time
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        let _ = self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}
