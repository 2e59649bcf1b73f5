//! End-to-end tests for the heap file layer

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::rc::Rc;

    use tempfile::TempDir;

    use crate::file::{BufferPool, DiskManager, PinMode};
    use crate::heap::{DirPage, HeapError, HeapFile};
    use crate::page::{HfPage, PageError, Rid, EMPTY_SLOT, MAX_RECORD_SIZE};

    fn setup_pool(num_frames: usize) -> (TempDir, Rc<BufferPool>) {
        let temp_dir = TempDir::new().unwrap();
        let disk = DiskManager::open(temp_dir.path().join("heap.db"), 512).unwrap();
        (temp_dir, Rc::new(BufferPool::new(disk, num_frames)))
    }

    #[test]
    fn test_insert_select_delete_with_tiny_pool() {
        let (_temp, pool) = setup_pool(3);
        let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();

        let small = vec![0xAAu8; 1];
        let medium = vec![0xBBu8; 500];
        let large = vec![0xCCu8; MAX_RECORD_SIZE];

        let rid_small = heap.insert_record(&small).unwrap();
        let rid_medium = heap.insert_record(&medium).unwrap();
        let rid_large = heap.insert_record(&large).unwrap();

        assert_eq!(heap.rec_count().unwrap(), 3);
        assert_eq!(heap.select_record(rid_small).unwrap(), small);
        assert_eq!(heap.select_record(rid_medium).unwrap(), medium);
        assert_eq!(heap.select_record(rid_large).unwrap(), large);

        // Small and medium share a page; the max-size record needs its own
        assert_eq!(rid_small.page_id, rid_medium.page_id);
        assert_ne!(rid_small.page_id, rid_large.page_id);
        assert_eq!(pool.allocated_pages(), 3, "head dir + two data pages");

        heap.delete_record(rid_small).unwrap();
        heap.delete_record(rid_medium).unwrap();
        heap.delete_record(rid_large).unwrap();

        assert_eq!(heap.rec_count().unwrap(), 0);
        assert_eq!(pool.allocated_pages(), 1, "only the head dir page remains");
    }

    #[test]
    fn test_round_trip_survives_deletes() {
        let (_temp, pool) = setup_pool(8);
        let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();

        let mut records: HashMap<Rid, Vec<u8>> = HashMap::new();
        for i in 0..50u16 {
            let record = vec![i as u8; 10 + (i as usize * 13) % 300];
            let rid = heap.insert_record(&record).unwrap();
            records.insert(rid, record);
        }
        for (rid, record) in &records {
            assert_eq!(heap.select_record(*rid).unwrap(), *record);
        }

        // Deleting every other record must not disturb the survivors
        let doomed: Vec<Rid> = records
            .keys()
            .copied()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .map(|(_, rid)| rid)
            .collect();
        for rid in &doomed {
            heap.delete_record(*rid).unwrap();
            records.remove(rid);
        }

        assert_eq!(heap.rec_count().unwrap(), records.len());
        for (rid, record) in &records {
            assert_eq!(heap.select_record(*rid).unwrap(), *record);
        }
    }

    #[test]
    fn test_directory_matches_data_pages() {
        let (_temp, pool) = setup_pool(8);
        let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();

        let mut rids = Vec::new();
        for i in 0..40u16 {
            let record = vec![(i % 250) as u8; 20 + (i as usize * 37) % 400];
            rids.push(heap.insert_record(&record).unwrap());
        }
        for rid in rids.iter().step_by(3) {
            heap.delete_record(*rid).unwrap();
        }

        // Every directory entry must agree with the page it describes
        for entries in heap.dir_snapshot().unwrap() {
            for (page_id, record_count, free_count) in entries {
                let guard = pool.pin_page(page_id, PinMode::DiskIo).unwrap();
                let mut data = guard.data_mut();
                let page = HfPage::view(&mut data);
                let live = (1..=page.slot_count())
                    .filter(|&slot| page.slot_len(slot) != EMPTY_SLOT)
                    .count();
                assert_eq!(live as u16, record_count);
                assert_eq!(page.free_space(), free_count);
            }
        }
    }

    #[test]
    fn test_directory_grows_and_shrinks() {
        let (_temp, pool) = setup_pool(4);
        let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();

        // Max-size records claim a data page each; more pages than one
        // directory page can describe forces a second directory page
        let record = vec![0x11u8; MAX_RECORD_SIZE];
        let mut rids = Vec::new();
        for _ in 0..DirPage::MAX_ENTRIES + 4 {
            rids.push(heap.insert_record(&record).unwrap());
        }

        let snapshot = heap.dir_snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].len(), DirPage::MAX_ENTRIES);
        assert_eq!(snapshot[1].len(), 4);

        // Empty non-head directory pages are reclaimed
        for rid in &rids {
            heap.delete_record(*rid).unwrap();
        }
        let snapshot = heap.dir_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1, "only the head directory page is left");
        assert!(snapshot[0].is_empty());
        assert_eq!(pool.allocated_pages(), 1);
    }

    #[test]
    fn test_pins_are_conserved() {
        let (_temp, pool) = setup_pool(5);
        let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();
        let baseline = pool.num_unpinned();
        assert_eq!(baseline, 5);

        let rid = heap.insert_record(b"watched record").unwrap();
        assert_eq!(pool.num_unpinned(), baseline);

        heap.select_record(rid).unwrap();
        assert_eq!(pool.num_unpinned(), baseline);

        heap.update_record(rid, b"watched record").unwrap();
        assert_eq!(pool.num_unpinned(), baseline);

        heap.rec_count().unwrap();
        assert_eq!(pool.num_unpinned(), baseline);

        let scan = heap.open_scan().unwrap();
        let seen: Vec<_> = scan.collect();
        assert_eq!(seen.len(), 1);
        assert_eq!(pool.num_unpinned(), baseline);

        // Error paths release their pins too
        assert!(heap.select_record(Rid::new(rid.page_id, 99)).is_err());
        assert_eq!(pool.num_unpinned(), baseline);

        heap.delete_record(rid).unwrap();
        assert_eq!(pool.num_unpinned(), baseline);
    }

    #[test]
    fn test_update_record_rules() {
        let (_temp, pool) = setup_pool(4);
        let heap = HeapFile::temp(pool).unwrap();

        let rid = heap.insert_record(b"version one").unwrap();
        heap.update_record(rid, b"version two").unwrap();
        assert_eq!(heap.select_record(rid).unwrap(), b"version two");

        let result = heap.update_record(rid, b"a longer replacement");
        assert!(matches!(
            result,
            Err(HeapError::Page(PageError::InvalidUpdate { expected: 11, .. }))
        ));
    }

    #[test]
    fn test_invalid_rid_errors() {
        let (_temp, pool) = setup_pool(4);
        let heap = HeapFile::temp(pool).unwrap();

        let rid = heap.insert_record(b"only record").unwrap();
        let bogus = Rid::new(rid.page_id, rid.slot_no + 7);
        assert!(matches!(
            heap.select_record(bogus),
            Err(HeapError::Page(PageError::InvalidRid(_)))
        ));
        assert!(matches!(
            heap.delete_record(bogus),
            Err(HeapError::Page(PageError::InvalidRid(_)))
        ));

        heap.delete_record(rid).unwrap();
        assert!(heap.select_record(rid).is_err());
    }

    #[test]
    fn test_record_size_limit() {
        let (_temp, pool) = setup_pool(4);
        let heap = HeapFile::temp(pool).unwrap();

        let oversized = vec![0u8; MAX_RECORD_SIZE + 1];
        assert!(matches!(
            heap.insert_record(&oversized),
            Err(HeapError::RecordTooLarge(len)) if len == MAX_RECORD_SIZE + 1
        ));

        let exactly_max = vec![0u8; MAX_RECORD_SIZE];
        heap.insert_record(&exactly_max).unwrap();
    }

    #[test]
    fn test_scan_returns_every_record_once() {
        let (_temp, pool) = setup_pool(4);
        let heap = HeapFile::temp(pool).unwrap();

        assert!(heap.open_scan().unwrap().next().is_none());

        let mut expected: HashMap<Rid, Vec<u8>> = HashMap::new();
        for i in 0..30u8 {
            let record = vec![i; 200];
            let rid = heap.insert_record(&record).unwrap();
            expected.insert(rid, record);
        }

        let mut seen: HashMap<Rid, Vec<u8>> = HashMap::new();
        for item in heap.open_scan().unwrap() {
            let (rid, record) = item.unwrap();
            assert!(seen.insert(rid, record).is_none(), "duplicate rid from scan");
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_named_file_persists_across_opens() {
        let (_temp, pool) = setup_pool(4);

        let rid = {
            let heap = HeapFile::open(Rc::clone(&pool), Some("employees")).unwrap();
            heap.insert_record(b"ada").unwrap()
        };

        // Reopening by name finds the same head page and records
        let heap = HeapFile::open(Rc::clone(&pool), Some("employees")).unwrap();
        assert_eq!(heap.rec_count().unwrap(), 1);
        assert_eq!(heap.select_record(rid).unwrap(), b"ada");

        heap.delete_file().unwrap();
        assert_eq!(pool.allocated_pages(), 0);
        assert_eq!(pool.get_file_entry("employees"), None);

        // The name can be reused for a fresh file
        let heap = HeapFile::open(Rc::clone(&pool), Some("employees")).unwrap();
        assert_eq!(heap.rec_count().unwrap(), 0);
    }

    #[test]
    fn test_temp_file_deleted_on_drop() {
        let (_temp, pool) = setup_pool(4);
        assert_eq!(pool.allocated_pages(), 0);

        {
            let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();
            for i in 0..10u8 {
                heap.insert_record(&[i; 300]).unwrap();
            }
            assert!(pool.allocated_pages() > 1);
        }

        assert_eq!(pool.allocated_pages(), 0);
    }

    #[test]
    fn test_freed_page_space_is_reused() {
        let (_temp, pool) = setup_pool(4);
        let heap = HeapFile::temp(Rc::clone(&pool)).unwrap();

        let rid = heap.insert_record(&vec![1u8; MAX_RECORD_SIZE]).unwrap();
        assert_eq!(pool.allocated_pages(), 2);

        heap.delete_record(rid).unwrap();
        assert_eq!(pool.allocated_pages(), 1);

        heap.insert_record(&vec![2u8; MAX_RECORD_SIZE]).unwrap();
        assert_eq!(pool.allocated_pages(), 2);
    }
}
