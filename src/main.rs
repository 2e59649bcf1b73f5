use std::error::Error;
use std::rc::Rc;

use pagedb::file::{BufferPool, DiskManager, DEFAULT_POOL_SIZE};
use pagedb::heap::HeapFile;
use pagedb::index::{HashIndex, SearchKey};

fn main() {
    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./pagedb.db".to_string());

    if let Err(e) = run(&db_path) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(db_path: &str) -> Result<(), Box<dyn Error>> {
    let disk = DiskManager::open(db_path, 4096)?;
    let pool = Rc::new(BufferPool::new(disk, DEFAULT_POOL_SIZE));

    let heap = HeapFile::open(Rc::clone(&pool), Some("people"))?;
    let index = HashIndex::open(Rc::clone(&pool), Some("ix_people"))?;

    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
        let rid = heap.insert_record(name.as_bytes())?;
        index.insert_entry(&SearchKey::Int(id), rid)?;
    }
    println!("{} records stored", heap.rec_count()?);

    for item in heap.open_scan()? {
        let (rid, bytes) = item?;
        println!(
            "  ({}, {}) -> {}",
            rid.page_id,
            rid.slot_no,
            String::from_utf8_lossy(&bytes)
        );
    }

    for hit in index.open_scan(&SearchKey::Int(2))? {
        let rid = hit?;
        println!("key 2 -> {}", String::from_utf8_lossy(&heap.select_record(rid)?));
    }

    index.print_summary()?;
    pool.flush_all()?;
    Ok(())
}
