//! Id allocation under concurrent writers.
//! Each thread opens its own store handle, the way independent worker processes would.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vasp_ingest_core::{DocumentStore, FileStore, IdAllocator, MemoryStore};

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

fn assert_dense(ids: &[u64]) {
    let unique: BTreeSet<u64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate ids handed out");
    assert_eq!(unique.first(), Some(&1));
    assert_eq!(unique.last(), Some(&((THREADS * PER_THREAD) as u64)));
}

#[test]
fn file_store_handles_never_share_an_id() {
    let dir = TempDir::new().unwrap();
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let root = dir.path().to_path_buf();
            thread::spawn(move || {
                let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(&root).unwrap());
                let ids = IdAllocator::new(store);
                (0..PER_THREAD)
                    .map(|_| ids.next_record_id().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    assert_dense(&ids);
}

#[test]
fn memory_store_shared_across_threads() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ids = IdAllocator::new(Arc::clone(&store));
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| ids.next_group_id().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    assert_dense(&ids);
}

#[test]
fn task_ids_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let ids = IdAllocator::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        assert_eq!(ids.next_task_id().unwrap(), "mp-1");
        assert_eq!(ids.next_task_id().unwrap(), "mp-2");
    }
    let ids = IdAllocator::new(Arc::new(FileStore::open(dir.path()).unwrap()));
    assert_eq!(ids.next_task_id().unwrap(), "mp-3");
    assert_eq!(ids.next_record_id().unwrap(), 1);
}

#[test]
fn restart_moves_both_structure_counters() {
    let ids = IdAllocator::new(Arc::new(MemoryStore::new()));
    ids.next_record_id().unwrap();
    ids.restart_at(1000, 50).unwrap();
    assert_eq!(ids.next_record_id().unwrap(), 1000);
    assert_eq!(ids.next_group_id().unwrap(), 50);
}
