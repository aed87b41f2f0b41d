//! Persistence seam: records, groups, tasks, counters and blobs.
//!
//! Every component receives an explicit `Arc<dyn DocumentStore>` handle; there are no
//! process-wide adapters. Two implementations ship with the crate:
//! - [`MemoryStore`]: a mutex-guarded in-process store for tests and dry runs.
//! - [`FileStore`]: a directory of JSON documents shared by independent worker processes,
//!   serialized through an advisory lock file.
//!
//! Counter advancement and group compare-and-swap are the only operations that must be
//! atomic across writers; both implementations perform them under a single exclusive lock.

mod blob;
mod file;
mod memory;

pub use blob::{content_id, validate_bucket};
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{BlobId, StructureGroup, StructureRecord, SymmetryKey, TaskDocument};

pub trait DocumentStore: Send + Sync {
    /// Return the current value of counter `name` and advance it by one, atomically.
    /// A counter that was never set starts at 1.
    fn fetch_and_increment(&self, name: &str) -> Result<u64>;

    /// Make `next` the value returned by the next [`Self::fetch_and_increment`].
    fn reset_counter(&self, name: &str, next: u64) -> Result<()>;

    /// Insert a record; a duplicate `record_id` is an error.
    fn insert_record(&self, record: &StructureRecord) -> Result<()>;

    fn record(&self, record_id: u64) -> Result<Option<StructureRecord>>;

    fn group(&self, group_id: u64) -> Result<Option<StructureGroup>>;

    /// All groups sharing `key`, in no particular order.
    fn groups_with_key(&self, key: &SymmetryKey) -> Result<Vec<StructureGroup>>;

    /// Insert a group; a duplicate `group_id` is an error.
    fn insert_group(&self, group: &StructureGroup) -> Result<()>;

    /// Replace the stored group only if its revision still equals `expected_revision`.
    /// Returns `false` when another writer got there first.
    fn compare_and_swap_group(&self, group: &StructureGroup, expected_revision: u64)
    -> Result<bool>;

    fn find_task(&self, dir_name: &str) -> Result<Option<TaskDocument>>;

    /// Insert or replace the task stored under `task.dir_name`.
    fn upsert_task(&self, task: &TaskDocument) -> Result<()>;

    /// Store a payload under its content address. Storing the same bytes twice is a no-op.
    fn put_blob(&self, bucket: &str, payload: &[u8]) -> Result<BlobId>;

    fn get_blob(&self, bucket: &str, id: &BlobId) -> Result<Option<Vec<u8>>>;
}
