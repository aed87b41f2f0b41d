//! Store-backed monotonic id allocation for records, groups and tasks.

use std::sync::Arc;

use crate::constants::{COUNTER_GROUP, COUNTER_RECORD, COUNTER_TASK, TASK_ID_PREFIX};
use crate::error::Result;
use crate::store::DocumentStore;

/// Hands out ids through the store's atomic fetch-and-increment, so ids stay unique
/// across independent processes sharing one store. Never caches a counter locally.
#[derive(Clone)]
pub struct IdAllocator {
    store: Arc<dyn DocumentStore>,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn next_record_id(&self) -> Result<u64> {
        self.next(COUNTER_RECORD)
    }

    pub fn next_group_id(&self) -> Result<u64> {
        self.next(COUNTER_GROUP)
    }

    /// Task ids carry the `mp-` prefix.
    pub fn next_task_id(&self) -> Result<String> {
        Ok(format!("{TASK_ID_PREFIX}{}", self.next(COUNTER_TASK)?))
    }

    /// Restart both structure counters; the next ids handed out are exactly these values.
    pub fn restart_at(&self, next_record_id: u64, next_group_id: u64) -> Result<()> {
        self.store.reset_counter(COUNTER_RECORD, next_record_id)?;
        self.store.reset_counter(COUNTER_GROUP, next_group_id)?;
        tracing::info!(
            target = "vasp_ingest::ids",
            next_record_id,
            next_group_id,
            "id counters restarted"
        );
        Ok(())
    }

    fn next(&self, counter: &str) -> Result<u64> {
        let id = self.store.fetch_and_increment(counter)?;
        tracing::trace!(target = "vasp_ingest::ids", counter, id, "allocated id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn counters_are_independent() {
        let ids = IdAllocator::new(Arc::new(MemoryStore::new()));
        assert_eq!(ids.next_record_id().unwrap(), 1);
        assert_eq!(ids.next_record_id().unwrap(), 2);
        assert_eq!(ids.next_group_id().unwrap(), 1);
        assert_eq!(ids.next_task_id().unwrap(), "mp-1");
    }

    #[test]
    fn restart_sets_next_values() {
        let ids = IdAllocator::new(Arc::new(MemoryStore::new()));
        ids.next_record_id().unwrap();
        ids.restart_at(100, 7).unwrap();
        assert_eq!(ids.next_record_id().unwrap(), 100);
        assert_eq!(ids.next_group_id().unwrap(), 7);
    }
}
