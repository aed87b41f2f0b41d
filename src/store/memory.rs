use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::DocumentStore;
use super::blob::{content_id, validate_bucket};
use crate::error::{IngestError, Result};
use crate::types::{BlobId, StructureGroup, StructureRecord, SymmetryKey, TaskDocument};

#[derive(Debug, Default)]
struct MemoryState {
    counters: BTreeMap<String, u64>,
    records: BTreeMap<u64, StructureRecord>,
    groups: BTreeMap<u64, StructureGroup>,
    tasks: BTreeMap<String, TaskDocument>,
    blobs: BTreeMap<(String, BlobId), Vec<u8>>,
}

/// In-process store. Cloned handles are not shared; wrap it in an `Arc` instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| IngestError::Lock("memory store mutex poisoned".into()))
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.state.lock().map(|s| s.groups.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.state.lock().map(|s| s.tasks.len()).unwrap_or(0)
    }
}

impl DocumentStore for MemoryStore {
    fn fetch_and_increment(&self, name: &str) -> Result<u64> {
        let mut state = self.state()?;
        let counter = state.counters.entry(name.to_string()).or_insert(1);
        let current = *counter;
        *counter = current.checked_add(1).ok_or_else(|| IngestError::IdAllocation {
            name: name.to_string(),
            reason: "counter overflow".into(),
        })?;
        Ok(current)
    }

    fn reset_counter(&self, name: &str, next: u64) -> Result<()> {
        self.state()?.counters.insert(name.to_string(), next);
        Ok(())
    }

    fn insert_record(&self, record: &StructureRecord) -> Result<()> {
        let mut state = self.state()?;
        if state.records.contains_key(&record.record_id) {
            return Err(IngestError::invalid_document(format!(
                "record {} already exists",
                record.record_id
            )));
        }
        state.records.insert(record.record_id, record.clone());
        Ok(())
    }

    fn record(&self, record_id: u64) -> Result<Option<StructureRecord>> {
        Ok(self.state()?.records.get(&record_id).cloned())
    }

    fn group(&self, group_id: u64) -> Result<Option<StructureGroup>> {
        Ok(self.state()?.groups.get(&group_id).cloned())
    }

    fn groups_with_key(&self, key: &SymmetryKey) -> Result<Vec<StructureGroup>> {
        Ok(self
            .state()?
            .groups
            .values()
            .filter(|group| &group.key == key)
            .cloned()
            .collect())
    }

    fn insert_group(&self, group: &StructureGroup) -> Result<()> {
        let mut state = self.state()?;
        if state.groups.contains_key(&group.group_id) {
            return Err(IngestError::invalid_document(format!(
                "group {} already exists",
                group.group_id
            )));
        }
        state.groups.insert(group.group_id, group.clone());
        Ok(())
    }

    fn compare_and_swap_group(
        &self,
        group: &StructureGroup,
        expected_revision: u64,
    ) -> Result<bool> {
        let mut state = self.state()?;
        let Some(stored) = state.groups.get_mut(&group.group_id) else {
            return Err(IngestError::GroupNotFound {
                group_id: group.group_id,
            });
        };
        if stored.revision != expected_revision {
            return Ok(false);
        }
        *stored = group.clone();
        Ok(true)
    }

    fn find_task(&self, dir_name: &str) -> Result<Option<TaskDocument>> {
        Ok(self.state()?.tasks.get(dir_name).cloned())
    }

    fn upsert_task(&self, task: &TaskDocument) -> Result<()> {
        self.state()?
            .tasks
            .insert(task.dir_name.clone(), task.clone());
        Ok(())
    }

    fn put_blob(&self, bucket: &str, payload: &[u8]) -> Result<BlobId> {
        validate_bucket(bucket)?;
        let id = content_id(payload);
        self.state()?
            .blobs
            .entry((bucket.to_string(), id.clone()))
            .or_insert_with(|| payload.to_vec());
        Ok(id)
    }

    fn get_blob(&self, bucket: &str, id: &BlobId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .state()?
            .blobs
            .get(&(bucket.to_string(), id.clone()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_one_and_reset() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch_and_increment("c").unwrap(), 1);
        assert_eq!(store.fetch_and_increment("c").unwrap(), 2);
        store.reset_counter("c", 40).unwrap();
        assert_eq!(store.fetch_and_increment("c").unwrap(), 40);
        assert_eq!(store.fetch_and_increment("other").unwrap(), 1);
    }

    #[test]
    fn blobs_are_deduplicated_by_content() {
        let store = MemoryStore::new();
        let a = store.put_blob("dos_fs", b"{}").unwrap();
        let b = store.put_blob("dos_fs", b"{}").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get_blob("dos_fs", &a).unwrap().unwrap(), b"{}");
        assert!(store.get_blob("band_structure_fs", &a).unwrap().is_none());
    }
}
