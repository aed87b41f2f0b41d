//! Directory-backed store shared by independent worker processes.
//!
//! Layout under the store root:
//! - `store.lock`: advisory lock; shared for reads, exclusive for writes.
//! - `counters.json`: named id counters.
//! - `records/<record_id>.json`, `groups/<group_id>.json`: one document per entity.
//! - `group_keys/<hash>.json`: ids of the groups sharing one symmetry key.
//! - `tasks/<hash>.json`: task documents keyed by a hash of their `dir_name`.
//! - `blobs/<bucket>/<blake3>`: content-addressed payloads.
//!
//! Documents are replaced through `atomic-write-file`, so a crashed writer never leaves a
//! torn document behind.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::DocumentStore;
use super::blob::{content_id, validate_blob_id, validate_bucket};
use crate::error::{IngestError, Result};
use crate::lock::{FileLock, LockMode};
use crate::types::{BlobId, StoreConfig, StructureGroup, StructureRecord, SymmetryKey, TaskDocument};

const LOCK_FILE: &str = "store.lock";
const COUNTERS_FILE: &str = "counters.json";
const RECORDS_DIR: &str = "records";
const GROUPS_DIR: &str = "groups";
const GROUP_KEYS_DIR: &str = "group_keys";
const TASKS_DIR: &str = "tasks";
const BLOBS_DIR: &str = "blobs";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [RECORDS_DIR, GROUPS_DIR, GROUP_KEYS_DIR, TASKS_DIR, BLOBS_DIR] {
            std::fs::create_dir_all(root.join(dir)).map_err(|err| {
                IngestError::StoreUnavailable {
                    path: root.clone(),
                    reason: err.to_string(),
                }
            })?;
        }
        tracing::debug!(target = "vasp_ingest::store", root = %root.display(), "opened file store");
        Ok(Self { root })
    }

    /// Open the database named by `config.db` below `base`.
    pub fn open_with_config(base: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            target = "vasp_ingest::store",
            host = %config.host,
            port = config.port,
            db = %config.db,
            authenticated = config.username.is_some(),
            "opening store"
        );
        Self::open(base.as_ref().join(&config.db))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self, mode: LockMode) -> Result<FileLock> {
        FileLock::acquire(&self.root.join(LOCK_FILE), mode)
    }

    fn record_path(&self, record_id: u64) -> PathBuf {
        self.root.join(RECORDS_DIR).join(format!("{record_id}.json"))
    }

    fn group_path(&self, group_id: u64) -> PathBuf {
        self.root.join(GROUPS_DIR).join(format!("{group_id}.json"))
    }

    fn group_key_path(&self, key: &SymmetryKey) -> Result<PathBuf> {
        let encoded = serde_json::to_vec(key)?;
        Ok(self
            .root
            .join(GROUP_KEYS_DIR)
            .join(format!("{}.json", blake3::hash(&encoded).to_hex())))
    }

    fn task_path(&self, dir_name: &str) -> PathBuf {
        self.root
            .join(TASKS_DIR)
            .join(format!("{}.json", blake3::hash(dir_name.as_bytes()).to_hex()))
    }

    fn blob_path(&self, bucket: &str, id: &BlobId) -> PathBuf {
        self.root.join(BLOBS_DIR).join(bucket).join(&id.0)
    }

    fn read_counters(&self) -> Result<BTreeMap<String, u64>> {
        Ok(read_json(&self.root.join(COUNTERS_FILE))?.unwrap_or_default())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = AtomicWriteFile::options().open(path)?;
    file.write_all(bytes)?;
    file.commit()?;
    Ok(())
}

impl DocumentStore for FileStore {
    fn fetch_and_increment(&self, name: &str) -> Result<u64> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut counters = self.read_counters()?;
        let counter = counters.entry(name.to_string()).or_insert(1);
        let current = *counter;
        *counter = current.checked_add(1).ok_or_else(|| IngestError::IdAllocation {
            name: name.to_string(),
            reason: "counter overflow".into(),
        })?;
        write_json(&self.root.join(COUNTERS_FILE), &counters).map_err(|err| {
            IngestError::IdAllocation {
                name: name.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(current)
    }

    fn reset_counter(&self, name: &str, next: u64) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut counters = self.read_counters()?;
        counters.insert(name.to_string(), next);
        write_json(&self.root.join(COUNTERS_FILE), &counters)
    }

    fn insert_record(&self, record: &StructureRecord) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let path = self.record_path(record.record_id);
        if path.exists() {
            return Err(IngestError::invalid_document(format!(
                "record {} already exists",
                record.record_id
            )));
        }
        write_json(&path, record)
    }

    fn record(&self, record_id: u64) -> Result<Option<StructureRecord>> {
        let _lock = self.lock(LockMode::Shared)?;
        read_json(&self.record_path(record_id))
    }

    fn group(&self, group_id: u64) -> Result<Option<StructureGroup>> {
        let _lock = self.lock(LockMode::Shared)?;
        read_json(&self.group_path(group_id))
    }

    fn groups_with_key(&self, key: &SymmetryKey) -> Result<Vec<StructureGroup>> {
        let _lock = self.lock(LockMode::Shared)?;
        let ids: Vec<u64> = read_json(&self.group_key_path(key)?)?.unwrap_or_default();
        let mut groups = Vec::with_capacity(ids.len());
        for group_id in ids {
            match read_json::<StructureGroup>(&self.group_path(group_id))? {
                Some(group) if &group.key == key => groups.push(group),
                Some(_) => {}
                None => tracing::warn!(
                    target = "vasp_ingest::store",
                    group_id,
                    key = %key,
                    "key index references a missing group"
                ),
            }
        }
        Ok(groups)
    }

    fn insert_group(&self, group: &StructureGroup) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let path = self.group_path(group.group_id);
        if path.exists() {
            return Err(IngestError::invalid_document(format!(
                "group {} already exists",
                group.group_id
            )));
        }
        write_json(&path, group)?;

        let index_path = self.group_key_path(&group.key)?;
        let mut ids: Vec<u64> = read_json(&index_path)?.unwrap_or_default();
        if !ids.contains(&group.group_id) {
            ids.push(group.group_id);
        }
        write_json(&index_path, &ids)
    }

    fn compare_and_swap_group(
        &self,
        group: &StructureGroup,
        expected_revision: u64,
    ) -> Result<bool> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let path = self.group_path(group.group_id);
        let Some(stored) = read_json::<StructureGroup>(&path)? else {
            return Err(IngestError::GroupNotFound {
                group_id: group.group_id,
            });
        };
        if stored.revision != expected_revision {
            return Ok(false);
        }
        write_json(&path, group)?;
        Ok(true)
    }

    fn find_task(&self, dir_name: &str) -> Result<Option<TaskDocument>> {
        let _lock = self.lock(LockMode::Shared)?;
        let found: Option<TaskDocument> = read_json(&self.task_path(dir_name))?;
        // Guard against hash collisions.
        Ok(found.filter(|task| task.dir_name == dir_name))
    }

    fn upsert_task(&self, task: &TaskDocument) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        write_json(&self.task_path(&task.dir_name), task)
    }

    fn put_blob(&self, bucket: &str, payload: &[u8]) -> Result<BlobId> {
        validate_bucket(bucket)?;
        let id = content_id(payload);
        let _lock = self.lock(LockMode::Exclusive)?;
        let path = self.blob_path(bucket, &id);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_bytes(&path, payload)?;
        }
        Ok(id)
    }

    fn get_blob(&self, bucket: &str, id: &BlobId) -> Result<Option<Vec<u8>>> {
        validate_bucket(bucket)?;
        validate_blob_id(id)?;
        let _lock = self.lock(LockMode::Shared)?;
        match std::fs::read(self.blob_path(bucket, id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
