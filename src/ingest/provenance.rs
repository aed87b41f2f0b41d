//! Workflow provenance sidecar and directory-name normalization.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{BLOCK_PREFIX, PROVENANCE_SIDECAR};
use crate::error::{IngestError, Result};
use crate::types::StructureRecord;

/// Contents of `FW.json`, written by the workflow engine next to each run.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvenanceSidecar {
    #[serde(rename = "fw_id")]
    pub workflow_id: u64,
    pub spec: SidecarSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarSpec {
    #[serde(rename = "mpsnl", default)]
    pub record: Option<StructureRecord>,
    #[serde(rename = "snlgroup_id", default)]
    pub group_id: Option<u64>,
    pub task_type: String,
    #[serde(rename = "vaspinputset_name", default)]
    pub input_set_name: Option<String>,
}

#[must_use]
pub fn sidecar_path(dir: &Path) -> PathBuf {
    dir.join(PROVENANCE_SIDECAR)
}

/// Read the sidecar of `dir`. `Ok(None)` when there is none (legacy layout).
pub fn read_sidecar(dir: &Path) -> Result<Option<ProvenanceSidecar>> {
    let path = sidecar_path(dir);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| IngestError::InvalidSidecar {
            path,
            reason: err.to_string(),
        })
}

/// Split a parser-reported `host:/path` into `(dir_name, dir_name_full)`.
///
/// `dir_name_full` is the path with the host removed; `dir_name` keeps it from the first
/// `block_` component on, so the same run is recognised wherever the tree was mounted.
#[must_use]
pub fn normalize_dir_name(reported: &str) -> (String, String) {
    let full = match reported.split_once(':') {
        Some((_, path)) => path,
        None => reported,
    };
    (block_part(full).to_string(), full.to_string())
}

#[must_use]
pub fn block_part(path: &str) -> &str {
    path.find(BLOCK_PREFIX).map_or(path, |start| &path[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn host_prefix_and_mount_point_are_stripped() {
        let (dir_name, full) =
            normalize_dir_name("node7.nersc.gov:/global/scratch/jobs/block_2013-01-02/launcher_7");
        assert_eq!(full, "/global/scratch/jobs/block_2013-01-02/launcher_7");
        assert_eq!(dir_name, "block_2013-01-02/launcher_7");
    }

    #[test]
    fn path_without_host_or_block_is_kept() {
        let (dir_name, full) = normalize_dir_name("/tmp/run");
        assert_eq!(dir_name, "/tmp/run");
        assert_eq!(full, "/tmp/run");
    }

    #[test]
    fn missing_sidecar_is_legacy() {
        let dir = tempdir().unwrap();
        assert!(read_sidecar(dir.path()).unwrap().is_none());
    }

    #[test]
    fn sidecar_fields_are_mapped() {
        let dir = tempdir().unwrap();
        std::fs::write(
            sidecar_path(dir.path()),
            r#"{"fw_id": 42, "spec": {"task_type": "GGA static", "snlgroup_id": 7, "vaspinputset_name": "MPStaticVaspInputSet"}}"#,
        )
        .unwrap();
        let sidecar = read_sidecar(dir.path()).unwrap().unwrap();
        assert_eq!(sidecar.workflow_id, 42);
        assert_eq!(sidecar.spec.group_id, Some(7));
        assert_eq!(sidecar.spec.task_type, "GGA static");
        assert_eq!(sidecar.spec.input_set_name.as_deref(), Some("MPStaticVaspInputSet"));
        assert!(sidecar.spec.record.is_none());
    }

    #[test]
    fn malformed_sidecar_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(sidecar_path(dir.path()), "{not json").unwrap();
        assert!(matches!(
            read_sidecar(dir.path()),
            Err(IngestError::InvalidSidecar { .. })
        ));
    }
}
