//! Task documents: the persisted outcome of ingesting one calculation directory.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::StructureRecord;
use super::signal::ErrorAnalysis;
use crate::constants::{TASK_TYPE_BAND_STRUCTURE, TASK_TYPE_OPTIMIZE, TASK_TYPE_STATIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Successful,
    Error,
}

impl TaskState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content address of a payload held in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcar: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One VASP run inside a task (two for a two-stage relaxation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    #[serde(default)]
    pub output: CalculationOutput,
    /// Density of states; moved to the blob store before persisting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dos: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dos_fs_id: Option<BlobId>,
    /// Band structure; moved to the blob store before persisting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_structure: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_structure_fs_id: Option<BlobId>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Final (relaxed) structure as emitted by the parser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crystal: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorAnalysis>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An enrichment step that failed without aborting ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentFailure {
    pub step: String,
    pub reason: String,
}

/// Persisted result of one calculation directory, keyed by `dir_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Normalized directory identifier (upsert key).
    pub dir_name: String,
    #[serde(default)]
    pub dir_name_full: String,
    pub state: TaskState,
    #[serde(default)]
    pub task_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_set_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<StructureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_final: Option<StructureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id_final: Option<u64>,
    #[serde(default)]
    pub group_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub run_stats: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub stored_data: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichment_failures: Vec<EnrichmentFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Parser fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TaskDocument {
    /// Minimal document as a parser would hand it over; `dir_name` may carry a `host:` prefix.
    pub fn new(dir_name: impl Into<String>, state: TaskState, task_type: impl Into<String>) -> Self {
        Self {
            task_id: None,
            dir_name: dir_name.into(),
            dir_name_full: String::new(),
            state,
            task_type: task_type.into(),
            workflow_id: None,
            input_set_name: None,
            record: None,
            group_id: None,
            record_final: None,
            group_id_final: None,
            group_changed: false,
            output: None,
            calculations: Vec::new(),
            analysis: Analysis::default(),
            run_stats: BTreeMap::new(),
            stored_data: BTreeMap::new(),
            enrichment_failures: Vec::new(),
            last_updated: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_optimization(&self) -> bool {
        self.task_type.contains(TASK_TYPE_OPTIMIZE)
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.task_type.contains(TASK_TYPE_STATIC)
    }

    #[must_use]
    pub fn is_band_structure(&self) -> bool {
        self.task_type.contains(TASK_TYPE_BAND_STRUCTURE)
    }

    pub fn record_failure(&mut self, step: impl Into<String>, reason: impl Into<String>) {
        self.enrichment_failures.push(EnrichmentFailure {
            step: step.into(),
            reason: reason.into(),
        });
    }

    /// Downgrade `successful` to `error`. An `error` state never flips back.
    pub fn downgrade(&mut self) -> bool {
        if self.state == TaskState::Successful {
            self.state = TaskState::Error;
            return true;
        }
        false
    }
}
