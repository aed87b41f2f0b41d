//! Structure records (structure plus provenance) and their groups.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::structure::{Structure, SymmetryDescriptor, SymmetryKey};

/// One step in a record's history, e.g. the optimization that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryNode {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Value,
}

/// Who made a structure, where it came from, and what happened to it since.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub references: String,
    #[serde(default)]
    pub remarks: Vec<String>,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default)]
    pub history: Vec<HistoryNode>,
}

/// A structure with provenance that has not been numbered yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureNl {
    pub structure: Structure,
    #[serde(default)]
    pub provenance: Provenance,
}

impl StructureNl {
    #[must_use]
    pub fn new(structure: Structure, provenance: Provenance) -> Self {
        Self {
            structure,
            provenance,
        }
    }
}

/// A numbered, symmetry-annotated structure record. Never mutated after numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub record_id: u64,
    pub structure: Structure,
    #[serde(default)]
    pub provenance: Provenance,
    pub symmetry: SymmetryDescriptor,
    pub key: SymmetryKey,
    pub created_at: DateTime<Utc>,
}

impl StructureRecord {
    #[must_use]
    pub fn from_nl(nl: StructureNl, record_id: u64, symmetry: SymmetryDescriptor) -> Self {
        let key = SymmetryKey::derive(&nl.structure, &symmetry);
        Self {
            record_id,
            structure: nl.structure,
            provenance: nl.provenance,
            symmetry,
            key,
            created_at: Utc::now(),
        }
    }

    /// Provenance-preserving copy with a replacement structure, ready for renumbering.
    #[must_use]
    pub fn derive_nl(&self, structure: Structure, history: HistoryNode) -> StructureNl {
        let mut provenance = self.provenance.clone();
        provenance.history.push(history);
        StructureNl::new(structure, provenance)
    }
}

/// Structurally equivalent records under one canonical representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureGroup {
    pub group_id: u64,
    pub canonical_record: StructureRecord,
    pub all_record_ids: BTreeSet<u64>,
    pub num_members: usize,
    pub key: SymmetryKey,
    /// Bumped on every persisted change; writers compare-and-swap on it.
    #[serde(default)]
    pub revision: u64,
}

impl StructureGroup {
    #[must_use]
    pub fn new(group_id: u64, canonical_record: StructureRecord) -> Self {
        let mut all_record_ids = BTreeSet::new();
        all_record_ids.insert(canonical_record.record_id);
        Self {
            group_id,
            key: canonical_record.key.clone(),
            canonical_record,
            all_record_ids,
            num_members: 1,
            revision: 0,
        }
    }

    #[must_use]
    pub fn contains(&self, record_id: u64) -> bool {
        self.all_record_ids.contains(&record_id)
    }

    /// Add a member id. Returns `false` when it was already present.
    pub fn add_member(&mut self, record_id: u64) -> bool {
        let inserted = self.all_record_ids.insert(record_id);
        self.num_members = self.all_record_ids.len();
        inserted
    }
}
