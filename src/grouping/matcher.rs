use crate::constants::GROUP_CAS_RETRIES;
use crate::error::{IngestError, Result};
use crate::grouping::StructureEquivalence;
use crate::store::DocumentStore;
use crate::types::{StructureGroup, StructureRecord};

/// Whether a successful match is written back to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Persist,
    /// Membership check only; the group is updated in memory and never written.
    DryRun,
}

/// Tests one group for membership and records the new member on a match.
pub struct StructureGroupMatcher<'a> {
    store: &'a dyn DocumentStore,
    equivalence: &'a dyn StructureEquivalence,
}

impl<'a> StructureGroupMatcher<'a> {
    pub fn new(store: &'a dyn DocumentStore, equivalence: &'a dyn StructureEquivalence) -> Self {
        Self { store, equivalence }
    }

    /// Pure membership predicate: key gate first, then the structural comparison.
    #[must_use]
    pub fn belongs(&self, group: &StructureGroup, candidate: &StructureRecord) -> bool {
        if group.key != candidate.key {
            return false;
        }
        group.contains(candidate.record_id)
            || self
                .equivalence
                .is_equivalent(&group.canonical_record, candidate)
    }

    /// On a match, add the candidate to `group` (and persist it in [`MatchMode::Persist`]).
    /// A non-matching group is left untouched.
    pub fn matches(
        &self,
        group: &mut StructureGroup,
        candidate: &StructureRecord,
        mode: MatchMode,
    ) -> Result<bool> {
        if !self.belongs(group, candidate) {
            return Ok(false);
        }
        match mode {
            MatchMode::DryRun => {
                group.add_member(candidate.record_id);
            }
            MatchMode::Persist => {
                self.persist_membership(group, candidate.record_id)?;
                tracing::info!(
                    target = "vasp_ingest::grouping",
                    record_id = candidate.record_id,
                    group_id = group.group_id,
                    num_members = group.num_members,
                    "match found, grouping record"
                );
            }
        }
        Ok(true)
    }

    /// Compare-and-swap loop on the group revision. A lost race reloads the stored
    /// group and re-applies the insertion, so no concurrent member is dropped.
    fn persist_membership(&self, group: &mut StructureGroup, record_id: u64) -> Result<()> {
        for attempt in 1..=GROUP_CAS_RETRIES {
            let expected = group.revision;
            let mut updated = group.clone();
            if !updated.add_member(record_id) {
                return Ok(());
            }
            updated.revision = expected + 1;
            if self.store.compare_and_swap_group(&updated, expected)? {
                *group = updated;
                return Ok(());
            }
            tracing::debug!(
                target = "vasp_ingest::grouping",
                group_id = group.group_id,
                record_id,
                attempt,
                "group changed concurrently; reloading"
            );
            *group = self
                .store
                .group(group.group_id)?
                .ok_or(IngestError::GroupNotFound {
                    group_id: group.group_id,
                })?;
        }
        Err(IngestError::Contention {
            group_id: group.group_id,
            attempts: GROUP_CAS_RETRIES,
        })
    }
}
