use std::cmp::Reverse;
use std::sync::Arc;

use super::equivalence::{StructureEquivalence, SymmetryAnalyzer};
use super::matcher::{MatchMode, StructureGroupMatcher};
use crate::constants::SPACEGROUP_TOLERANCE;
use crate::error::Result;
use crate::ids::IdAllocator;
use crate::store::DocumentStore;
use crate::types::{StructureGroup, StructureNl, StructureRecord};

/// Owns group creation and membership. Every record handed to [`GroupRegistry::add_record`]
/// ends up in exactly one group whose key equals the record's key.
pub struct GroupRegistry {
    store: Arc<dyn DocumentStore>,
    ids: IdAllocator,
    equivalence: Box<dyn StructureEquivalence>,
    analyzer: Box<dyn SymmetryAnalyzer>,
}

impl GroupRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        equivalence: impl StructureEquivalence + 'static,
        analyzer: impl SymmetryAnalyzer + 'static,
    ) -> Self {
        Self {
            ids: IdAllocator::new(Arc::clone(&store)),
            store,
            equivalence: Box::new(equivalence),
            analyzer: Box::new(analyzer),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    fn matcher(&self) -> StructureGroupMatcher<'_> {
        StructureGroupMatcher::new(self.store.as_ref(), self.equivalence.as_ref())
    }

    /// Number, annotate, store and group a new structure.
    ///
    /// Returns the stored record and the id of the group it joined or founded.
    ///
    /// The record is stored before grouping. If grouping then fails (for example with
    /// [`crate::IngestError::Contention`]), the record stays stored without a group; pass it to
    /// [`Self::add_record`] to place it.
    pub fn add_structure(
        &self,
        nl: StructureNl,
        force_new: bool,
        group_guess: Option<u64>,
    ) -> Result<(StructureRecord, u64)> {
        let record_id = self.ids.next_record_id()?;
        let symmetry = self
            .analyzer
            .analyze(&nl.structure, SPACEGROUP_TOLERANCE)?
            .normalized();
        let record = StructureRecord::from_nl(nl, record_id, symmetry);
        self.store.insert_record(&record)?;
        tracing::debug!(
            target = "vasp_ingest::grouping",
            record_id,
            key = %record.key,
            "stored structure record"
        );
        let (group, _) = self.add_record(&record, force_new, group_guess)?;
        Ok((record, group.group_id))
    }

    /// Place `candidate` into a group: the guessed group if it matches, otherwise the
    /// first matching group sharing its key (largest first), otherwise a new group.
    ///
    /// Returns the group and whether it was newly created.
    pub fn add_record(
        &self,
        candidate: &StructureRecord,
        force_new: bool,
        group_guess: Option<u64>,
    ) -> Result<(StructureGroup, bool)> {
        if !force_new {
            if let Some(group) = self.find_match(candidate, group_guess, MatchMode::Persist)? {
                return Ok((group, false));
            }
        }

        let group_id = self.ids.next_group_id()?;
        let group = StructureGroup::new(group_id, candidate.clone());
        self.store.insert_group(&group)?;
        tracing::info!(
            target = "vasp_ingest::grouping",
            record_id = candidate.record_id,
            group_id,
            key = %group.key,
            forced = force_new,
            "created structure group"
        );
        Ok((group, true))
    }

    /// Dry-run of [`Self::add_record`]: the group `candidate` would join, if any.
    /// Nothing is written and no id is allocated.
    pub fn probe(
        &self,
        candidate: &StructureRecord,
        group_guess: Option<u64>,
    ) -> Result<Option<StructureGroup>> {
        self.find_match(candidate, group_guess, MatchMode::DryRun)
    }

    fn find_match(
        &self,
        candidate: &StructureRecord,
        group_guess: Option<u64>,
        mode: MatchMode,
    ) -> Result<Option<StructureGroup>> {
        let matcher = self.matcher();

        if let Some(guess_id) = group_guess {
            match self.store.group(guess_id)? {
                Some(mut group) => {
                    if matcher.matches(&mut group, candidate, mode)? {
                        return Ok(Some(group));
                    }
                    tracing::debug!(
                        target = "vasp_ingest::grouping",
                        record_id = candidate.record_id,
                        group_guess = guess_id,
                        "group guess did not match; scanning"
                    );
                }
                None => tracing::debug!(
                    target = "vasp_ingest::grouping",
                    record_id = candidate.record_id,
                    group_guess = guess_id,
                    "group guess not found; scanning"
                ),
            }
        }

        let mut candidates = self.store.groups_with_key(&candidate.key)?;
        candidates.sort_by_key(|group| (Reverse(group.num_members), group.group_id));
        tracing::debug!(
            target = "vasp_ingest::grouping",
            record_id = candidate.record_id,
            key = %candidate.key,
            candidates = candidates.len(),
            "scanning groups"
        );

        for mut group in candidates {
            if Some(group.group_id) == group_guess {
                continue;
            }
            if matcher.matches(&mut group, candidate, mode)? {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::error::IngestError;
    use crate::store::MemoryStore;
    use crate::types::{
        BlobId, Lattice, Provenance, Site, Structure, SymmetryDescriptor, SymmetryKey, TaskDocument,
    };

    fn cubic(species: &str, a: f64) -> Structure {
        Structure::new(Lattice::cubic(a), vec![Site::new(species, [0.0; 3])])
    }

    fn fm3m(_: &Structure, _: f64) -> Result<SymmetryDescriptor> {
        Ok(SymmetryDescriptor {
            spacegroup_number: 225,
            symbol: "Fm-3m".into(),
            hall: "-F 4 2 3".into(),
            crystal_system: "cubic".into(),
            lattice_type: "cubic".into(),
            point_group: "m-3m".into(),
        })
    }

    /// Same material when the lattice constants agree to 0.1 Å.
    fn close_lattice(a: &StructureRecord, b: &StructureRecord) -> bool {
        (a.structure.lattice.lengths()[0] - b.structure.lattice.lengths()[0]).abs() < 0.1
    }

    fn registry() -> GroupRegistry {
        GroupRegistry::new(Arc::new(MemoryStore::new()), close_lattice, fm3m)
    }

    fn nl(species: &str, a: f64) -> StructureNl {
        StructureNl::new(cubic(species, a), Provenance::default())
    }

    #[test]
    fn novel_key_founds_group() {
        let reg = registry();
        let (record, group_id) = reg.add_structure(nl("Cu", 3.6), false, None).unwrap();
        let group = reg.store().group(group_id).unwrap().unwrap();
        assert_eq!(group.num_members, 1);
        assert_eq!(group.canonical_record, record);
        assert_eq!(group.key, record.key);
    }

    #[test]
    fn equivalent_structure_joins_existing_group() {
        let reg = registry();
        let (_, first) = reg.add_structure(nl("Cu", 3.60), false, None).unwrap();
        let (second_record, second) = reg.add_structure(nl("Cu", 3.62), false, None).unwrap();
        assert_eq!(first, second);
        let group = reg.store().group(first).unwrap().unwrap();
        assert!(group.contains(second_record.record_id));
        assert_eq!(group.num_members, 2);
    }

    #[test]
    fn force_new_skips_matching() {
        let reg = registry();
        let (_, first) = reg.add_structure(nl("Cu", 3.60), false, None).unwrap();
        let (_, second) = reg.add_structure(nl("Cu", 3.60), true, None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn missing_guess_falls_back_to_scan() {
        let reg = registry();
        let (_, first) = reg.add_structure(nl("Cu", 3.60), false, None).unwrap();
        let (_, second) = reg.add_structure(nl("Cu", 3.61), false, Some(999)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn wrong_guess_falls_back_to_scan() {
        let reg = registry();
        let (_, cu) = reg.add_structure(nl("Cu", 3.60), false, None).unwrap();
        let (_, ag) = reg.add_structure(nl("Ag", 4.09), false, None).unwrap();
        let (_, joined) = reg.add_structure(nl("Cu", 3.61), false, Some(ag)).unwrap();
        assert_eq!(joined, cu);
        assert_eq!(reg.store().group(ag).unwrap().unwrap().num_members, 1);
    }

    #[test]
    fn probe_reports_without_writing() {
        let reg = registry();
        let (_, group_id) = reg.add_structure(nl("Cu", 3.60), false, None).unwrap();
        let candidate = StructureRecord::from_nl(nl("Cu", 3.61), 500, fm3m(&cubic("Cu", 3.61), 0.1).unwrap());

        let probed = reg.probe(&candidate, None).unwrap().unwrap();
        assert_eq!(probed.group_id, group_id);
        assert!(probed.contains(500));
        assert_eq!(reg.store().group(group_id).unwrap().unwrap().num_members, 1);

        let far = StructureRecord::from_nl(nl("Cu", 5.0), 501, fm3m(&cubic("Cu", 5.0), 0.1).unwrap());
        assert!(reg.probe(&far, None).unwrap().is_none());
        assert_eq!(reg.ids().next_group_id().unwrap(), 2);
    }

    /// Loses every compare-and-swap until `settled` is set.
    struct ContendedStore {
        inner: MemoryStore,
        settled: AtomicBool,
    }

    impl DocumentStore for ContendedStore {
        fn fetch_and_increment(&self, name: &str) -> Result<u64> {
            self.inner.fetch_and_increment(name)
        }
        fn reset_counter(&self, name: &str, next: u64) -> Result<()> {
            self.inner.reset_counter(name, next)
        }
        fn insert_record(&self, record: &StructureRecord) -> Result<()> {
            self.inner.insert_record(record)
        }
        fn record(&self, record_id: u64) -> Result<Option<StructureRecord>> {
            self.inner.record(record_id)
        }
        fn group(&self, group_id: u64) -> Result<Option<StructureGroup>> {
            self.inner.group(group_id)
        }
        fn groups_with_key(&self, key: &SymmetryKey) -> Result<Vec<StructureGroup>> {
            self.inner.groups_with_key(key)
        }
        fn insert_group(&self, group: &StructureGroup) -> Result<()> {
            self.inner.insert_group(group)
        }
        fn compare_and_swap_group(&self, group: &StructureGroup, expected_revision: u64) -> Result<bool> {
            if self.settled.load(Ordering::SeqCst) {
                self.inner.compare_and_swap_group(group, expected_revision)
            } else {
                Ok(false)
            }
        }
        fn find_task(&self, dir_name: &str) -> Result<Option<TaskDocument>> {
            self.inner.find_task(dir_name)
        }
        fn upsert_task(&self, task: &TaskDocument) -> Result<()> {
            self.inner.upsert_task(task)
        }
        fn put_blob(&self, bucket: &str, payload: &[u8]) -> Result<BlobId> {
            self.inner.put_blob(bucket, payload)
        }
        fn get_blob(&self, bucket: &str, id: &BlobId) -> Result<Option<Vec<u8>>> {
            self.inner.get_blob(bucket, id)
        }
    }

    #[test]
    fn contended_record_stays_stored_and_can_be_regrouped() {
        let store = Arc::new(ContendedStore {
            inner: MemoryStore::new(),
            settled: AtomicBool::new(true),
        });
        let reg = GroupRegistry::new(Arc::clone(&store) as Arc<dyn DocumentStore>, close_lattice, fm3m);
        let (_, group_id) = reg.add_structure(nl("Cu", 3.60), false, None).unwrap();

        store.settled.store(false, Ordering::SeqCst);
        let err = reg.add_structure(nl("Cu", 3.61), false, None).unwrap_err();
        assert!(matches!(err, IngestError::Contention { group_id: g, .. } if g == group_id));
        let orphan = store.record(2).unwrap().unwrap();
        assert!(!store.group(group_id).unwrap().unwrap().contains(orphan.record_id));

        store.settled.store(true, Ordering::SeqCst);
        let (group, created) = reg.add_record(&orphan, false, None).unwrap();
        assert!(!created);
        assert_eq!(group.group_id, group_id);
        assert_eq!(store.group(group_id).unwrap().unwrap().num_members, 2);
    }
}
