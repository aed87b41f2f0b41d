//! Group placement: ordering, guesses, key isolation and concurrent membership writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vasp_ingest_core::{
    DocumentStore, FileStore, GroupRegistry, Lattice, MemoryStore, Provenance, Result, Site,
    Structure, StructureNl, StructureRecord, SymmetryDescriptor,
};

fn fcc(species: &str, a: f64) -> StructureNl {
    let sites = [[0.0, 0.0, 0.0], [0.0, 0.5, 0.5], [0.5, 0.0, 0.5], [0.5, 0.5, 0.0]]
        .into_iter()
        .map(|coords| Site::new(species, coords))
        .collect();
    StructureNl::new(Structure::new(Lattice::cubic(a), sites), Provenance::default())
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

fn lattice_constant(record: &StructureRecord) -> f64 {
    record.structure.lattice.lengths()[0]
}

/// Same material when the cubic lattice constants agree within 0.05 Å.
fn close(a: &StructureRecord, b: &StructureRecord) -> bool {
    (lattice_constant(a) - lattice_constant(b)).abs() < 0.05
}

fn always(_: &StructureRecord, _: &StructureRecord) -> bool {
    true
}

/// Three same-key groups with 3, 2 and 1 members at a = 3.0, 3.5 and 4.0 Å.
fn three_groups(store: &Arc<dyn DocumentStore>) -> (GroupRegistry, [u64; 3]) {
    let registry = GroupRegistry::new(Arc::clone(store), close, fm3m);
    let (_, large) = registry.add_structure(fcc("Cu", 3.00), true, None).unwrap();
    registry.add_structure(fcc("Cu", 3.01), false, None).unwrap();
    registry.add_structure(fcc("Cu", 3.02), false, None).unwrap();
    let (_, medium) = registry.add_structure(fcc("Cu", 3.50), true, None).unwrap();
    registry.add_structure(fcc("Cu", 3.51), false, None).unwrap();
    let (_, small) = registry.add_structure(fcc("Cu", 4.00), true, None).unwrap();
    (registry, [large, medium, small])
}

fn candidate(registry: &GroupRegistry, species: &str, a: f64) -> StructureRecord {
    let nl = fcc(species, a);
    let symmetry = fm3m(&nl.structure, 0.1).unwrap();
    StructureRecord::from_nl(nl, registry.ids().next_record_id().unwrap(), symmetry)
}

#[test]
fn second_largest_group_is_joined_when_only_it_matches() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let (registry, [large, medium, small]) = three_groups(&store);
    assert_eq!(store.group(large).unwrap().unwrap().num_members, 3);
    assert_eq!(store.group(medium).unwrap().unwrap().num_members, 2);

    let record = candidate(&registry, "Cu", 3.52);
    let (group, created) = registry.add_record(&record, false, None).unwrap();
    assert!(!created);
    assert_eq!(group.group_id, medium);
    assert_eq!(store.group(medium).unwrap().unwrap().num_members, 3);
    assert_eq!(store.group(large).unwrap().unwrap().num_members, 3);
    assert_eq!(store.group(small).unwrap().unwrap().num_members, 1);
}

#[test]
fn largest_group_wins_when_several_match() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let (_, [large, _, _]) = three_groups(&store);
    let permissive = GroupRegistry::new(Arc::clone(&store), always, fm3m);
    let record = candidate(&permissive, "Cu", 9.0);
    assert_eq!(permissive.probe(&record, None).unwrap().unwrap().group_id, large);
}

#[test]
fn equal_sizes_prefer_lower_group_id() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let registry = GroupRegistry::new(Arc::clone(&store), always, fm3m);
    let (_, first) = registry.add_structure(fcc("Ni", 3.5), true, None).unwrap();
    let (_, second) = registry.add_structure(fcc("Ni", 3.6), true, None).unwrap();
    assert!(first < second);
    let record = candidate(&registry, "Ni", 3.55);
    assert_eq!(registry.probe(&record, None).unwrap().unwrap().group_id, first);
}

#[test]
fn guess_only_shortcuts_when_it_matches() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let (registry, [large, medium, small]) = three_groups(&store);
    let record = candidate(&registry, "Cu", 3.49);

    for guess in [None, Some(large), Some(medium), Some(small), Some(10_000)] {
        let group = registry.probe(&record, guess).unwrap().unwrap();
        assert_eq!(group.group_id, medium, "guess {guess:?} changed the outcome");
    }

    let permissive = GroupRegistry::new(Arc::clone(&store), always, fm3m);
    let matched = permissive.probe(&record, Some(small)).unwrap().unwrap();
    assert_eq!(matched.group_id, small);
}

#[test]
fn different_keys_never_share_a_group() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    // Spacegroup follows the lattice constant, so the key varies with both species and size.
    let analyzer = |structure: &Structure, _: f64| -> Result<SymmetryDescriptor> {
        let a = structure.lattice.lengths()[0];
        Ok(SymmetryDescriptor {
            spacegroup_number: 200 + (a.round() as i32),
            ..SymmetryDescriptor::unknown()
        })
    };
    let registry = GroupRegistry::new(Arc::clone(&store), always, analyzer);

    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let species = ["Cu", "Ag", "Au", "Ni"];
    let mut keys_by_group: BTreeMap<u64, BTreeSet<String>> = BTreeMap::new();
    for _ in 0..60 {
        let element = species[rng.usize(..species.len())];
        let a = 3.0 + f64::from(rng.u8(0..4));
        let (record, group_id) = registry.add_structure(fcc(element, a), false, None).unwrap();
        keys_by_group.entry(group_id).or_default().insert(record.key.to_string());
    }

    let mut seen = BTreeSet::new();
    for (group_id, keys) in &keys_by_group {
        assert_eq!(keys.len(), 1, "group {group_id} mixes keys {keys:?}");
        let key = keys.iter().next().unwrap();
        assert!(seen.insert(key.clone()), "key {key} split across groups");
        let group = store.group(*group_id).unwrap().unwrap();
        assert_eq!(&group.key.to_string(), key);
    }
}

#[test]
fn concurrent_joins_keep_every_member() {
    let dir = TempDir::new().unwrap();
    let seed: Arc<dyn DocumentStore> = Arc::new(FileStore::open(dir.path()).unwrap());
    let seed_registry = GroupRegistry::new(Arc::clone(&seed), always, fm3m);
    let (_, group_id) = seed_registry.add_structure(fcc("Cu", 3.6), false, None).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let root = dir.path().to_path_buf();
            thread::spawn(move || {
                let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(&root).unwrap());
                let registry = GroupRegistry::new(store, always, fm3m);
                (0..5)
                    .map(|_| registry.add_structure(fcc("Cu", 3.6), false, None).unwrap())
                    .map(|(record, joined)| {
                        assert_eq!(joined, group_id);
                        record.record_id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let joined: Vec<u64> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();

    let group = seed.group(group_id).unwrap().unwrap();
    assert_eq!(group.num_members, 21);
    assert!(joined.iter().all(|id| group.contains(*id)));
    assert_eq!(group.revision, 20);
}

#[test]
fn file_store_groups_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let (record, group_id) = {
        let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(dir.path()).unwrap());
        GroupRegistry::new(store, close, fm3m)
            .add_structure(fcc("Al", 4.05), false, None)
            .unwrap()
    };

    let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(dir.path()).unwrap());
    let stored = store.record(record.record_id).unwrap().unwrap();
    assert_eq!(stored.key, record.key);
    assert_eq!(stored.structure.formula(), "Al4");
    let registry = GroupRegistry::new(Arc::clone(&store), close, fm3m);
    let (_, joined) = registry.add_structure(fcc("Al", 4.04), false, None).unwrap();
    assert_eq!(joined, group_id);
    assert_eq!(store.groups_with_key(&record.key).unwrap().len(), 1);
}
