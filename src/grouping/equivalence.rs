//! External collaborators of the grouping engine: symmetry analysis and the
//! structural-equivalence predicate.

use crate::error::Result;
use crate::types::{Structure, StructureRecord, SymmetryDescriptor};

/// Computes a symmetry descriptor for a structure at a given tolerance.
pub trait SymmetryAnalyzer: Send + Sync {
    fn analyze(&self, structure: &Structure, tolerance: f64) -> Result<SymmetryDescriptor>;
}

impl<F> SymmetryAnalyzer for F
where
    F: Fn(&Structure, f64) -> Result<SymmetryDescriptor> + Send + Sync,
{
    fn analyze(&self, structure: &Structure, tolerance: f64) -> Result<SymmetryDescriptor> {
        self(structure, tolerance)
    }
}

/// Decides whether `candidate` is the same material as a group's canonical record.
/// Only called for records that already share a symmetry key.
pub trait StructureEquivalence: Send + Sync {
    fn is_equivalent(&self, canonical: &StructureRecord, candidate: &StructureRecord) -> bool;
}

impl<F> StructureEquivalence for F
where
    F: Fn(&StructureRecord, &StructureRecord) -> bool + Send + Sync,
{
    fn is_equivalent(&self, canonical: &StructureRecord, candidate: &StructureRecord) -> bool {
        self(canonical, candidate)
    }
}

/// Cell-level comparison: same composition and site count, lattice lengths within a
/// relative tolerance, angles within `angle_tol` degrees, and every site of the canonical
/// cell paired with a same-species site of the candidate within `site_tol` (fractional,
/// minimum image). It does not search over origin shifts or cell choices.
#[derive(Debug, Clone, Copy)]
pub struct LatticeSiteMatcher {
    pub length_tol: f64,
    pub angle_tol: f64,
    pub site_tol: f64,
}

impl Default for LatticeSiteMatcher {
    fn default() -> Self {
        Self {
            length_tol: 0.2,
            angle_tol: 5.0,
            site_tol: 0.1,
        }
    }
}

impl LatticeSiteMatcher {
    #[must_use]
    pub fn structures_match(&self, a: &Structure, b: &Structure) -> bool {
        if a.nsites() != b.nsites() || a.composition() != b.composition() {
            return false;
        }
        self.lattices_match(a, b) && self.sites_match(a, b)
    }

    fn lattices_match(&self, a: &Structure, b: &Structure) -> bool {
        let (la, lb) = (sorted(a.lattice.lengths()), sorted(b.lattice.lengths()));
        let lengths_ok = la.iter().zip(&lb).all(|(x, y)| {
            let scale = x.abs().max(y.abs());
            scale == 0.0 || (x - y).abs() / scale <= self.length_tol
        });
        let (aa, ab) = (sorted(a.lattice.angles()), sorted(b.lattice.angles()));
        let angles_ok = aa
            .iter()
            .zip(&ab)
            .all(|(x, y)| (x - y).abs() <= self.angle_tol);
        lengths_ok && angles_ok
    }

    fn sites_match(&self, a: &Structure, b: &Structure) -> bool {
        let mut used = vec![false; b.sites.len()];
        for site in &a.sites {
            let paired = b.sites.iter().enumerate().position(|(idx, other)| {
                !used[idx]
                    && other.species == site.species
                    && periodic_distance(site.frac_coords, other.frac_coords) <= self.site_tol
            });
            match paired {
                Some(idx) => used[idx] = true,
                None => return false,
            }
        }
        true
    }
}

impl StructureEquivalence for LatticeSiteMatcher {
    fn is_equivalent(&self, canonical: &StructureRecord, candidate: &StructureRecord) -> bool {
        self.structures_match(&canonical.structure, &candidate.structure)
    }
}

fn sorted(mut values: [f64; 3]) -> [f64; 3] {
    values.sort_by(f64::total_cmp);
    values
}

/// Largest per-axis fractional separation under periodic boundary conditions.
fn periodic_distance(u: [f64; 3], v: [f64; 3]) -> f64 {
    (0..3)
        .map(|i| {
            let d = (u[i] - v[i]).rem_euclid(1.0);
            d.min(1.0 - d)
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lattice, Site};

    fn rocksalt(a: f64, shift: f64) -> Structure {
        Structure::new(
            Lattice::cubic(a),
            vec![
                Site::new("Na", [0.0 + shift, 0.0, 0.0]),
                Site::new("Cl", [0.5, 0.5, 0.5]),
            ],
        )
    }

    #[test]
    fn small_relaxation_still_matches() {
        let m = LatticeSiteMatcher::default();
        assert!(m.structures_match(&rocksalt(5.64, 0.0), &rocksalt(5.70, 0.02)));
    }

    #[test]
    fn wrapped_coordinates_match() {
        let m = LatticeSiteMatcher::default();
        assert!(m.structures_match(&rocksalt(5.64, 0.0), &rocksalt(5.64, 0.98)));
    }

    #[test]
    fn large_volume_change_does_not_match() {
        let m = LatticeSiteMatcher::default();
        assert!(!m.structures_match(&rocksalt(5.64, 0.0), &rocksalt(8.0, 0.0)));
    }

    #[test]
    fn different_species_do_not_match() {
        let m = LatticeSiteMatcher::default();
        let mut other = rocksalt(5.64, 0.0);
        other.sites[1].species = "Br".into();
        assert!(!m.structures_match(&rocksalt(5.64, 0.0), &other));
    }

    #[test]
    fn displaced_site_does_not_match() {
        let m = LatticeSiteMatcher::default();
        assert!(!m.structures_match(&rocksalt(5.64, 0.0), &rocksalt(5.64, 0.3)));
    }
}
