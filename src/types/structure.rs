//! Crystal structures, symmetry descriptors and the derived grouping key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Periodic lattice given by its three row vectors (Å).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    #[must_use]
    pub fn new(matrix: [[f64; 3]; 3]) -> Self {
        Self { matrix }
    }

    #[must_use]
    pub fn cubic(a: f64) -> Self {
        Self::new([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    /// Lengths `(a, b, c)`.
    #[must_use]
    pub fn lengths(&self) -> [f64; 3] {
        self.matrix.map(norm)
    }

    /// Angles `(alpha, beta, gamma)` in degrees.
    #[must_use]
    pub fn angles(&self) -> [f64; 3] {
        let [a, b, c] = self.matrix;
        [angle(b, c), angle(a, c), angle(a, b)]
    }
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn angle(u: [f64; 3], v: [f64; 3]) -> f64 {
    let denom = norm(u) * norm(v);
    if denom == 0.0 {
        return 0.0;
    }
    let cos = (u[0] * v[0] + u[1] * v[1] + u[2] * v[2]) / denom;
    cos.clamp(-1.0, 1.0).acos().to_degrees()
}

/// One atomic site in fractional coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub species: String,
    #[serde(alias = "abc")]
    pub frac_coords: [f64; 3],
}

impl Site {
    pub fn new(species: impl Into<String>, frac_coords: [f64; 3]) -> Self {
        Self {
            species: species.into(),
            frac_coords,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
}

impl Structure {
    #[must_use]
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    /// Parse the `crystal` subdocument emitted by the calculation parser.
    pub fn from_value(value: &Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    #[must_use]
    pub fn nsites(&self) -> usize {
        self.sites.len()
    }

    #[must_use]
    pub fn elements(&self) -> BTreeSet<&str> {
        self.sites.iter().map(|site| site.species.as_str()).collect()
    }

    #[must_use]
    pub fn nelements(&self) -> usize {
        self.elements().len()
    }

    /// Element counts, ordered by element symbol.
    #[must_use]
    pub fn composition(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.species.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Full cell formula, e.g. `Fe4 O6`.
    #[must_use]
    pub fn formula(&self) -> String {
        self.composition()
            .iter()
            .map(|(el, n)| format!("{el}{n}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Formula reduced by the greatest common divisor of the counts, e.g. `Fe2O3`.
    #[must_use]
    pub fn reduced_formula(&self) -> String {
        let composition = self.composition();
        let divisor = composition.values().copied().fold(0, gcd).max(1);
        composition
            .iter()
            .map(|(el, n)| match n / divisor {
                1 => el.clone(),
                reduced => format!("{el}{reduced}"),
            })
            .collect()
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Symmetry information reported by the external symmetry analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetryDescriptor {
    /// International space-group number, `-1` when the analyzer found none.
    pub spacegroup_number: i32,
    pub symbol: String,
    pub hall: String,
    pub crystal_system: String,
    pub lattice_type: String,
    pub point_group: String,
}

impl SymmetryDescriptor {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            spacegroup_number: -1,
            symbol: "unknown".into(),
            hall: "unknown".into(),
            crystal_system: "unknown".into(),
            lattice_type: "unknown".into(),
            point_group: "unknown".into(),
        }
    }

    /// Replace empty fields with the `unknown` placeholders.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.spacegroup_number <= 0 {
            self.spacegroup_number = -1;
        }
        for field in [
            &mut self.symbol,
            &mut self.hall,
            &mut self.crystal_system,
            &mut self.lattice_type,
            &mut self.point_group,
        ] {
            if field.trim().is_empty() {
                *field = "unknown".into();
            }
        }
        self
    }
}

/// Coarse pre-filter: records with different keys never share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymmetryKey {
    pub reduced_formula: String,
    pub spacegroup_number: i32,
    pub nelements: usize,
}

impl SymmetryKey {
    #[must_use]
    pub fn derive(structure: &Structure, symmetry: &SymmetryDescriptor) -> Self {
        Self {
            reduced_formula: structure.reduced_formula(),
            spacegroup_number: symmetry.spacegroup_number,
            nelements: structure.nelements(),
        }
    }
}

impl fmt::Display for SymmetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}--{}", self.reduced_formula, self.spacegroup_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hematite_cell() -> Structure {
        let mut sites = Vec::new();
        for i in 0..4 {
            sites.push(Site::new("Fe", [0.1 * i as f64, 0.0, 0.0]));
        }
        for i in 0..6 {
            sites.push(Site::new("O", [0.0, 0.1 * i as f64, 0.5]));
        }
        Structure::new(Lattice::cubic(5.0), sites)
    }

    #[test]
    fn formulas_are_sorted_and_reduced() {
        let s = hematite_cell();
        assert_eq!(s.formula(), "Fe4 O6");
        assert_eq!(s.reduced_formula(), "Fe2O3");
        assert_eq!(s.nelements(), 2);
        assert_eq!(s.nsites(), 10);
    }

    #[test]
    fn supercells_share_a_key() {
        let cell = hematite_cell();
        let mut half = cell.clone();
        half.sites.truncate(2);
        half.sites.extend(cell.sites.iter().filter(|site| site.species == "O").take(3).cloned());
        assert_eq!(half.nsites(), 5);
        let symmetry = SymmetryDescriptor::unknown();
        assert_eq!(SymmetryKey::derive(&cell, &symmetry), SymmetryKey::derive(&half, &symmetry));
    }

    #[test]
    fn single_element_reduces_to_symbol() {
        let s = Structure::new(
            Lattice::cubic(3.0),
            vec![Site::new("Si", [0.0; 3]), Site::new("Si", [0.25; 3])],
        );
        assert_eq!(s.reduced_formula(), "Si");
    }

    #[test]
    fn cubic_lattice_has_right_angles() {
        let lattice = Lattice::cubic(4.2);
        for len in lattice.lengths() {
            assert!((len - 4.2).abs() < 1e-12);
        }
        for ang in lattice.angles() {
            assert!((ang - 90.0).abs() < 1e-9);
        }
    }

    #[test]
    fn descriptor_normalization_fills_unknowns() {
        let d = SymmetryDescriptor {
            spacegroup_number: 0,
            symbol: String::new(),
            hall: "-P 4 2 3".into(),
            crystal_system: " ".into(),
            lattice_type: "cubic".into(),
            point_group: String::new(),
        }
        .normalized();
        assert_eq!(d.spacegroup_number, -1);
        assert_eq!(d.symbol, "unknown");
        assert_eq!(d.hall, "-P 4 2 3");
        assert_eq!(d.crystal_system, "unknown");
        assert_eq!(d.point_group, "unknown");
    }

    #[test]
    fn site_accepts_abc_alias() {
        let site: Site = serde_json::from_str(r#"{"species":"Na","abc":[0.5,0.5,0.5]}"#).unwrap();
        assert_eq!(site.frac_coords, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn key_display_joins_formula_and_spacegroup() {
        let s = hematite_cell();
        let mut d = SymmetryDescriptor::unknown();
        d.spacegroup_number = 167;
        assert_eq!(SymmetryKey::derive(&s, &d).to_string(), "Fe2O3--167");
    }
}
