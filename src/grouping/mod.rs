//! Structure deduplication: symmetry-key gating, membership tests and group placement.

mod equivalence;
mod matcher;
mod registry;

pub use equivalence::{LatticeSiteMatcher, StructureEquivalence, SymmetryAnalyzer};
pub use matcher::{MatchMode, StructureGroupMatcher};
pub use registry::GroupRegistry;
