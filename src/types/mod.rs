//! Public types exposed by the `vasp-ingest-core` crate.

pub mod options;
pub mod record;
pub mod signal;
pub mod structure;
pub mod task;

pub use options::{IngestOptions, IngestOptionsBuilder, StoreConfig};
pub use record::{HistoryNode, Provenance, StructureGroup, StructureNl, StructureRecord};
pub use signal::{ErrorAnalysis, SignalTag};
pub use structure::{Lattice, Site, Structure, SymmetryDescriptor, SymmetryKey};
pub use task::{
    Analysis, BlobId, Calculation, CalculationOutput, EnrichmentFailure, TaskDocument, TaskOutput,
    TaskState,
};
