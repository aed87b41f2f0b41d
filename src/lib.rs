#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public entry points carry docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Casts are bounded by structure sizes and counter values.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)] // record_id, group_id, task_id
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)] // builders take owned values
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)] // option structs carry flags
#![allow(clippy::default_trait_access)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::unnecessary_wraps)]

/// The vasp-ingest-core crate version (matches `Cargo.toml`).
pub const VASP_INGEST_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod constants;
pub mod error;
pub mod grouping;
mod ids;
pub mod ingest;
mod lock;
pub mod signals;
pub mod store;
pub mod types;

pub use error::{IngestError, Result};
pub use grouping::{
    GroupRegistry, LatticeSiteMatcher, MatchMode, StructureEquivalence, StructureGroupMatcher,
    SymmetryAnalyzer,
};
pub use ids::IdAllocator;
pub use ingest::{
    Assimilated, IngestOutcome, LaunchDataSource, OutcarReader, OutcarSummary, RecordIngestor,
};
pub use lock::{FileLock, LockMode};
pub use signals::{ErrorSignalAggregator, SignalDetector, SignalDetectorList};
pub use store::{DocumentStore, FileStore, MemoryStore};
pub use types::{
    Analysis, BlobId, Calculation, CalculationOutput, EnrichmentFailure, ErrorAnalysis,
    HistoryNode, IngestOptions, IngestOptionsBuilder, Lattice, Provenance, SignalTag, Site,
    StoreConfig, Structure, StructureGroup, StructureNl, StructureRecord, SymmetryDescriptor,
    SymmetryKey, TaskDocument, TaskOutput, TaskState,
};
