//! Turning a parsed calculation directory into a persisted task document.

mod enrich;
mod provenance;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

pub use enrich::{LaunchDataSource, OVERALL_RUN_STATS, OutcarReader, OutcarSummary, parse_kpoint};
pub use provenance::{
    ProvenanceSidecar, SidecarSpec, block_part, normalize_dir_name, read_sidecar, sidecar_path,
};

use crate::constants::{
    DOS_BUCKET, OPTIMIZATION_HISTORY_NAME, OPTIMIZATION_HISTORY_URL, RELAX2_DIR,
    SIMULATED_TASK_ID,
};
use crate::error::{IngestError, Result};
use crate::grouping::GroupRegistry;
use crate::signals::ErrorSignalAggregator;
use crate::store::DocumentStore;
use crate::types::{HistoryNode, IngestOptions, Structure, StructureRecord, TaskDocument};

/// What [`RecordIngestor::assimilate`] did with a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    /// A task for the directory already existed; the stored document is returned.
    SkippedDuplicate,
    /// Simulate mode: nothing was read from or written to the store.
    Simulated,
}

#[derive(Debug, Clone)]
pub struct Assimilated {
    pub task_id: String,
    pub document: TaskDocument,
    pub outcome: IngestOutcome,
}

/// Persists parsed calculations: provenance, regrouping of optimized structures,
/// error signals and task-type enrichment, then an upsert keyed by directory.
pub struct RecordIngestor {
    store: Arc<dyn DocumentStore>,
    registry: GroupRegistry,
    options: IngestOptions,
    signals: ErrorSignalAggregator,
    outcar_reader: Option<Box<dyn OutcarReader>>,
    launches: Option<Box<dyn LaunchDataSource>>,
}

impl RecordIngestor {
    /// Tasks, records and groups all live in the registry's store.
    #[must_use]
    pub fn new(registry: GroupRegistry, options: IngestOptions) -> Self {
        Self {
            store: Arc::clone(registry.store()),
            registry,
            options,
            signals: ErrorSignalAggregator::new(),
            outcar_reader: None,
            launches: None,
        }
    }

    /// Enables OUTCAR re-parsing for two-stage relaxations.
    #[must_use]
    pub fn with_outcar_reader(mut self, reader: impl OutcarReader + 'static) -> Self {
        self.outcar_reader = Some(Box::new(reader));
        self
    }

    /// Enables static and band-structure enrichment.
    #[must_use]
    pub fn with_launch_data(mut self, launches: impl LaunchDataSource + 'static) -> Self {
        self.launches = Some(Box::new(launches));
        self
    }

    #[must_use]
    pub fn with_signal_aggregator(mut self, signals: ErrorSignalAggregator) -> Self {
        self.signals = signals;
        self
    }

    #[must_use]
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    #[must_use]
    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// Ingest the calculation in `dir`, described by the parser's `parsed` document.
    pub fn assimilate(&self, dir: &Path, mut parsed: TaskDocument) -> Result<Assimilated> {
        let (dir_name, dir_name_full) = normalize_dir_name(&parsed.dir_name);
        parsed.dir_name = dir_name;
        parsed.dir_name_full = dir_name_full;
        parsed.stored_data.clear();

        if self.options.simulate {
            parsed.task_id = Some(SIMULATED_TASK_ID.to_string());
            tracing::info!(
                target = "vasp_ingest::ingest",
                dir_name = %parsed.dir_name,
                task_id = SIMULATED_TASK_ID,
                "simulated insert"
            );
            return Ok(Assimilated {
                task_id: SIMULATED_TASK_ID.to_string(),
                document: parsed,
                outcome: IngestOutcome::Simulated,
            });
        }

        let existing = self.store.find_task(&parsed.dir_name)?;
        if let Some(existing) = &existing {
            if !self.options.update_duplicates {
                let task_id = stored_task_id(existing)?;
                tracing::info!(
                    target = "vasp_ingest::ingest",
                    dir_name = %existing.dir_name,
                    task_id = %task_id,
                    "skipping duplicate"
                );
                return Ok(Assimilated {
                    task_id,
                    document: existing.clone(),
                    outcome: IngestOutcome::SkippedDuplicate,
                });
            }
        }

        let mut doc = parsed;
        self.offload_dos(&mut doc)?;
        doc.last_updated = Some(Utc::now());

        let outcome = match &existing {
            Some(existing) => {
                doc.task_id = Some(stored_task_id(existing)?);
                IngestOutcome::Updated
            }
            None => {
                if doc.task_id.as_deref().is_none_or(str::is_empty) {
                    doc.task_id = Some(self.registry.ids().next_task_id()?);
                }
                IngestOutcome::Inserted
            }
        };

        self.process_provenance(dir, &mut doc)?;
        self.enrich(dir, &mut doc)?;

        self.store.upsert_task(&doc)?;
        let task_id = doc.task_id.clone().unwrap_or_default();
        tracing::info!(
            target = "vasp_ingest::ingest",
            dir_name = %doc.dir_name,
            task_id = %task_id,
            state = %doc.state,
            outcome = ?outcome,
            failures = doc.enrichment_failures.len(),
            "task stored"
        );
        Ok(Assimilated {
            task_id,
            document: doc,
            outcome,
        })
    }

    /// Apply the workflow sidecar, regroup an optimized structure and attach the
    /// error-signal analysis.
    pub fn process_provenance(&self, dir: &Path, doc: &mut TaskDocument) -> Result<()> {
        let sidecar = read_sidecar(dir)?;
        let new_style = sidecar.is_some();
        if let Some(sidecar) = sidecar {
            doc.workflow_id = Some(sidecar.workflow_id);
            doc.record = sidecar.spec.record;
            doc.group_id = sidecar.spec.group_id;
            doc.input_set_name = sidecar.spec.input_set_name;
            doc.task_type = sidecar.spec.task_type;
        }

        doc.record_final = doc.record.clone();
        doc.group_id_final = doc.group_id;
        doc.group_changed = false;

        if doc.is_optimization() {
            if let Some((record, group_id)) = self.regroup_optimized(doc)? {
                doc.group_changed = doc.group_id != Some(group_id);
                doc.record_final = Some(record);
                doc.group_id_final = Some(group_id);
            }
        }

        self.signals.apply(dir, new_style, doc);
        Ok(())
    }

    /// Register the optimized output structure as a new record derived from the
    /// input record, using the input's group as the placement guess.
    fn regroup_optimized(&self, doc: &mut TaskDocument) -> Result<Option<(StructureRecord, u64)>> {
        let Some(record) = doc.record.clone() else {
            return Ok(None);
        };
        let Some(crystal) = doc.output.as_ref().and_then(|output| output.crystal.as_ref()) else {
            return Ok(None);
        };
        let structure = match Structure::from_value(crystal) {
            Ok(structure) => structure,
            Err(err) => {
                settle(doc, Err(IngestError::enrichment("optimized_structure", err)))?;
                return Ok(None);
            }
        };

        let history = HistoryNode {
            name: OPTIMIZATION_HISTORY_NAME.to_string(),
            url: OPTIMIZATION_HISTORY_URL.to_string(),
            description: json!({
                "task_type": doc.task_type,
                "workflow_id": doc.workflow_id,
                "task_id": doc.task_id,
            }),
        };
        let nl = record.derive_nl(structure, history);
        let (record, group_id) =
            self.registry
                .add_structure(nl, self.options.force_new_group, doc.group_id)?;
        tracing::debug!(
            target = "vasp_ingest::ingest",
            dir_name = %doc.dir_name,
            record_id = record.record_id,
            group_id,
            "registered optimized structure"
        );
        Ok(Some((record, group_id)))
    }

    fn enrich(&self, dir: &Path, doc: &mut TaskDocument) -> Result<()> {
        if doc.is_optimization() && dir.join(RELAX2_DIR).exists() {
            match &self.outcar_reader {
                Some(reader) => {
                    let outcome = enrich::two_stage_run_stats(dir, doc, reader.as_ref());
                    settle(doc, outcome)?;
                }
                None => tracing::debug!(
                    target = "vasp_ingest::ingest",
                    dir_name = %doc.dir_name,
                    "no OUTCAR reader configured; keeping parser run stats"
                ),
            }
        }

        let launches = self.launches.as_deref();
        if doc.is_static() {
            let outcome = enrich::process_static(doc, launches);
            settle(doc, outcome)?;
        }
        if doc.is_band_structure() {
            let outcome = enrich::process_band_structure(doc, launches, self.store.as_ref());
            settle(doc, outcome)?;
        }
        Ok(())
    }

    fn offload_dos(&self, doc: &mut TaskDocument) -> Result<()> {
        for calculation in &mut doc.calculations {
            let Some(dos) = calculation.dos.take() else {
                continue;
            };
            let id = self.store.put_blob(DOS_BUCKET, &serde_json::to_vec(&dos)?)?;
            calculation.dos_fs_id = Some(id);
        }
        Ok(())
    }
}

/// Record an enrichment failure on the document; any other error aborts.
fn settle(doc: &mut TaskDocument, outcome: Result<()>) -> Result<()> {
    match outcome {
        Err(IngestError::Enrichment { step, reason }) => {
            tracing::warn!(
                target = "vasp_ingest::ingest",
                dir_name = %doc.dir_name,
                step = %step,
                reason = %reason,
                "enrichment step failed"
            );
            doc.record_failure(step, reason);
            Ok(())
        }
        other => other,
    }
}

fn stored_task_id(existing: &TaskDocument) -> Result<String> {
    existing
        .task_id
        .clone()
        .ok_or_else(|| IngestError::invalid_document(format!("stored task {} has no task_id", existing.dir_name)))
}
