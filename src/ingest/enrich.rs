//! Task-type specific enrichment of parsed task documents.
//!
//! Every step returns [`IngestError::Enrichment`] for problems with the calculation's
//! own data; the ingestor records those on the document and carries on. Store errors
//! keep their own variants and abort ingestion.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use crate::constants::{
    BAND_STRUCTURE_BUCKET, BAND_STRUCTURE_STORED_KEYS, RELAX1_DIR, RELAX2_DIR,
    RUN_STATS_TIMING_KEYS, STATIC_STORED_KEYS,
};
use crate::error::{IngestError, Result};
use crate::store::DocumentStore;
use crate::types::TaskDocument;

pub(crate) const STEP_RELAX_OUTCAR: &str = "relax_outcar";
pub(crate) const STEP_RUN_STATS: &str = "run_stats";
pub(crate) const STEP_STATIC: &str = "static_stored_data";
pub(crate) const STEP_BAND_STRUCTURE: &str = "band_structure";

/// Stage key holding the summed timings of a two-stage relaxation.
pub const OVERALL_RUN_STATS: &str = "overall";

/// Parsed OUTCAR: the subdocument stored on the calculation plus its timing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcarSummary {
    pub document: Value,
    pub run_stats: BTreeMap<String, f64>,
}

/// Parses an OUTCAR file. Provided by the embedding application.
pub trait OutcarReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<OutcarSummary>;
}

impl<F> OutcarReader for F
where
    F: Fn(&Path) -> Result<OutcarSummary> + Send + Sync,
{
    fn read(&self, path: &Path) -> Result<OutcarSummary> {
        self(path)
    }
}

/// Data the workflow engine stored for the launch that produced a run.
pub trait LaunchDataSource: Send + Sync {
    /// `Ok(None)` when no launch matches.
    fn stored_data(
        &self,
        workflow_id: Option<u64>,
        dir_name: &str,
    ) -> Result<Option<BTreeMap<String, Value>>>;
}

impl<F> LaunchDataSource for F
where
    F: Fn(Option<u64>, &str) -> Result<Option<BTreeMap<String, Value>>> + Send + Sync,
{
    fn stored_data(
        &self,
        workflow_id: Option<u64>,
        dir_name: &str,
    ) -> Result<Option<BTreeMap<String, Value>>> {
        self(workflow_id, dir_name)
    }
}

/// Replace each stage's OUTCAR subdocument with a fresh parse of `relaxN/OUTCAR`
/// and record per-stage timings plus their sum under [`OVERALL_RUN_STATS`].
pub(crate) fn two_stage_run_stats(
    dir: &Path,
    doc: &mut TaskDocument,
    reader: &dyn OutcarReader,
) -> Result<()> {
    let mut run_stats = BTreeMap::new();
    let mut outcome = Ok(());
    for (index, stage) in [RELAX1_DIR, RELAX2_DIR].into_iter().enumerate() {
        let path = dir.join(stage).join("OUTCAR");
        let summary = match reader.read(&path) {
            Ok(summary) => summary,
            Err(err) => {
                outcome = Err(IngestError::enrichment(
                    STEP_RELAX_OUTCAR,
                    format!("{}: {err}", path.display()),
                ));
                break;
            }
        };
        let Some(calculation) = doc.calculations.get_mut(index) else {
            outcome = Err(IngestError::enrichment(
                STEP_RELAX_OUTCAR,
                format!("no calculation entry for {stage}"),
            ));
            break;
        };
        calculation.output.outcar = Some(summary.document);
        run_stats.insert(stage.to_string(), summary.run_stats);
    }

    if outcome.is_ok() {
        match overall_run_stats(&run_stats) {
            Ok(overall) => {
                run_stats.insert(OVERALL_RUN_STATS.to_string(), overall);
            }
            Err(reason) => outcome = Err(IngestError::enrichment(STEP_RUN_STATS, reason)),
        }
    }
    doc.run_stats = run_stats;
    outcome
}

/// Per-key sum over all stages, or the first stage lacking a timing key.
fn overall_run_stats(
    run_stats: &BTreeMap<String, BTreeMap<String, f64>>,
) -> std::result::Result<BTreeMap<String, f64>, String> {
    let mut overall = BTreeMap::new();
    for key in RUN_STATS_TIMING_KEYS {
        let mut total = 0.0;
        for (stage, stats) in run_stats {
            let value = stats
                .get(key)
                .ok_or_else(|| format!("{stage} has no '{key}'"))?;
            total += value;
        }
        overall.insert(key.to_string(), total);
    }
    Ok(overall)
}

fn launch_data(
    doc: &TaskDocument,
    launches: Option<&dyn LaunchDataSource>,
    step: &str,
) -> Result<BTreeMap<String, Value>> {
    let source =
        launches.ok_or_else(|| IngestError::enrichment(step, "no launch data source configured"))?;
    source
        .stored_data(doc.workflow_id, &doc.dir_name)
        .map_err(|err| IngestError::enrichment(step, err))?
        .ok_or_else(|| IngestError::enrichment(step, format!("no launch found for {}", doc.dir_name)))
}

fn copy_stored_keys(
    doc: &mut TaskDocument,
    data: &BTreeMap<String, Value>,
    keys: &[&str],
    step: &str,
) -> Result<()> {
    for key in keys {
        let value = data
            .get(*key)
            .ok_or_else(|| IngestError::enrichment(step, format!("launch data lacks '{key}'")))?;
        doc.stored_data.insert((*key).to_string(), value.clone());
    }
    Ok(())
}

/// Copy the symmetry analysis stored by the static launch.
pub(crate) fn process_static(
    doc: &mut TaskDocument,
    launches: Option<&dyn LaunchDataSource>,
) -> Result<()> {
    let data = launch_data(doc, launches, STEP_STATIC)?;
    copy_stored_keys(doc, &data, &STATIC_STORED_KEYS, STEP_STATIC)
}

/// Offload the band structure of the first calculation, then copy the k-path and
/// convert its k-point labels to coordinates.
///
/// The payload leaves the document even when the launch data step fails.
pub(crate) fn process_band_structure(
    doc: &mut TaskDocument,
    launches: Option<&dyn LaunchDataSource>,
    store: &dyn DocumentStore,
) -> Result<()> {
    let offloaded = offload_band_structure(doc, store)?;

    let data = launch_data(doc, launches, STEP_BAND_STRUCTURE)?;
    copy_stored_keys(doc, &data, &BAND_STRUCTURE_STORED_KEYS, STEP_BAND_STRUCTURE)?;

    if let Some(kpoints) = doc
        .stored_data
        .get_mut("kpath")
        .and_then(|kpath| kpath.get_mut("kpoints"))
        .and_then(Value::as_object_mut)
    {
        for (label, point) in kpoints.iter_mut() {
            let Some(text) = point.as_str() else {
                continue;
            };
            let coords = parse_kpoint(text).ok_or_else(|| {
                IngestError::enrichment(
                    STEP_BAND_STRUCTURE,
                    format!("k-point '{label}' is not three numbers: {text:?}"),
                )
            })?;
            *point = Value::from(coords.to_vec());
        }
    }

    if offloaded {
        Ok(())
    } else {
        Err(IngestError::enrichment(STEP_BAND_STRUCTURE, "no band structure payload"))
    }
}

/// Returns `false` when the first calculation carries no band structure.
fn offload_band_structure(doc: &mut TaskDocument, store: &dyn DocumentStore) -> Result<bool> {
    let Some(calculation) = doc.calculations.first_mut() else {
        return Ok(false);
    };
    let Some(payload) = calculation.band_structure.take() else {
        return Ok(false);
    };
    let bytes = serde_json::to_vec(&payload)?;
    let id = store.put_blob(BAND_STRUCTURE_BUCKET, &bytes)?;
    tracing::debug!(
        target = "vasp_ingest::ingest",
        dir_name = %doc.dir_name,
        blob = %id,
        bytes = bytes.len(),
        "offloaded band structure"
    );
    calculation.band_structure_fs_id = Some(id);
    Ok(true)
}

/// First three unsigned decimals in `text`, e.g. `"0.5 0.0 0.25"`.
#[must_use]
pub fn parse_kpoint(text: &str) -> Option<[f64; 3]> {
    static KPOINT_COORDS: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    let regex = KPOINT_COORDS.get_or_init(|| {
        Regex::new(r"([0-9.]+)\s+([0-9.]+)\s+([0-9.]+)").map_err(|err| err.to_string())
    });
    let regex = match regex {
        Ok(re) => re,
        Err(msg) => {
            tracing::error!(target = "vasp_ingest::ingest", error = %msg, "k-point regex init failed");
            return None;
        }
    };
    let caps = regex.captures(text)?;
    let mut coords = [0.0; 3];
    for (slot, index) in coords.iter_mut().zip(1..=3) {
        *slot = caps.get(index)?.as_str().parse().ok()?;
    }
    Some(coords)
}
