use std::collections::BTreeSet;
use std::path::Path;

use super::detectors::{DiskSpaceExceededSignal, Relax2ExistsSignal, WallTimeSignal};
use super::layout::resolve_last_relax_dir;
use super::{SignalDetector, SignalDetectorList};
use crate::constants::TASK_TYPE_OPTIMIZE;
use crate::types::{ErrorAnalysis, SignalTag, TaskDocument, TaskState};

/// Runs every detector that applies to a calculation and folds the result into an
/// [`ErrorAnalysis`].
pub struct ErrorSignalAggregator {
    standard: SignalDetectorList,
    /// Detectors that also look at the parent directory of legacy runs.
    job_level: SignalDetectorList,
}

impl Default for ErrorSignalAggregator {
    fn default() -> Self {
        let mut job_level = SignalDetectorList::new();
        job_level.push(WallTimeSignal);
        job_level.push(DiskSpaceExceededSignal);
        Self {
            standard: SignalDetectorList::standard(),
            job_level,
        }
    }
}

impl ErrorSignalAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the detectors run on the last relaxation directory.
    #[must_use]
    pub fn with_detectors(mut self, standard: SignalDetectorList) -> Self {
        self.standard = standard;
        self
    }

    #[must_use]
    pub fn analyze(
        &self,
        dir: &Path,
        new_style: bool,
        state: TaskState,
        task_type: &str,
    ) -> ErrorAnalysis {
        let last_relax_dir = resolve_last_relax_dir(dir, new_style);

        let mut signals = self.standard.detect_all(&last_relax_dir);
        if state == TaskState::Successful && task_type.contains(TASK_TYPE_OPTIMIZE) {
            signals.extend(Relax2ExistsSignal.detect(&last_relax_dir));
        }

        signals.extend(self.job_level.detect_all(dir));
        if !new_style {
            if let Some(parent) = dir.parent() {
                signals.extend(self.job_level.detect_all(parent));
            }
        }

        summarize(signals, last_relax_dir.as_path())
    }

    /// Attach the analysis to `doc` and downgrade a successful run that raised a
    /// critical signal.
    pub fn apply(&self, dir: &Path, new_style: bool, doc: &mut TaskDocument) {
        let analysis = self.analyze(dir, new_style, doc.state, &doc.task_type);
        if analysis.has_critical() && doc.downgrade() {
            tracing::warn!(
                target = "vasp_ingest::signals",
                dir = %dir.display(),
                critical = ?analysis.critical_signals,
                "critical signals found; marking task as error"
            );
        }
        doc.analysis.errors = Some(analysis);
    }
}

fn summarize(signals: BTreeSet<SignalTag>, last_relax_dir: &Path) -> ErrorAnalysis {
    let signals: Vec<SignalTag> = signals.into_iter().collect();
    let critical_signals: Vec<SignalTag> =
        signals.iter().filter(|tag| tag.is_critical()).cloned().collect();
    ErrorAnalysis {
        num_signals: signals.len(),
        num_critical: critical_signals.len(),
        signals,
        critical_signals,
        last_relax_dir: last_relax_dir.to_path_buf(),
    }
}
