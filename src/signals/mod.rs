//! Error-signal detection over calculation directories.
//!
//! Detectors are pure predicates over on-disk artifacts; a missing directory or an
//! unreadable file yields no signal rather than an error. The aggregator resolves which
//! directory to inspect, unions detector output, and classifies the critical subset.

mod aggregate;
mod detectors;
mod layout;

use std::collections::BTreeSet;
use std::path::Path;

pub use aggregate::ErrorSignalAggregator;
pub use detectors::{
    DiskSpaceExceededSignal, HitAMemberSignal, InputsExistSignal, OutputsExistSignal,
    Relax2ExistsSignal, SegFaultSignal, VaspOutSignal, VaspStartedCompletedSignal, WallTimeSignal,
};
pub use layout::{is_valid_calc_dir, resolve_last_relax_dir};

use crate::types::SignalTag;

pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag>;
}

/// Ordered detector list; results are unioned, so order never changes the outcome.
#[derive(Default)]
pub struct SignalDetectorList {
    detectors: Vec<Box<dyn SignalDetector>>,
}

impl SignalDetectorList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Detectors run against the last relaxation directory of every task.
    #[must_use]
    pub fn standard() -> Self {
        let mut list = Self::new();
        list.push(InputsExistSignal);
        list.push(OutputsExistSignal);
        list.push(VaspOutSignal);
        list.push(HitAMemberSignal);
        list.push(SegFaultSignal);
        list.push(VaspStartedCompletedSignal);
        list
    }

    pub fn push(&mut self, detector: impl SignalDetector + 'static) {
        self.detectors.push(Box::new(detector));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    #[must_use]
    pub fn detect_all(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let mut signals = BTreeSet::new();
        for detector in &self.detectors {
            let found = detector.detect(dir);
            if !found.is_empty() {
                tracing::debug!(
                    target = "vasp_ingest::signals",
                    detector = detector.name(),
                    dir = %dir.display(),
                    signals = ?found,
                    "detector fired"
                );
            }
            signals.extend(found);
        }
        signals
    }
}
