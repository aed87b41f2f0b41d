use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::SignalDetector;
use super::layout::is_valid_calc_dir;
use crate::constants::{
    INPUT_FILES, JOB_ERROR_FILES, MARKER_ATOMS_TOO_CLOSE, MARKER_HARD_KILLED,
    MARKER_HIT_A_MEMBER, MARKER_NETWORK_QUIESCED, MARKER_POTCAR_TITLE, MARKER_PREEMPTED,
    MARKER_VASP_COMPLETED, MARKER_VASP_STARTED, MARKERS_CHARGE_UNCONVERGED, MARKERS_DISK_SPACE,
    MARKERS_SEGFAULT, MARKERS_WALLTIME, OUTPUT_FILES, RELAX1_DIR, RELAX2_DIR, VASP_STDOUT,
};
use crate::types::SignalTag;

// Log and OUTCAR files can reach hundreds of megabytes; markers live near the ends.
const MAX_SCAN_BYTES: u64 = 8 * 1024 * 1024;
const HEAD_BYTES: u64 = 4 * 1024;
const TAIL_BYTES: u64 = 64 * 1024;

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn read_head(path: &Path, limit: u64) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut buf = Vec::new();
    file.take(limit).read_to_end(&mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn read_tail(path: &Path, limit: u64) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(limit))).ok()?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Case-insensitive search for any of `markers` in the tails of `files`.
fn any_marker(dir: &Path, files: &[&str], markers: &[&str]) -> bool {
    let markers: Vec<String> = markers.iter().map(|m| m.to_lowercase()).collect();
    files
        .iter()
        .filter_map(|name| read_tail(&dir.join(name), MAX_SCAN_BYTES))
        .map(|text| text.to_lowercase())
        .any(|text| markers.iter().any(|m| text.contains(m.as_str())))
}

fn log_and_job_files() -> Vec<&'static str> {
    let mut files = vec![VASP_STDOUT];
    files.extend(JOB_ERROR_FILES);
    files
}

fn single(dir: &Path, fired: bool, tag: SignalTag) -> BTreeSet<SignalTag> {
    let mut signals = BTreeSet::new();
    if dir.is_dir() && fired {
        signals.insert(tag);
    }
    signals
}

/// Missing inputs and POSCAR/POTCAR species disagreement.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputsExistSignal;

impl InputsExistSignal {
    /// Species from the VASP 5 symbol line of a POSCAR; `None` for VASP 4 files.
    fn poscar_species(text: &str) -> Option<Vec<String>> {
        let line = text.lines().nth(5)?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty()
            || !tokens
                .iter()
                .all(|t| t.chars().all(|c| c.is_ascii_alphabetic() || c == '_' || c == '/'))
        {
            return None;
        }
        Some(tokens.iter().map(|t| element_of(t)).collect())
    }

    /// Element of each `TITEL = PAW_PBE Fe_pv 06Sep2000` line, in file order.
    ///
    /// Every block opens with its title, so the whole file is streamed from the start.
    fn potcar_species(path: &Path) -> Option<Vec<String>> {
        let reader = BufReader::new(File::open(path).ok()?);
        let mut species = Vec::new();
        for line in reader.split(b'\n') {
            let line = line.ok()?;
            let line = String::from_utf8_lossy(&line);
            if let Some(element) = Self::title_element(&line) {
                species.push(element);
            }
        }
        Some(species)
    }

    fn title_element(line: &str) -> Option<String> {
        if !line.contains(MARKER_POTCAR_TITLE) {
            return None;
        }
        let (_, rhs) = line.split_once('=')?;
        let tokens: Vec<&str> = rhs.split_whitespace().collect();
        tokens.get(1).or_else(|| tokens.first()).map(|t| element_of(t))
    }
}

fn element_of(symbol: &str) -> String {
    symbol
        .split(['_', '/'])
        .next()
        .unwrap_or(symbol)
        .to_string()
}

impl SignalDetector for InputsExistSignal {
    fn name(&self) -> &'static str {
        "inputs_exist"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let mut signals = BTreeSet::new();
        if !dir.is_dir() {
            return signals;
        }
        if !INPUT_FILES.iter().all(|f| is_non_empty_file(&dir.join(f))) {
            signals.insert(SignalTag::InputsDontExist);
            return signals;
        }
        let species = read_head(&dir.join("POSCAR"), HEAD_BYTES)
            .and_then(|poscar| Self::poscar_species(&poscar));
        if let Some(species) = species {
            let titles = Self::potcar_species(&dir.join("POTCAR")).unwrap_or_default();
            if !titles.is_empty() && titles != species {
                signals.insert(SignalTag::IncoherentPotcars);
            }
        }
        signals
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputsExistSignal;

impl SignalDetector for OutputsExistSignal {
    fn name(&self) -> &'static str {
        "outputs_exist"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let missing = !OUTPUT_FILES.iter().all(|f| is_non_empty_file(&dir.join(f)));
        single(dir, missing, SignalTag::OutputsDontExist)
    }
}

/// Fatal conditions reported on the VASP standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaspOutSignal;

impl SignalDetector for VaspOutSignal {
    fn name(&self) -> &'static str {
        "vasp_out"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let mut signals = BTreeSet::new();
        if !dir.is_dir() {
            return signals;
        }
        let Some(text) = read_tail(&dir.join(VASP_STDOUT), MAX_SCAN_BYTES) else {
            return signals;
        };
        let text = text.to_lowercase();
        let has = |marker: &str| text.contains(&marker.to_lowercase());
        if MARKERS_CHARGE_UNCONVERGED.iter().any(|m| has(m)) {
            signals.insert(SignalTag::ChargeUnconverged);
        }
        if has(MARKER_NETWORK_QUIESCED) {
            signals.insert(SignalTag::NetworkQuiesced);
        }
        if has(MARKER_HARD_KILLED) {
            signals.insert(SignalTag::HardKilled);
        }
        if has(MARKER_ATOMS_TOO_CLOSE) {
            signals.insert(SignalTag::AtomsTooClose);
        }
        signals
    }
}

/// The scheduler preempted the job.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitAMemberSignal;

impl SignalDetector for HitAMemberSignal {
    fn name(&self) -> &'static str {
        "hit_a_member"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let fired = any_marker(
            dir,
            &log_and_job_files(),
            &[MARKER_HIT_A_MEMBER, MARKER_PREEMPTED],
        );
        single(dir, fired, SignalTag::HitAMember)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SegFaultSignal;

impl SignalDetector for SegFaultSignal {
    fn name(&self) -> &'static str {
        "segfault"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let fired = any_marker(dir, &log_and_job_files(), &MARKERS_SEGFAULT);
        single(dir, fired, SignalTag::Segfault)
    }
}

/// Whether VASP wrote its OUTCAR header and its closing timing block.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaspStartedCompletedSignal;

impl SignalDetector for VaspStartedCompletedSignal {
    fn name(&self) -> &'static str {
        "vasp_started_completed"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let mut signals = BTreeSet::new();
        if !dir.is_dir() {
            return signals;
        }
        let outcar = dir.join("OUTCAR");
        let started = is_non_empty_file(&outcar)
            && read_head(&outcar, HEAD_BYTES).is_some_and(|head| head.contains(MARKER_VASP_STARTED));
        if !started {
            signals.insert(SignalTag::VaspHasntStarted);
            return signals;
        }
        let completed = read_tail(&outcar, TAIL_BYTES)
            .is_some_and(|tail| tail.contains(MARKER_VASP_COMPLETED));
        if !completed {
            signals.insert(SignalTag::VaspHasntCompleted);
        }
        signals
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WallTimeSignal;

impl SignalDetector for WallTimeSignal {
    fn name(&self) -> &'static str {
        "walltime"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let fired = any_marker(dir, &log_and_job_files(), &MARKERS_WALLTIME);
        single(dir, fired, SignalTag::WalltimeExceeded)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpaceExceededSignal;

impl SignalDetector for DiskSpaceExceededSignal {
    fn name(&self) -> &'static str {
        "disk_space"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let fired = any_marker(dir, &log_and_job_files(), &MARKERS_DISK_SPACE);
        single(dir, fired, SignalTag::DiskSpaceExceeded)
    }
}

/// A two-stage relaxation must have reached its second stage.
///
/// Fires when a `relax1` stage is present (as `dir` itself or a subdirectory) without a
/// valid `relax2` next to it. Quiet when `dir` is the `relax2` stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relax2ExistsSignal;

impl SignalDetector for Relax2ExistsSignal {
    fn name(&self) -> &'static str {
        "relax2_exists"
    }

    fn detect(&self, dir: &Path) -> BTreeSet<SignalTag> {
        let named = |stage: &str| dir.file_name().is_some_and(|name| name == stage);
        if named(RELAX2_DIR) {
            return BTreeSet::new();
        }
        let (has_first, second) = if named(RELAX1_DIR) {
            (true, dir.parent().map(|parent| parent.join(RELAX2_DIR)))
        } else {
            (dir.join(RELAX1_DIR).is_dir(), Some(dir.join(RELAX2_DIR)))
        };
        let has_second = second.is_some_and(|path| is_valid_calc_dir(&path));
        single(dir, has_first && !has_second, SignalTag::NoRelax2)
    }
}
