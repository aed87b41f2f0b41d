use std::path::{Path, PathBuf};

use crate::constants::{RELAX1_DIR, RELAX2_DIR, REQUIRED_RUN_FILES};

/// A directory holds a usable run when every required file exists and is non-empty.
#[must_use]
pub fn is_valid_calc_dir(dir: &Path) -> bool {
    REQUIRED_RUN_FILES.iter().all(|name| {
        std::fs::metadata(dir.join(name))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    })
}

/// Directory holding the last relaxation stage of a run.
///
/// Runs with a provenance sidecar keep everything in `dir`. Legacy runs move the first
/// stage to `relax1`, run the second in place, then move it to `relax2`; a valid
/// `relax2` wins even when the base directory also holds (possibly broken) data.
#[must_use]
pub fn resolve_last_relax_dir(dir: &Path, new_style: bool) -> PathBuf {
    if new_style {
        return dir.to_path_buf();
    }
    let relax2 = dir.join(RELAX2_DIR);
    if is_valid_calc_dir(&relax2) {
        return relax2;
    }
    if is_valid_calc_dir(dir) {
        return dir.to_path_buf();
    }
    let relax1 = dir.join(RELAX1_DIR);
    if is_valid_calc_dir(&relax1) {
        return relax1;
    }
    dir.to_path_buf()
}
