//! Fixed names, markers and tuning values used across the crate.

/// Files that must exist with non-zero size for a directory to count as a
/// usable VASP run. OUTCAR and POSCAR are known to be empty in some failed runs.
pub const REQUIRED_RUN_FILES: [&str; 4] = ["OUTCAR", "POSCAR", "INCAR", "KPOINTS"];

pub const INPUT_FILES: [&str; 4] = ["INCAR", "POSCAR", "KPOINTS", "POTCAR"];
pub const OUTPUT_FILES: [&str; 3] = ["OUTCAR", "vasprun.xml", "CONTCAR"];

/// Provenance sidecar written by the workflow engine next to each launch.
pub const PROVENANCE_SIDECAR: &str = "FW.json";

pub const RELAX1_DIR: &str = "relax1";
pub const RELAX2_DIR: &str = "relax2";

/// Standard output of the VASP binary.
pub const VASP_STDOUT: &str = "vasp.out";
/// Job error/output files left by the queue adapter.
pub const JOB_ERROR_FILES: [&str; 2] = ["FW_job.error", "FW_job.out"];

/// Substrings matched in task types.
pub const TASK_TYPE_OPTIMIZE: &str = "optimize structure";
pub const TASK_TYPE_STATIC: &str = "static";
pub const TASK_TYPE_BAND_STRUCTURE: &str = "band structure";

/// Directory component from which normalized directory names start.
pub const BLOCK_PREFIX: &str = "block_";

/// Tolerance handed to the external symmetry analyzer.
pub const SPACEGROUP_TOLERANCE: f64 = 0.1;

/// Placeholder id reported by simulated (dry) ingestion.
pub const SIMULATED_TASK_ID: &str = "0";
pub const TASK_ID_PREFIX: &str = "mp-";

/// Counter names held by the id allocator.
pub const COUNTER_RECORD: &str = "next_record_id";
pub const COUNTER_GROUP: &str = "next_group_id";
pub const COUNTER_TASK: &str = "taskid";

/// Blob buckets for payloads too large to embed in a task document.
pub const DOS_BUCKET: &str = "dos_fs";
pub const BAND_STRUCTURE_BUCKET: &str = "band_structure_fs";

/// Keys copied from launch stored data for static runs.
pub const STATIC_STORED_KEYS: [&str; 4] = [
    "conventional_standard_structure",
    "symmetry_operations",
    "symmetry_dataset",
    "refined_structure",
];
/// Keys copied from launch stored data for band-structure runs.
pub const BAND_STRUCTURE_STORED_KEYS: [&str; 2] = ["kpath_name", "kpath"];

/// Timing entries summed across the two stages of a relaxation.
pub const RUN_STATS_TIMING_KEYS: [&str; 4] = [
    "Total CPU time used (sec)",
    "User time (sec)",
    "System time (sec)",
    "Elapsed time (sec)",
];

/// History entry attached to records produced by a structure optimization.
pub const OPTIMIZATION_HISTORY_NAME: &str = "Materials Project structure optimization";
pub const OPTIMIZATION_HISTORY_URL: &str = "http://www.materialsproject.org";

/// Bounded retries when a group document changes between read and write.
pub const GROUP_CAS_RETRIES: usize = 16;

/// Environment variable pointing at the directory holding the store config.
pub const CONFIG_DIR_ENV: &str = "DB_LOC";
pub const CONFIG_FILE_NAME: &str = "store_db.json";

pub const DEFAULT_STORE_HOST: &str = "localhost";
pub const DEFAULT_STORE_PORT: u16 = 27017;
pub const DEFAULT_STORE_DB: &str = "snl";

// Textual markers scanned by the signal detectors.
pub const MARKERS_CHARGE_UNCONVERGED: [&str; 3] = [
    "Error EDDDAV: Call to ZHEGV failed",
    "ZBRENT: fatal error in bracketing",
    "BRIONS problems: POTIM should be increased",
];
pub const MARKER_NETWORK_QUIESCED: &str = "network quiesced";
pub const MARKER_HARD_KILLED: &str = "killed by signal 9";
pub const MARKER_ATOMS_TOO_CLOSE: &str = "The distance between some ions is very small";
pub const MARKER_HIT_A_MEMBER: &str = "hit a member";
pub const MARKER_PREEMPTED: &str = "preempted";
pub const MARKERS_SEGFAULT: [&str; 2] = ["segmentation fault", "SIGSEGV"];
pub const MARKERS_WALLTIME: [&str; 3] = [
    "job exceeded walltime",
    "DUE TO TIME LIMIT",
    "walltime exceeded",
];
pub const MARKERS_DISK_SPACE: [&str; 2] = ["No space left on device", "Disk quota exceeded"];
pub const MARKER_VASP_STARTED: &str = "vasp.";
pub const MARKER_VASP_COMPLETED: &str = "General timing and accounting informations";
pub const MARKER_POTCAR_TITLE: &str = "TITEL";
