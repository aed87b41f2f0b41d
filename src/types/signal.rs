//! Anomaly tags raised by the signal detectors and their per-task summary.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Named anomaly observed in a calculation directory.
///
/// Tags compare, hash and sort by their wire name so [`SignalTag::Other`]
/// stays interchangeable with a known tag of the same name.
#[derive(Debug, Clone)]
pub enum SignalTag {
    InputsDontExist,
    OutputsDontExist,
    IncoherentPotcars,
    VaspHasntStarted,
    VaspHasntCompleted,
    ChargeUnconverged,
    NetworkQuiesced,
    HardKilled,
    AtomsTooClose,
    /// Cluster scheduler preempted the job.
    HitAMember,
    Segfault,
    WalltimeExceeded,
    DiskSpaceExceeded,
    NoRelax2,
    Other(String),
}

impl SignalTag {
    pub const KNOWN: [SignalTag; 14] = [
        SignalTag::InputsDontExist,
        SignalTag::OutputsDontExist,
        SignalTag::IncoherentPotcars,
        SignalTag::VaspHasntStarted,
        SignalTag::VaspHasntCompleted,
        SignalTag::ChargeUnconverged,
        SignalTag::NetworkQuiesced,
        SignalTag::HardKilled,
        SignalTag::AtomsTooClose,
        SignalTag::HitAMember,
        SignalTag::Segfault,
        SignalTag::WalltimeExceeded,
        SignalTag::DiskSpaceExceeded,
        SignalTag::NoRelax2,
    ];

    /// Tags that force a successful task to `error`.
    pub const CRITICAL: [SignalTag; 12] = [
        SignalTag::InputsDontExist,
        SignalTag::OutputsDontExist,
        SignalTag::IncoherentPotcars,
        SignalTag::VaspHasntStarted,
        SignalTag::VaspHasntCompleted,
        SignalTag::ChargeUnconverged,
        SignalTag::NetworkQuiesced,
        SignalTag::HardKilled,
        SignalTag::WalltimeExceeded,
        SignalTag::AtomsTooClose,
        SignalTag::DiskSpaceExceeded,
        SignalTag::NoRelax2,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InputsDontExist => "INPUTS_DONT_EXIST",
            Self::OutputsDontExist => "OUTPUTS_DONT_EXIST",
            Self::IncoherentPotcars => "INCOHERENT_POTCARS",
            Self::VaspHasntStarted => "VASP_HASNT_STARTED",
            Self::VaspHasntCompleted => "VASP_HASNT_COMPLETED",
            Self::ChargeUnconverged => "CHARGE_UNCONVERGED",
            Self::NetworkQuiesced => "NETWORK_QUIESCED",
            Self::HardKilled => "HARD_KILLED",
            Self::AtomsTooClose => "ATOMS_TOO_CLOSE",
            Self::HitAMember => "HIT_A_MEMBER",
            Self::Segfault => "SEGFAULT",
            Self::WalltimeExceeded => "WALLTIME_EXCEEDED",
            Self::DiskSpaceExceeded => "DISK_SPACE_EXCEEDED",
            Self::NoRelax2 => "NO_RELAX2",
            Self::Other(name) => name,
        }
    }

    /// Map a wire name back to a tag; unknown names become [`SignalTag::Other`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|tag| tag.as_str() == name)
            .cloned()
            .unwrap_or_else(|| Self::Other(name.to_string()))
    }

    #[must_use]
    pub fn is_critical(&self) -> bool {
        Self::CRITICAL.iter().any(|tag| tag == self)
    }
}

impl fmt::Display for SignalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for SignalTag {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for SignalTag {}

impl Hash for SignalTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for SignalTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SignalTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Serialize for SignalTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignalTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::parse(&name))
    }
}

/// Error-signal summary embedded in a task document under `analysis.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    /// Sorted, deduplicated.
    pub signals: Vec<SignalTag>,
    pub critical_signals: Vec<SignalTag>,
    pub num_signals: usize,
    pub num_critical: usize,
    pub last_relax_dir: PathBuf,
}

impl ErrorAnalysis {
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.num_critical > 0
    }
}
