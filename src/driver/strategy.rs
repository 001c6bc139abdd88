use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which allocation strategy the driver runs (ground:
/// `simulator.py::AllocationTypeEnum`). The CLI's `<strategy>` argument
/// parses directly into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    /// Task-by-task earliest-finish-time allocation.
    Heuristic,
    /// Joint branch-selection + timing CP solve, one instance at a time,
    /// each against the resource timeline left by every instance already
    /// committed.
    SingleInstanceCp,
    /// `SingleInstanceCp`, preceded by a heuristic pre-pass whose job
    /// starts seed the CP solve's warm-start hints.
    SingleInstanceCpWarm,
    /// Joint branch-selection + timing CP solve across every queued
    /// instance at once.
    AllInstanceCp,
    /// `AllInstanceCp`, preceded by a heuristic pre-pass for warm-start
    /// hints.
    AllInstanceCpWarm,
}

impl AllocationStrategy {
    pub fn is_warm(self) -> bool {
        matches!(self, AllocationStrategy::SingleInstanceCpWarm | AllocationStrategy::AllInstanceCpWarm)
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationStrategy::Heuristic => "HEURISTIC",
            AllocationStrategy::SingleInstanceCp => "SINGLE_INSTANCE_CP",
            AllocationStrategy::SingleInstanceCpWarm => "SINGLE_INSTANCE_CP_WARM",
            AllocationStrategy::AllInstanceCp => "ALL_INSTANCE_CP",
            AllocationStrategy::AllInstanceCpWarm => "ALL_INSTANCE_CP_WARM",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AllocationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEURISTIC" => Ok(AllocationStrategy::Heuristic),
            "SINGLE_INSTANCE_CP" => Ok(AllocationStrategy::SingleInstanceCp),
            "SINGLE_INSTANCE_CP_WARM" => Ok(AllocationStrategy::SingleInstanceCpWarm),
            "ALL_INSTANCE_CP" => Ok(AllocationStrategy::AllInstanceCp),
            "ALL_INSTANCE_CP_WARM" => Ok(AllocationStrategy::AllInstanceCpWarm),
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }
}
