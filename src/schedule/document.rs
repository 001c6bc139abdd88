use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The canonical exchange format: produced only by allocation
/// strategies, read only by the driver or a subsequent warm-starting
/// strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleDocument {
    pub resources: Vec<String>,
    pub instances: Vec<InstanceRep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<SolutionMeta>,
    /// Running incremental objective, updated by the driver's merge
    /// rules. Distinct from `solution.objective`, which is only
    /// populated once the driver finalizes metadata.
    #[serde(default)]
    pub objective: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRep {
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRep {
    pub task: String,
    pub jobs: Vec<String>,
    pub deletes: Vec<String>,
    pub branch_cost: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRep {
    pub branch: String,
    pub resource: String,
    pub cost: i64,
    pub after: Vec<String>,
    pub instance: String,
    pub min_start_time: i64,
    pub release_time: i64,
    pub selected: bool,
    pub start: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRep {
    pub tasks: BTreeMap<String, TaskRep>,
    pub resources: Vec<String>,
    pub branches: BTreeMap<String, BranchRep>,
    pub jobs: BTreeMap<String, JobRep>,
    pub fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<SolutionMeta>,
}

/// Per-solve or per-document metadata. `objective` is `NaN` for invalid
/// instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionMeta {
    pub objective: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimality_gap: Option<f64>,
    pub computing_time: f64,
    pub solver_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagations: Option<i64>,
    pub total_interval_length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
}

impl ScheduleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn union_resources(&mut self, incoming: &[String]) {
        for r in incoming {
            if !self.resources.contains(r) {
                self.resources.push(r.clone());
            }
        }
        self.resources.sort();
    }
}
