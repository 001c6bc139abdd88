use serde::{Deserialize, Serialize};

use crate::model::ids::{BranchKey, InstanceId, JobKey, ResourceId};

/// An atomic unit of resource time produced by a selected branch.
///
/// Within a branch, jobs are totally ordered left-to-right; `after` records
/// precedence edges (job ids that must end before this job starts), which
/// may reach outside the owning branch once a process has been rewritten
/// by the change-operation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub branch: BranchKey,
    pub resource: ResourceId,
    pub cost: i64,
    pub after: Vec<JobKey>,
    pub instance: InstanceId,

    /// Floor on `start` imposed by the branch's own linearization
    /// (finish time of the preceding sibling job within the branch).
    pub min_start_time: i64,

    /// Floor on `start` imposed by the owning instance's release time.
    pub release_time: i64,

    pub selected: bool,
    pub start: Option<i64>,
}

impl Job {
    pub fn new(id: impl Into<String>, branch: BranchKey, resource: ResourceId, cost: i64, instance: InstanceId, release_time: i64) -> Self {
        Job {
            id: id.into(),
            branch,
            resource,
            cost,
            after: Vec::new(),
            instance,
            min_start_time: release_time,
            release_time,
            selected: false,
            start: None,
        }
    }

    pub fn end(&self) -> Option<i64> {
        self.start.map(|s| s + self.cost)
    }
}
