use serde::{Deserialize, Serialize};

use crate::model::ids::{JobKey, TaskKey};

/// How a branch's sub-tasks are spliced into the working process tree by
/// the change-operation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    InsertBefore,
    InsertAfter,
    /// Not implemented for allocation; selecting a branch with this change
    /// type yields `Error::UnsupportedChangeType`.
    Replace,
    Delete,
}

/// One admissible realization of a task: the linearization of a chosen
/// resource's profile, in depth-first left-to-right order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub task: TaskKey,
    pub change_type: ChangeType,
    /// Jobs of this branch, in process order (left-to-right).
    pub jobs: Vec<JobKey>,
    /// Task ids this branch deletes when selected.
    pub deletes: Vec<TaskKey>,
    pub cost: i64,
}

impl Branch {
    pub fn new(task: TaskKey, change_type: ChangeType, jobs: Vec<JobKey>, deletes: Vec<TaskKey>, cost: i64) -> Self {
        Branch { task, change_type, jobs, deletes, cost }
    }
}
