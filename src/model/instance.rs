use std::collections::BTreeMap;

use crate::model::ids::{BranchKey, InstanceId, TaskKey};
use crate::model::rapst::RaPst;

/// A process instance: an identifier, a release time, and a privately
/// owned (deep-copied) RA-PST that mutations are applied to via the
/// change-operation engine.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub release_time: i64,
    pub ra_pst: RaPst,

    /// Branch chosen for each non-deleted task so far (ground:
    /// `Instance.applied_branches` / `branches_to_apply`).
    pub applied_branches: BTreeMap<TaskKey, BranchKey>,

    /// Index into `ra_pst.tasklist` of the task currently being allocated.
    pub cursor: usize,

    /// History of committed branch finish times, one entry per allocated
    /// task, kept for diagnostics and tests (ground: `Instance.times` in
    /// `allocate_next_task`, which accumulates one entry per task).
    pub recorded_times: Vec<i64>,

    /// Set once every branch of the current task has been found invalid.
    pub invalid: bool,

    /// Freezes this instance's selected jobs' starts for subsequent
    /// incremental CP solves.
    pub fixed: bool,
}

impl Instance {
    pub fn new(id: InstanceId, release_time: i64, ra_pst: RaPst) -> Self {
        Instance { id, release_time, ra_pst, applied_branches: BTreeMap::new(), cursor: 0, recorded_times: Vec::new(), invalid: false, fixed: false }
    }

    /// The task currently up for allocation, or `None` once the tasklist
    /// is exhausted (the original's sentinel `"end"`).
    pub fn current_task(&self) -> Option<TaskKey> {
        self.ra_pst.tasklist.get(self.cursor).copied()
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// The floor release time for whichever task is up next: the chosen
    /// branch's finish time becomes the next task's release time.
    pub fn next_release_time(&self) -> i64 {
        self.release_time
    }

    /// Commits a branch's finish time as the new floor for subsequent
    /// tasks and records it in the instance's history.
    pub fn commit_finish_time(&mut self, finish: i64) {
        self.release_time = self.release_time.max(finish);
        self.recorded_times.push(finish);
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.ra_pst.tasklist.len()
    }
}
