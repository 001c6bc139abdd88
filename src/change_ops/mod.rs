//! The Change-Operation Engine: rewrites a working process tree
//! so a chosen branch's jobs take the place of the original task, honoring
//! the branch's change type, and defers `delete` application to the end of
//! the allocation pass.

use crate::error::{Error, Result};
use crate::model::ids::{BranchKey, TaskKey};
use crate::model::{ChangeType, RaPst};

/// One deferred delete: the branch that was selected for a task whose
/// change type is `Delete`, the host task, and the release time in force
/// when the selection happened. Recorded as an append-only log rather than
/// an in-place tree edit, so that branches elsewhere referring to the
/// not-yet-deleted task stay legal during the pass.
#[derive(Debug, Clone)]
pub struct PendingDelete {
    pub branch: BranchKey,
    pub task: TaskKey,
    pub release_time: i64,
}

/// Applies chosen branches to a working [`RaPst`], one task (or one batch)
/// at a time.
#[derive(Debug, Default)]
pub struct ChangeOpEngine {
    pending_deletes: Vec<PendingDelete>,
}

impl ChangeOpEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_deletes(&self) -> &[PendingDelete] {
        &self.pending_deletes
    }

    /// Applies `branch` as the realization of `task`, assuming the
    /// branch's jobs already carry their computed `start` (written by the
    /// heuristic allocator's earliest-finish-time pass, or by a CP
    /// solve). Writes `expected_start`/`expected_end` on the host task
    /// and handles `insert-before`/`insert-after`/`replace`/`delete` per
    /// the branch's change type.
    pub fn apply_one(&mut self, ra_pst: &mut RaPst, task_key: TaskKey, branch_key: BranchKey, release_time: i64) -> Result<()> {
        let change_type = ra_pst.branches[branch_key].change_type;

        match change_type {
            ChangeType::Replace => {
                return Err(Error::UnsupportedChangeType(format!(
                    "task '{}' selected a replace-type branch; replace is not implemented for allocation",
                    ra_pst.tasks[task_key].id
                )));
            }
            ChangeType::Delete => {
                self.pending_deletes.push(PendingDelete { branch: branch_key, task: task_key, release_time });
            }
            ChangeType::InsertBefore | ChangeType::InsertAfter => {
                ra_pst.tasks[task_key].allocation = Some(branch_key);
            }
        }

        // Deletes declared by the branch (other tasks rendered unnecessary
        // by this choice) apply immediately: exclusion is a property of
        // the selection itself, not deferred like a host-task delete.
        let deletes = ra_pst.branches[branch_key].deletes.clone();
        for deleted_task in deletes {
            ra_pst.tasks[deleted_task].deleted = true;
        }

        self.write_expected_timing(ra_pst, task_key, branch_key);
        Ok(())
    }

    /// Batch entry point: applies every `(task, branch)` pair in
    /// `branch_map`, in the tasklist's process order, for instances whose
    /// branch choices were made all at once (e.g. by a CP solve) rather
    /// than task-by-task.
    pub fn apply_all(&mut self, ra_pst: &mut RaPst, branch_map: &std::collections::BTreeMap<TaskKey, BranchKey>, release_time: i64) -> Result<()> {
        for &task_key in &ra_pst.tasklist.clone() {
            if let Some(&branch_key) = branch_map.get(&task_key) {
                self.apply_one(ra_pst, task_key, branch_key, release_time)?;
            }
        }
        self.finalize_deferred_deletes(ra_pst);
        Ok(())
    }

    fn write_expected_timing(&self, ra_pst: &mut RaPst, task_key: TaskKey, branch_key: BranchKey) {
        let branch = &ra_pst.branches[branch_key];
        let mut start = None;
        let mut end = None;
        for &job_key in &branch.jobs {
            let job = &ra_pst.jobs[job_key];
            if let Some(s) = job.start {
                start = Some(start.map_or(s, |cur: i64| cur.min(s)));
                let e = s + job.cost;
                end = Some(end.map_or(e, |cur: i64| cur.max(e)));
            }
        }
        ra_pst.tasks[task_key].expected_start = start;
        ra_pst.tasks[task_key].expected_end = end;
    }

    /// Re-scans pending deletes after every task has been allocated. For
    /// each pending delete whose host task is still "live" (no real branch
    /// was ever allocated to it and it was not deleted by some other
    /// branch's `deletes` set in the meantime), applies the delete: marks
    /// the host deleted and propagates the branch's own `deletes` set.
    /// Pending deletes whose host was already superseded are dropped
    /// silently — a later branch claimed the task first.
    pub fn finalize_deferred_deletes(&mut self, ra_pst: &mut RaPst) {
        let pending = std::mem::take(&mut self.pending_deletes);
        for pd in pending {
            let task = &ra_pst.tasks[pd.task];
            if task.allocation.is_none() && !task.deleted {
                ra_pst.tasks[pd.task].deleted = true;
                ra_pst.tasks[pd.task].expected_start = Some(pd.release_time);
                ra_pst.tasks[pd.task].expected_end = Some(pd.release_time);
                let deletes = ra_pst.branches[pd.branch].deletes.clone();
                for deleted_task in deletes {
                    ra_pst.tasks[deleted_task].deleted = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FixtureChangeType, InstanceId, RaPstFixture};

    fn fixture() -> RaPstFixture {
        serde_json::from_value(serde_json::json!({
            "tasks": ["t1", "t2"],
            "branches": [
                {"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 3}]},
                {"task": "t2", "change_type": "Delete", "jobs": []},
            ]
        }))
        .unwrap()
    }

    #[test]
    fn insert_after_sets_allocation_and_timing() {
        let fx = fixture();
        let mut ra_pst = fx.build(InstanceId::new("i1"), 0).unwrap();
        let t1 = ra_pst.task_key("t1").unwrap();
        let b1 = ra_pst.tasks[t1].branches[0];
        ra_pst.jobs[ra_pst.branches[b1].jobs[0]].start = Some(0);

        let mut engine = ChangeOpEngine::new();
        engine.apply_one(&mut ra_pst, t1, b1, 0).unwrap();

        assert_eq!(ra_pst.tasks[t1].allocation, Some(b1));
        assert_eq!(ra_pst.tasks[t1].expected_start, Some(0));
        assert_eq!(ra_pst.tasks[t1].expected_end, Some(3));
    }

    #[test]
    fn delete_is_deferred_then_applied_at_finalize() {
        let fx = fixture();
        let mut ra_pst = fx.build(InstanceId::new("i1"), 0).unwrap();
        let t2 = ra_pst.task_key("t2").unwrap();
        let b2 = ra_pst.tasks[t2].branches[0];

        let mut engine = ChangeOpEngine::new();
        engine.apply_one(&mut ra_pst, t2, b2, 5).unwrap();
        assert!(!ra_pst.tasks[t2].deleted, "delete must be deferred, not immediate");
        assert_eq!(engine.pending_deletes().len(), 1);

        engine.finalize_deferred_deletes(&mut ra_pst);
        assert!(ra_pst.tasks[t2].deleted);
        assert_eq!(ra_pst.tasks[t2].expected_start, Some(5));
    }

    #[test]
    fn replace_is_unsupported() {
        let fixture: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1"],
            "branches": [{"task": "t1", "change_type": "Replace", "jobs": [{"id": "j1", "resource": "R1", "cost": 1}]}]
        }))
        .unwrap();
        let mut ra_pst = fixture.build(InstanceId::new("i1"), 0).unwrap();
        let t1 = ra_pst.task_key("t1").unwrap();
        let b1 = ra_pst.tasks[t1].branches[0];
        let mut engine = ChangeOpEngine::new();
        let err = engine.apply_one(&mut ra_pst, t1, b1, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChangeType(_)));
    }

    // FixtureChangeType::Delete must round-trip through the same serde
    // path the JSON fixtures above rely on.
    #[test]
    fn fixture_change_type_default_is_insert_after() {
        assert_eq!(FixtureChangeType::default(), FixtureChangeType::InsertAfter);
    }
}
