use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::model::branch::{Branch, ChangeType};
use crate::model::ids::{BranchKey, JobKey, ResourceId, TaskId, TaskKey};
use crate::model::job::Job;
use crate::model::task::Task;

/// A read-only view of one branch, used by the CP adapter and the flat
/// `branches_ilp` accessor (ground: `RA_PST.get_branches_ilp` /
/// `get_ilp_rep` in the original Python source).
#[derive(Debug, Clone)]
pub struct BranchView {
    pub key: BranchKey,
    pub jobs: Vec<JobKey>,
    pub deletes: Vec<TaskKey>,
    pub cost: i64,
}

/// Resource-Augmented Process Structure Tree: an immutable, read-only
/// process annotated with every admissible resource realization per task.
///
/// Stored as flat arenas keyed by `slotmap` keys rather than a mutable XML
/// DOM, so that parent/child/`after` edges are plain index edges and deep
/// copies (one per instance) are cheap.
#[derive(Debug, Clone)]
pub struct RaPst {
    pub tasks: SlotMap<TaskKey, Task>,
    pub branches: SlotMap<BranchKey, Branch>,
    pub jobs: SlotMap<JobKey, Job>,
    /// Tasks in process order; this is the order branch enumeration and
    /// the heuristic allocator iterate in.
    pub tasklist: Vec<TaskKey>,
    pub task_by_id: HashMap<String, TaskKey>,
    pub resources: BTreeSet<ResourceId>,
}

impl RaPst {
    pub fn new() -> Self {
        RaPst { tasks: SlotMap::with_key(), branches: SlotMap::with_key(), jobs: SlotMap::with_key(), tasklist: Vec::new(), task_by_id: HashMap::new(), resources: BTreeSet::new() }
    }

    pub fn task_key(&self, id: &str) -> Option<TaskKey> {
        self.task_by_id.get(id).copied()
    }

    /// Process-ordered list of task ids (ground: `get_tasklist`).
    pub fn tasklist(&self) -> Vec<TaskId> {
        self.tasklist.iter().map(|k| TaskId::new(self.tasks[*k].id.clone())).collect()
    }

    /// Global resource catalog referenced anywhere in the tree (ground:
    /// `get_resourcelist`).
    pub fn resourcelist(&self) -> Vec<ResourceId> {
        self.resources.iter().cloned().collect()
    }

    /// Every branch of every task, keyed by task id, in branch-index order
    /// (ground: `get_branches_ilp`).
    pub fn branches_ilp(&self) -> BTreeMap<String, Vec<BranchView>> {
        let mut out: BTreeMap<String, Vec<BranchView>> = BTreeMap::new();
        for &task_key in &self.tasklist {
            let task = &self.tasks[task_key];
            let views = task
                .branches
                .iter()
                .map(|&bk| {
                    let b = &self.branches[bk];
                    BranchView { key: bk, jobs: b.jobs.clone(), deletes: b.deletes.clone(), cost: b.cost }
                })
                .collect();
            out.insert(task.id.clone(), views);
        }
        out
    }

    /// Branches of other tasks whose `deletes` set contains `task`, plus
    /// the task's own branches. This is the exclusion-cardinality group:
    /// `sum(presence) over this group == 1`.
    pub fn exclusion_group(&self, task_key: TaskKey) -> Vec<BranchKey> {
        let mut group: Vec<BranchKey> = self.tasks[task_key].branches.clone();
        for (bk, branch) in self.branches.iter() {
            if branch.deletes.contains(&task_key) && !group.contains(&bk) {
                group.push(bk);
            }
        }
        group
    }

    /// Checks a branch is admissible in isolation: every job's resource is
    /// in the catalog, and no job in the branch depends (`after`) on a job
    /// belonging to an already-deleted task (ground: `check_validity` used
    /// by `simulator.py::single_task_processing`).
    pub fn check_branch_validity(&self, branch_key: BranchKey) -> bool {
        let branch = &self.branches[branch_key];
        for &jk in &branch.jobs {
            let job = &self.jobs[jk];
            if !self.resources.contains(&job.resource) {
                return false;
            }
            for &pred in &job.after {
                let pred_task = self.branches[self.jobs[pred].branch].task;
                if self.tasks[pred_task].deleted && !branch.jobs.contains(&pred) {
                    return false;
                }
            }
        }
        true
    }

    /// Validates the selection invariant over the whole tree. A live task
    /// must have exactly one branch selected across its exclusion group
    /// (its own branches, plus any branch elsewhere that deletes it). A
    /// deleted task satisfies this either through a foreign branch's own
    /// `deletes` list — that branch carries its own jobs and is the one
    /// counted as selected in the group, giving `selected_count == 1` —
    /// or by choosing its own empty-job `Delete`-type branch, which
    /// `branch_selected` never counts as selected, giving
    /// `selected_count == 0`. Either is legal; more than one selected
    /// branch in the group never is, and a deleted task's own branches
    /// must never carry a selection of their own.
    pub fn check_selection_invariants(&self) -> Result<()> {
        for &task_key in &self.tasklist {
            let task = &self.tasks[task_key];
            let group = self.exclusion_group(task_key);
            let selected_count = group.iter().filter(|&&bk| self.branch_selected(bk)).count();
            if task.deleted {
                if selected_count > 1 {
                    return Err(Error::InvalidRAPST(format!(
                        "deleted task {} has {} selected branches in its exclusion group, expected at most 1",
                        task.id, selected_count
                    )));
                }
                let own_selected = task.branches.iter().filter(|&&bk| self.branch_selected(bk)).count();
                if own_selected != 0 {
                    return Err(Error::InvalidRAPST(format!("deleted task {} has a selected branch of its own", task.id)));
                }
            } else if selected_count != 1 {
                return Err(Error::InvalidRAPST(format!(
                    "task {} has {} selected branches in its exclusion group, expected exactly 1",
                    task.id, selected_count
                )));
            }
        }
        Ok(())
    }

    fn branch_selected(&self, branch_key: BranchKey) -> bool {
        let branch = &self.branches[branch_key];
        !branch.jobs.is_empty() && branch.jobs.iter().all(|&jk| self.jobs[jk].selected)
    }

    pub fn add_task(&mut self, id: impl Into<String>) -> TaskKey {
        let id = id.into();
        let key = self.tasks.insert(Task::new(id.clone()));
        self.task_by_id.insert(id, key);
        self.tasklist.push(key);
        key
    }

    pub fn add_branch(&mut self, task: TaskKey, change_type: ChangeType, deletes: Vec<TaskKey>) -> BranchKey {
        let key = self.branches.insert(Branch::new(task, change_type, Vec::new(), deletes, 0));
        self.tasks[task].branches.push(key);
        key
    }

    /// Replaces the resource catalog derived from the fixture's jobs with
    /// the one declared by the resources input file (`<resources.xml>`).
    /// A job whose resource falls outside this catalog makes its branch
    /// inadmissible (`check_branch_validity`), rather than silently
    /// widening the catalog to match every job that happens to appear in
    /// the process tree.
    pub fn set_resource_catalog(&mut self, catalog: impl IntoIterator<Item = ResourceId>) {
        self.resources = catalog.into_iter().collect();
    }

    pub fn add_job(&mut self, branch: BranchKey, mut job: Job) -> JobKey {
        self.resources.insert(job.resource.clone());
        job.branch = branch;
        let cost = job.cost;
        let key = self.jobs.insert(job);
        let b = &mut self.branches[branch];
        b.jobs.push(key);
        b.cost += cost;
        key
    }
}

impl Default for RaPst {
    fn default() -> Self {
        Self::new()
    }
}

/// Flat JSON fixture shape used to build an [`RaPst`] in tests and by the
/// loader, standing in for the external process/resource XML parser —
/// XML parsing is out of scope for the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaPstFixture {
    pub tasks: Vec<String>,
    pub branches: Vec<BranchFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFixture {
    pub task: String,
    #[serde(default)]
    pub change_type: FixtureChangeType,
    #[serde(default)]
    pub deletes: Vec<String>,
    pub jobs: Vec<JobFixture>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FixtureChangeType {
    #[default]
    InsertAfter,
    InsertBefore,
    Replace,
    Delete,
}

impl From<FixtureChangeType> for ChangeType {
    fn from(v: FixtureChangeType) -> Self {
        match v {
            FixtureChangeType::InsertAfter => ChangeType::InsertAfter,
            FixtureChangeType::InsertBefore => ChangeType::InsertBefore,
            FixtureChangeType::Replace => ChangeType::Replace,
            FixtureChangeType::Delete => ChangeType::Delete,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFixture {
    pub id: String,
    pub resource: String,
    pub cost: i64,
    #[serde(default)]
    pub after: Vec<String>,
}

impl RaPstFixture {
    /// Builds the `RaPst` arena from the fixture, wiring up `after` edges
    /// by job id across the whole tree (edges may cross branch
    /// boundaries once a process has been rewritten upstream).
    pub fn build(&self, instance: crate::model::ids::InstanceId, release_time: i64) -> Result<RaPst> {
        let mut ra_pst = RaPst::new();
        for t in &self.tasks {
            ra_pst.add_task(t.clone());
        }

        let mut job_key_by_id: HashMap<String, JobKey> = HashMap::new();
        let mut pending_after: Vec<(JobKey, Vec<String>)> = Vec::new();

        for bf in &self.branches {
            let task_key = ra_pst.task_key(&bf.task).ok_or_else(|| Error::InvalidRAPST(format!("branch references unknown task '{}'", bf.task)))?;
            let mut deletes = Vec::new();
            for d in &bf.deletes {
                let dk = ra_pst.task_key(d).ok_or_else(|| Error::InvalidRAPST(format!("branch deletes unknown task '{}'", d)))?;
                deletes.push(dk);
            }
            let branch_key = ra_pst.add_branch(task_key, bf.change_type.into(), deletes);

            for jf in &bf.jobs {
                let job = Job::new(jf.id.clone(), branch_key, ResourceId::new(jf.resource.clone()), jf.cost, instance.clone(), release_time);
                let jk = ra_pst.add_job(branch_key, job);
                job_key_by_id.insert(jf.id.clone(), jk);
                pending_after.push((jk, jf.after.clone()));
            }
        }

        for (jk, after_ids) in pending_after {
            let mut resolved = Vec::new();
            for aid in after_ids {
                let pk = job_key_by_id.get(&aid).ok_or_else(|| Error::InvalidRAPST(format!("job references unknown predecessor '{}'", aid)))?;
                resolved.push(*pk);
            }
            ra_pst.jobs[jk].after = resolved;
        }

        Ok(ra_pst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::InstanceId;

    fn two_task_fixture() -> RaPst {
        let fx: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1", "t2"],
            "branches": [
                {"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 3}]},
                {"task": "t1", "jobs": [{"id": "j2", "resource": "R2", "cost": 2}]},
                {"task": "t2", "jobs": [{"id": "j3", "resource": "R1", "cost": 4, "after": ["j1"]}]},
            ]
        }))
        .unwrap();
        fx.build(InstanceId::new("i1"), 0).unwrap()
    }

    #[test]
    fn tasklist_is_process_ordered() {
        let ra_pst = two_task_fixture();
        let ids: Vec<String> = ra_pst.tasklist().into_iter().map(|t| t.as_str().to_string()).collect();
        assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn resourcelist_is_the_catalog_referenced_by_jobs() {
        let ra_pst = two_task_fixture();
        let ids: Vec<String> = ra_pst.resourcelist().into_iter().map(|r| r.as_str().to_string()).collect();
        assert_eq!(ids, vec!["R1".to_string(), "R2".to_string()]);
    }

    #[test]
    fn branches_ilp_lists_every_branch_of_every_task_with_its_deletes_and_cost() {
        let ra_pst = two_task_fixture();
        let by_task = ra_pst.branches_ilp();

        let t1_branches = &by_task["t1"];
        assert_eq!(t1_branches.len(), 2);
        assert_eq!(t1_branches[0].cost, 3);
        assert_eq!(t1_branches[1].cost, 2);
        assert!(t1_branches[0].deletes.is_empty());

        let t2_branches = &by_task["t2"];
        assert_eq!(t2_branches.len(), 1);
        assert_eq!(t2_branches[0].jobs.len(), 1);
    }
}
