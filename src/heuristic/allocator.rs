use crate::change_ops::ChangeOpEngine;
use crate::error::{Error, Result};
use crate::heuristic::timeline::ResourceTimeline;
use crate::model::ids::{BranchKey, JobKey};
use crate::model::{Instance, TaskKey};

/// A simulated placement for one branch: the per-job `(start, end)` pairs
/// in branch order, plus the branch's overall finish time and cost — used
/// to pick the branch with the smallest finish time.
struct BranchPlacement {
    branch: BranchKey,
    job_starts: Vec<(JobKey, i64)>,
    finish: i64,
    cost: i64,
}

/// Earliest-finish-time heuristic allocator. Holds no state of
/// its own beyond the shared [`ResourceTimeline`]; every call allocates
/// exactly one task of one instance.
pub struct HeuristicAllocator<'a> {
    pub timeline: &'a mut ResourceTimeline,
    pub horizon: i64,
}

impl<'a> HeuristicAllocator<'a> {
    pub fn new(timeline: &'a mut ResourceTimeline, horizon: i64) -> Self {
        HeuristicAllocator { timeline, horizon }
    }

    /// Allocates `instance`'s current task: evaluates every admissible
    /// branch, selects the one with the smallest finish time (ties broken
    /// by lower total cost, then lexicographic branch id), commits its
    /// jobs into the timeline and the instance's RA-PST, and advances the
    /// instance's task cursor past any task the chosen branch deletes.
    ///
    /// Returns the finish time of the committed branch. If every branch of
    /// the task is invalid, `instance.invalid` is set and
    /// `Error::InvalidBranch` is returned.
    pub fn allocate_current_task(&mut self, instance: &mut Instance, change_op: &mut ChangeOpEngine) -> Result<i64> {
        let task_key = instance.current_task().ok_or_else(|| Error::InvalidRAPST("allocate_current_task called with no current task".into()))?;
        let release_time = instance.next_release_time();

        let mut placements = self.evaluate_branches(instance, task_key, release_time);
        placements.sort_by(|a, b| a.finish.cmp(&b.finish).then(a.cost.cmp(&b.cost)).then_with(|| self.branch_id(instance, a.branch).cmp(&self.branch_id(instance, b.branch))));

        let Some(best) = placements.into_iter().next() else {
            instance.invalid = true;
            return Err(Error::InvalidBranch(format!("no admissible branch for task '{}'", instance.ra_pst.tasks[task_key].id)));
        };

        for &(job_key, start) in &best.job_starts {
            let job = &mut instance.ra_pst.jobs[job_key];
            job.start = Some(start);
            job.selected = true;
            self.timeline.book(job.resource.clone(), start, start + job.cost);
        }

        change_op.apply_one(&mut instance.ra_pst, task_key, best.branch, release_time)?;
        instance.applied_branches.insert(task_key, best.branch);
        instance.commit_finish_time(best.finish);

        instance.advance();
        self.skip_deleted(instance);

        Ok(best.finish)
    }

    fn skip_deleted(&self, instance: &mut Instance) {
        while let Some(task_key) = instance.current_task() {
            if instance.ra_pst.tasks[task_key].deleted {
                instance.advance();
            } else {
                break;
            }
        }
    }

    fn branch_id(&self, instance: &Instance, branch_key: BranchKey) -> String {
        let branch = &instance.ra_pst.branches[branch_key];
        let task = &instance.ra_pst.tasks[branch.task];
        let idx = task.branches.iter().position(|&b| b == branch_key).unwrap_or(0);
        format!("{}-{}-{}", instance.id, task.id, idx)
    }

    fn evaluate_branches(&self, instance: &Instance, task_key: TaskKey, release_time: i64) -> Vec<BranchPlacement> {
        let ra_pst = &instance.ra_pst;
        let mut out = Vec::new();

        for &branch_key in &ra_pst.tasks[task_key].branches {
            if !ra_pst.check_branch_validity(branch_key) {
                continue;
            }
            let branch = &ra_pst.branches[branch_key];
            let mut job_starts = Vec::with_capacity(branch.jobs.len());
            let mut sibling_bound = release_time;
            let mut feasible = true;

            for &job_key in &branch.jobs {
                let job = &ra_pst.jobs[job_key];
                let mut bound = sibling_bound.max(job.release_time).max(release_time);
                for &pred in &job.after {
                    if let Some(end) = ra_pst.jobs[pred].end() {
                        bound = bound.max(end);
                    }
                }
                let start = self.timeline.earliest_free_slot(&job.resource, job.cost, bound);
                if start + job.cost > self.horizon {
                    feasible = false;
                    break;
                }
                sibling_bound = start + job.cost;
                job_starts.push((job_key, start));
            }

            if !feasible {
                continue;
            }

            let finish = match job_starts.last() {
                Some(&(jk, s)) => s + ra_pst.jobs[jk].cost,
                None => release_time, // a branch with no jobs (e.g. a pure delete) finishes immediately
            };
            out.push(BranchPlacement { branch: branch_key, job_starts, finish, cost: branch.cost });
        }

        out
    }
}
