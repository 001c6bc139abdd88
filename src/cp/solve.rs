//! Builds a CP model from one or more instances' RA-PSTs and runs it
//! through an [`IntervalSolver`]. Three operating modes,
//! grounded on `cp_docplex.py`:
//!
//! - [`solve_joint`] — branch selection *and* timing together, for every
//!   undecided task of the given instances (ground: `cp_solver`).
//! - [`solve_scheduling_only`] — timing only, over already-decided
//!   branches (ground: `cp_solver_scheduling_only`).
//! - [`solve_decomposed`] — runs `solve_joint` to fix branch choices,
//!   then `solve_scheduling_only` to tighten the resulting schedule
//!   (a Benders-style two-phase solve).

use std::collections::{BTreeMap, HashMap};

use crate::cp::backend::BacktrackingIntervalSolver;
use crate::cp::port::{IntervalHandle, IntervalSolver, PresenceHandle, SolveOutcome};
use crate::change_ops::ChangeOpEngine;
use crate::error::{Error, Result};
use crate::model::ids::{BranchKey, InstanceId, JobKey, ResourceId, TaskKey};
use crate::model::Instance;

/// Knobs for one CP invocation (`--time-limit`/`--sigma`).
#[derive(Debug, Clone, Copy)]
pub struct CpConfig {
    pub time_limit_secs: u64,
    /// Allowed drift, in time units, that re-optimization may apply to an
    /// already-committed job's start before the warm-start is considered
    /// violated (ground: `cp_docplex.py`'s `sigma`-bounded fixed-interval
    /// window).
    pub sigma: i64,
    /// Upper bound any interval's end may not exceed; keeps the
    /// backtracking search finite (ground: the horizon used throughout
    /// `cp_docplex.py`'s interval construction).
    pub horizon: i64,
    /// Enables the α-weighted symmetry-breaking penalty term in
    /// [`solve_scheduling_only`] (`break_symmetries`).
    /// Inactive (`alpha: 0.0`) by default; treated as experimental.
    pub break_symmetries: bool,
    /// Weight of the symmetry-breaking penalty term (`alpha`).
    pub alpha: f64,
}

impl Default for CpConfig {
    fn default() -> Self {
        CpConfig { time_limit_secs: 100, sigma: 0, horizon: 100_000, break_symmetries: false, alpha: 0.0 }
    }
}

/// Per-job warm-start hint, keyed by the job's stable composite id
/// (`"<instance>-<job>"`, serialization). Mirrors
/// `create_warmstart_file`'s per-job `start` entries.
pub type WarmStartJobs = HashMap<String, i64>;

struct ModelMaps {
    job_interval: HashMap<(InstanceId, JobKey), IntervalHandle>,
    branch_presence: HashMap<(InstanceId, BranchKey), PresenceHandle>,
    /// `(instance, task)` -> the exclusion group's presence handles, in
    /// the same order as `RaPst::exclusion_group` enumerates them.
    task_groups: Vec<((InstanceId, TaskKey), Vec<PresenceHandle>)>,
    /// Jobs belonging to an undecided (optional) branch — the set a
    /// warm-start's job hints must cover exactly.
    undecided_jobs: HashMap<(InstanceId, JobKey), IntervalHandle>,
}

fn job_label(instance: &Instance, job_key: JobKey) -> String {
    format!("{}-{}", instance.id, instance.ra_pst.jobs[job_key].id)
}

fn branch_label(instance: &Instance, branch_key: BranchKey) -> String {
    let branch = &instance.ra_pst.branches[branch_key];
    let task = &instance.ra_pst.tasks[branch.task];
    let idx = task.branches.iter().position(|&b| b == branch_key).unwrap_or(0);
    format!("{}-{}-{}", instance.id, task.id, idx)
}

/// Creates the presence variable for `branch` (and links every job
/// interval in it to that presence), creating job intervals for any job
/// not already modeled. Returns the presence handle.
fn model_branch(solver: &mut dyn IntervalSolver, instance: &Instance, branch_key: BranchKey, maps: &mut ModelMaps) -> PresenceHandle {
    if let Some(&p) = maps.branch_presence.get(&(instance.id.clone(), branch_key)) {
        return p;
    }
    let branch = &instance.ra_pst.branches[branch_key];
    let mut branch_presence: Option<PresenceHandle> = None;

    for &job_key in &branch.jobs {
        let job = &instance.ra_pst.jobs[job_key];
        let handle = *maps.job_interval.entry((instance.id.clone(), job_key)).or_insert_with(|| solver.new_interval(job_label(instance, job_key), job.cost, true));
        maps.undecided_jobs.insert((instance.id.clone(), job_key), handle);
        solver.set_start_min(handle, job.release_time);
        let p = solver.presence_of(handle);
        match branch_presence {
            None => branch_presence = Some(p),
            Some(root) => solver.link_presence(root, p),
        }
    }

    // A branch with no jobs (a pure delete) still needs a presence
    // variable to take part in its exclusion-cardinality group.
    let presence = branch_presence.unwrap_or_else(|| {
        let marker = solver.new_interval(format!("{}-marker", branch_label(instance, branch_key)), 0, true);
        solver.presence_of(marker)
    });

    maps.branch_presence.insert((instance.id.clone(), branch_key), presence);
    presence
}

/// Builds the joint (branch-selection + timing) model over every
/// non-deleted task of `instances`. Already-applied tasks become fixed,
/// non-optional intervals (ground: `instance.fixed`, invariant 5);
/// undecided tasks become one optional interval per job with
/// cardinality-one over the task's exclusion group.
fn build_joint_model(solver: &mut dyn IntervalSolver, instances: &[Instance], sigma: i64) -> ModelMaps {
    let mut maps = ModelMaps { job_interval: HashMap::new(), branch_presence: HashMap::new(), task_groups: Vec::new(), undecided_jobs: HashMap::new() };

    for instance in instances {
        let ra_pst = &instance.ra_pst;
        for &task_key in &ra_pst.tasklist {
            let task = &ra_pst.tasks[task_key];
            if task.deleted {
                continue;
            }

            if let Some(&branch_key) = instance.applied_branches.get(&task_key) {
                let branch = &ra_pst.branches[branch_key];
                for &job_key in &branch.jobs {
                    let job = &ra_pst.jobs[job_key];
                    let handle = *maps.job_interval.entry((instance.id.clone(), job_key)).or_insert_with(|| solver.new_interval(job_label(instance, job_key), job.cost, false));
                    match job.start {
                        // A previously committed job is allowed to drift
                        // by up to sigma time units under re-optimization
                        // rather than being pinned exactly (ground:
                        // `cp_docplex.py`'s `set_start_max(start + sigma)`).
                        Some(start) => {
                            solver.set_start_min(handle, start);
                            solver.set_start_max(handle, start + sigma);
                        }
                        None => solver.set_start_min(handle, job.release_time),
                    }
                }
                continue;
            }

            let group = ra_pst.exclusion_group(task_key);
            let presences: Vec<PresenceHandle> = group.iter().map(|&bk| model_branch(solver, instance, bk, &mut maps)).collect();
            maps.task_groups.push(((instance.id.clone(), task_key), presences));
        }
    }

    for (_, presences) in &maps.task_groups {
        solver.cardinality_one(presences);
    }

    add_precedence_and_no_overlap(solver, instances, &maps);
    maps
}

/// Builds the scheduling-only model: every job of every already-selected
/// (non-deleted) branch becomes a fixed-size, non-optional interval, no
/// cardinality constraints are added (ground: `cp_solver_scheduling_only`,
/// which only creates intervals for jobs that are already part of a
/// selected branch).
fn build_scheduling_only_model(solver: &mut dyn IntervalSolver, instances: &[Instance], sigma: i64) -> ModelMaps {
    let mut maps = ModelMaps { job_interval: HashMap::new(), branch_presence: HashMap::new(), task_groups: Vec::new(), undecided_jobs: HashMap::new() };

    for instance in instances {
        let ra_pst = &instance.ra_pst;
        for &task_key in &ra_pst.tasklist {
            let task = &ra_pst.tasks[task_key];
            if task.deleted {
                continue;
            }
            let Some(&branch_key) = instance.applied_branches.get(&task_key) else {
                continue;
            };
            let branch = &ra_pst.branches[branch_key];
            for &job_key in &branch.jobs {
                let job = &ra_pst.jobs[job_key];
                let handle = solver.new_interval(job_label(instance, job_key), job.cost, false);
                if instance.fixed {
                    if let Some(start) = job.start {
                        solver.set_start_min(handle, start);
                        solver.set_start_max(handle, start + sigma);
                    }
                } else {
                    solver.set_start_min(handle, job.release_time);
                }
                maps.job_interval.insert((instance.id.clone(), job_key), handle);
            }
        }
    }

    add_precedence_and_no_overlap(solver, instances, &maps);
    maps
}

fn add_precedence_and_no_overlap(solver: &mut dyn IntervalSolver, instances: &[Instance], maps: &ModelMaps) {
    let mut by_resource: BTreeMap<ResourceId, Vec<IntervalHandle>> = BTreeMap::new();

    for instance in instances {
        let ra_pst = &instance.ra_pst;
        for (&(ref iid, job_key), &handle) in &maps.job_interval {
            if iid != &instance.id {
                continue;
            }
            let job = &ra_pst.jobs[job_key];
            by_resource.entry(job.resource.clone()).or_default().push(handle);
            for &pred in &job.after {
                if let Some(&pred_handle) = maps.job_interval.get(&(instance.id.clone(), pred)) {
                    solver.end_before_start(pred_handle, handle);
                }
            }
        }
    }

    for handles in by_resource.values() {
        if handles.len() > 1 {
            solver.no_overlap(handles);
        }
    }
}

fn apply_warm_start(solver: &mut dyn IntervalSolver, instances: &[Instance], maps: &ModelMaps, warm_jobs: Option<&WarmStartJobs>) -> Result<()> {
    let Some(warm_jobs) = warm_jobs else {
        return Ok(());
    };

    let optional_count = maps.undecided_jobs.len();
    if warm_jobs.len() != optional_count {
        return Err(Error::StartingPointMismatch { expected: optional_count, got: warm_jobs.len() });
    }

    for instance in instances {
        for (job_key, _) in instance.ra_pst.jobs.iter() {
            if let Some(&handle) = maps.undecided_jobs.get(&(instance.id.clone(), job_key)) {
                let id = job_label(instance, job_key);
                if let Some(&start) = warm_jobs.get(&id) {
                    solver.set_start_hint(handle, start);
                }
            }
        }
    }
    Ok(())
}

fn objective_handles(maps: &ModelMaps) -> Vec<IntervalHandle> {
    maps.job_interval.values().copied().collect()
}

/// Writes a joint solve's resolved presences and starts back onto each
/// instance: commits the selected branch per task via the change-op
/// engine, and copies resolved job starts onto the arena.
fn commit_joint_solution(solver: &dyn IntervalSolver, instances: &mut [Instance], maps: &ModelMaps) -> Result<()> {
    for ((instance_id, task_key), presences) in &maps.task_groups {
        let instance = instances.iter_mut().find(|i| &i.id == instance_id).expect("modeled instance must be present");
        let group = instance.ra_pst.exclusion_group(*task_key);
        let chosen = group.iter().zip(presences.iter()).find(|(_, &p)| solver.read_presence(p)).map(|(&bk, _)| bk);

        if let Some(branch_key) = chosen {
            for &job_key in &instance.ra_pst.branches[branch_key].jobs.clone() {
                if let Some(&handle) = maps.job_interval.get(&(instance.id.clone(), job_key)) {
                    if let Some(start) = solver.read_start(handle) {
                        instance.ra_pst.jobs[job_key].start = Some(start);
                        instance.ra_pst.jobs[job_key].selected = true;
                    }
                }
            }
            let mut engine = ChangeOpEngine::new();
            engine.apply_one(&mut instance.ra_pst, *task_key, branch_key, instance.release_time)?;
            engine.finalize_deferred_deletes(&mut instance.ra_pst);
            instance.applied_branches.insert(*task_key, branch_key);
        }
    }
    for instance in instances.iter() {
        instance.ra_pst.check_selection_invariants()?;
    }
    Ok(())
}

fn commit_scheduling_solution(solver: &dyn IntervalSolver, instances: &mut [Instance], maps: &ModelMaps) {
    for ((instance_id, job_key), &handle) in &maps.job_interval {
        if let Some(start) = solver.read_start(handle) {
            let instance = instances.iter_mut().find(|i| &i.id == instance_id).expect("modeled instance must be present");
            instance.ra_pst.jobs[*job_key].start = Some(start);
            instance.ra_pst.jobs[*job_key].selected = true;
        }
    }
}

/// Runs the joint branch-selection + timing model. On a
/// feasible or optimal outcome, commits the winning branch per task and
/// its jobs' resolved starts back onto `instances`.
#[tracing::instrument(skip(instances, warm_jobs), fields(instances = instances.len()))]
pub fn solve_joint(instances: &mut [Instance], cfg: &CpConfig, warm_jobs: Option<&WarmStartJobs>) -> Result<SolveOutcome> {
    let mut solver = BacktrackingIntervalSolver::new(cfg.horizon);
    let maps = build_joint_model(&mut solver, instances, cfg.sigma);
    apply_warm_start(&mut solver, instances, &maps, warm_jobs)?;
    solver.minimize_makespan(&objective_handles(&maps));

    let outcome = solver.solve(cfg.time_limit_secs);
    log::debug!("joint solve over {} instance(s) finished with {:?}", instances.len(), outcome);
    match outcome {
        SolveOutcome::Optimal | SolveOutcome::Feasible => {
            commit_joint_solution(&solver, instances, &maps)?;
            Ok(outcome)
        }
        SolveOutcome::Infeasible => Err(Error::Infeasible),
        SolveOutcome::TimedOutNoIncumbent => Err(Error::SolverTimeoutNoIncumbent),
    }
}

/// Runs the scheduling-only model over already-decided branches,
/// tightening start times without revisiting branch choice.
pub fn solve_scheduling_only(instances: &mut [Instance], cfg: &CpConfig) -> Result<SolveOutcome> {
    let mut solver = BacktrackingIntervalSolver::new(cfg.horizon);
    let maps = build_scheduling_only_model(&mut solver, instances, cfg.sigma);
    let objective = objective_handles(&maps);
    solver.minimize_makespan(&objective);
    if cfg.break_symmetries {
        // An additional linear penalty term, weight alpha, available for
        // symmetry-breaking; inactive (alpha == 0) by default and
        // treated as experimental.
        solver.add_symmetry_penalty(&objective, cfg.alpha);
    }

    let outcome = solver.solve(cfg.time_limit_secs);
    match outcome {
        SolveOutcome::Optimal | SolveOutcome::Feasible => {
            commit_scheduling_solution(&solver, instances, &maps);
            Ok(outcome)
        }
        SolveOutcome::Infeasible => Err(Error::Infeasible),
        SolveOutcome::TimedOutNoIncumbent => Err(Error::SolverTimeoutNoIncumbent),
    }
}

/// Two-phase decomposed solve: `solve_joint` picks branches and a first
/// schedule, then `solve_scheduling_only` re-times
/// the now-fixed branch set. Splitting the discrete (branch) and
/// continuous (timing) decisions keeps each phase's search space small
/// relative to one combined model over large instance sets.
pub fn solve_decomposed(instances: &mut [Instance], cfg: &CpConfig, warm_jobs: Option<&WarmStartJobs>) -> Result<SolveOutcome> {
    solve_joint(instances, cfg, warm_jobs)?;
    solve_scheduling_only(instances, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceId, RaPstFixture};

    fn two_branch_instance() -> Instance {
        let fx: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1"],
            "branches": [
                {"task": "t1", "jobs": [{"id": "j-cheap", "resource": "R1", "cost": 2}]},
                {"task": "t1", "jobs": [{"id": "j-expensive", "resource": "R1", "cost": 9}]},
            ]
        }))
        .unwrap();
        let ra_pst = fx.build(InstanceId::new("i1"), 0).unwrap();
        Instance::new(InstanceId::new("i1"), 0, ra_pst)
    }

    #[test]
    fn joint_solve_selects_and_commits_the_cheaper_branch() {
        let mut instance = two_branch_instance();
        let cfg = CpConfig { time_limit_secs: 2, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };

        let outcome = solve_joint(std::slice::from_mut(&mut instance), &cfg, None).unwrap();
        assert_eq!(outcome, SolveOutcome::Optimal);

        let t1 = instance.ra_pst.task_key("t1").unwrap();
        let branch = instance.applied_branches.get(&t1).copied().expect("a branch must be committed");
        let jobs = &instance.ra_pst.branches[branch].jobs;
        assert_eq!(jobs.len(), 1);
        assert_eq!(instance.ra_pst.jobs[jobs[0]].id, "j-cheap");
        assert_eq!(instance.ra_pst.jobs[jobs[0]].start, Some(0));
    }

    #[test]
    fn decomposed_solve_matches_joint_solve_on_a_single_instance() {
        let mut instance = two_branch_instance();
        let cfg = CpConfig { time_limit_secs: 2, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };

        solve_decomposed(std::slice::from_mut(&mut instance), &cfg, None).unwrap();

        let t1 = instance.ra_pst.task_key("t1").unwrap();
        let branch = instance.applied_branches.get(&t1).copied().unwrap();
        assert_eq!(instance.ra_pst.jobs[instance.ra_pst.branches[branch].jobs[0]].id, "j-cheap");
    }

    #[test]
    fn warm_start_size_mismatch_is_rejected() {
        let mut instance = two_branch_instance();
        let cfg = CpConfig { time_limit_secs: 2, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };
        let mut warm: WarmStartJobs = HashMap::new();
        warm.insert("i1-j-cheap".to_string(), 0);
        warm.insert("i1-j-expensive".to_string(), 0);
        warm.insert("i1-phantom-job".to_string(), 0);

        let err = solve_joint(std::slice::from_mut(&mut instance), &cfg, Some(&warm)).unwrap_err();
        assert!(matches!(err, Error::StartingPointMismatch { .. }));
    }
}
