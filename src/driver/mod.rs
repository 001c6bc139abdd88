//! The Simulator / Driver: a release-time-ordered arrival
//! queue, dispatch across the five allocation strategies, the
//! single-writer schedule document, warm-start bootstrap, and solve
//! metadata capture. Grounded on `simulator.py`'s `Simulator` /
//! `QueueObject` / `AllocationTypeEnum`, generalized from its
//! read-modify-write schedule file to an in-memory document with an
//! atomic write-temp-then-rename persist.

pub mod strategy;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::change_ops::ChangeOpEngine;
use crate::cp::{solve_decomposed, solve_joint, CpConfig, WarmStartJobs};
use crate::error::{Error, Result};
use crate::heuristic::{HeuristicAllocator, ResourceTimeline};
use crate::model::Instance;
use crate::schedule::{serialize_instance, ScheduleDocument, SolutionMeta};

pub use strategy::AllocationStrategy;

/// One pending unit of work (ground: `QueueObject`). The instance itself
/// lives in `Driver::instances`, indexed by `schedule_idx`; the queue
/// only carries the ordering key and which strategy governs it.
#[derive(Debug, Clone, Copy)]
struct WorkItem {
    schedule_idx: usize,
    strategy: AllocationStrategy,
    release_time: i64,
}

/// Owns the single shared mutable schedule document and the release-time-ordered queue of pending instances.
pub struct Driver {
    queue: Vec<WorkItem>,
    instances: Vec<Instance>,
    /// One change-operation engine per instance, since a `TaskKey`/
    /// `BranchKey` is only meaningful against the arena it was minted
    /// from — sharing one engine across instances would let a pending
    /// delete silently index the wrong instance's tree.
    change_ops: Vec<ChangeOpEngine>,
    timeline: ResourceTimeline,
    schedule: ScheduleDocument,
    out_path: PathBuf,
    cfg: CpConfig,
    /// The most recent CP solve's status, if any strategy in this run
    /// invoked the CP adapter; surfaces as `solution.solver_status`.
    last_cp_outcome: Option<crate::cp::SolveOutcome>,
}

impl Driver {
    pub fn new(out_path: impl Into<PathBuf>, cfg: CpConfig) -> Self {
        Driver { queue: Vec::new(), instances: Vec::new(), change_ops: Vec::new(), timeline: ResourceTimeline::new(), schedule: ScheduleDocument::new(), out_path: out_path.into(), cfg, last_cp_outcome: None }
    }

    /// Adds a new instance to the queue under `strategy` (ground:
    /// `Simulator::add_instance`). `schedule_idx` is the instance's
    /// stable position in both `self.instances` and the schedule
    /// document's `instances` array.
    pub fn add_instance(&mut self, instance: Instance, strategy: AllocationStrategy) {
        let schedule_idx = self.instances.len();
        let release_time = instance.release_time;
        self.instances.push(instance);
        self.change_ops.push(ChangeOpEngine::new());
        self.push_work(WorkItem { schedule_idx, strategy, release_time });
    }

    fn push_work(&mut self, item: WorkItem) {
        self.queue.push(item);
        // Ordering guarantee: non-decreasing release time, ties broken
        // by schedule_idx.
        self.queue.sort_by(|a, b| a.release_time.cmp(&b.release_time).then(a.schedule_idx.cmp(&b.schedule_idx)));
    }

    /// All items currently in the queue must share the same strategy;
    /// the driver rejects mixed queues with `MixedStrategyUnsupported`
    /// (ground: `Simulator::set_allocation_type`).
    fn uniform_strategy(&self) -> Result<AllocationStrategy> {
        let mut items = self.queue.iter();
        let first = items.next().ok_or_else(|| Error::InvalidRAPST("driver run with an empty queue".into()))?.strategy;
        if items.all(|w| w.strategy == first) {
            Ok(first)
        } else {
            Err(Error::MixedStrategyUnsupported)
        }
    }

    /// Runs the queue to completion under whichever strategy it holds,
    /// finalizes solve metadata, and persists the schedule document.
    pub fn run(&mut self) -> Result<&ScheduleDocument> {
        let strategy = self.uniform_strategy()?;
        let start = Instant::now();
        log::info!("driver starting {} instance(s) under strategy {}", self.instances.len(), strategy);

        match strategy {
            AllocationStrategy::Heuristic => self.run_heuristic()?,
            AllocationStrategy::SingleInstanceCp | AllocationStrategy::SingleInstanceCpWarm => self.run_single_instance_cp(strategy.is_warm())?,
            AllocationStrategy::AllInstanceCp | AllocationStrategy::AllInstanceCpWarm => self.run_all_instance_cp(strategy.is_warm())?,
        }

        let solver_status = match self.last_cp_outcome {
            Some(outcome) => format!("{outcome:?}"),
            None => format!("{strategy}"),
        };
        self.finalize_metadata(start.elapsed().as_secs_f64(), solver_status);
        self.persist()?;
        Ok(&self.schedule)
    }

    // -- HEURISTIC --------------------------------------------------

    /// Task-by-task earliest-finish-time allocation (ground:
    /// `Simulator::single_task_processing`).
    fn run_heuristic(&mut self) -> Result<()> {
        while let Some(item) = self.pop_front() {
            let idx = item.schedule_idx;
            let horizon = self.cfg.horizon;
            let mut allocator = HeuristicAllocator::new(&mut self.timeline, horizon);
            let outcome = {
                let instance = &mut self.instances[idx];
                let change_op = &mut self.change_ops[idx];
                allocator.allocate_current_task(instance, change_op)
            };

            match outcome {
                Ok(finish) => {
                    if self.instances[idx].is_done() {
                        self.change_ops[idx].finalize_deferred_deletes(&mut self.instances[idx].ra_pst);
                        self.instances[idx].ra_pst.check_selection_invariants()?;
                    }
                    self.merge_incremental(idx, finish as f64);
                    if !self.instances[idx].is_done() {
                        let release_time = self.instances[idx].next_release_time();
                        self.push_work(WorkItem { schedule_idx: idx, strategy: AllocationStrategy::Heuristic, release_time });
                    }
                }
                Err(Error::InvalidBranch(_)) => {
                    // Recoverable locally: the instance is marked invalid
                    // and the driver continues with the rest of the
                    // queue rather than aborting.
                    self.merge_invalid(idx);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn pop_front(&mut self) -> Option<WorkItem> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    // -- SINGLE_INSTANCE_CP[_WARM] -----------------------------------

    /// Joint CP solve, one instance at a time, each against every
    /// previously committed (now `fixed`) instance's timeline (ground:
    /// `Simulator::single_instance_processing`).
    fn run_single_instance_cp(&mut self, warm: bool) -> Result<()> {
        let items: Vec<WorkItem> = self.queue.drain(..).collect();
        for item in items {
            let idx = item.schedule_idx;

            let warm_jobs = if warm { Some(self.build_warm_start(idx)) } else { None };

            let prefix_len = idx + 1;
            let outcome = solve_joint(&mut self.instances[..prefix_len], &self.cfg, warm_jobs.as_ref())?;
            self.instances[idx].fixed = true;
            self.merge_solved(idx, outcome);
        }
        Ok(())
    }

    /// Synthesizes a warm-start by running a full heuristic allocation
    /// pass over a private clone of the instance (ground:
    /// `Simulator.create_warmstart_file`, which spins up a second
    /// `Simulator` against a temporary schedule file running
    /// `HEURISTIC` to completion). Hints are emitted for every job of
    /// every branch of every task in the *pristine* instance, including
    /// tasks the heuristic pass went on to delete — the same universe
    /// [`crate::cp::solve::solve_joint`]'s model builds one optional
    /// interval per (`undecided_jobs` is sized off the fresh instance,
    /// before any delete is applied), so the warm map's cardinality
    /// always matches. A job the heuristic never committed a start for
    /// (its branch lost out, or its host task was deleted) falls back
    /// to its own release time.
    fn build_warm_start(&self, idx: usize) -> WarmStartJobs {
        let source = &self.instances[idx];
        let mut clone = source.clone();
        let mut timeline = ResourceTimeline::new();
        let mut change_op = ChangeOpEngine::new();
        let horizon = self.cfg.horizon;

        while !clone.is_done() {
            let mut allocator = HeuristicAllocator::new(&mut timeline, horizon);
            if allocator.allocate_current_task(&mut clone, &mut change_op).is_err() {
                break;
            }
        }
        change_op.finalize_deferred_deletes(&mut clone.ra_pst);

        let mut warm = WarmStartJobs::new();
        for &task_key in &source.ra_pst.tasklist {
            for &branch_key in &source.ra_pst.tasks[task_key].branches {
                for &job_key in &source.ra_pst.branches[branch_key].jobs {
                    let job = &clone.ra_pst.jobs[job_key];
                    let label = format!("{}-{}", source.id, job.id);
                    warm.insert(label, job.start.unwrap_or(job.release_time));
                }
            }
        }
        warm
    }

    // -- ALL_INSTANCE_CP[_WARM] --------------------------------------

    /// Serializes every queued instance, then runs a single decomposed
    /// (or warm-started joint) solve across all of them at once (ground:
    /// `Simulator::all_instance_processing`).
    fn run_all_instance_cp(&mut self, warm: bool) -> Result<()> {
        let items: Vec<WorkItem> = self.queue.drain(..).collect();
        let indices: Vec<usize> = items.iter().map(|w| w.schedule_idx).collect();
        let (lo, hi) = (*indices.iter().min().unwrap(), *indices.iter().max().unwrap());

        let warm_jobs = if warm {
            let mut combined = WarmStartJobs::new();
            for &idx in &indices {
                combined.extend(self.build_warm_start(idx));
            }
            Some(combined)
        } else {
            None
        };

        let slice = &mut self.instances[lo..=hi];
        let outcome = if warm {
            solve_joint(slice, &self.cfg, warm_jobs.as_ref())?
        } else {
            solve_decomposed(slice, &self.cfg, None)?
        };
        for &idx in &indices {
            self.instances[idx].fixed = true;
        }
        for &idx in &indices {
            self.merge_solved(idx, outcome);
        }
        Ok(())
    }

    // -- Merge rules -----------------------

    fn merge_rep(&mut self, idx: usize) {
        let serialized = serialize_instance(&self.instances[idx]);
        self.schedule.union_resources(&serialized.rep.resources);
        if self.schedule.instances.len() <= idx {
            self.schedule.instances.resize_with(idx + 1, Default::default);
        }
        self.schedule.instances[idx] = serialized.rep;
    }

    /// Heuristic path: `objective = max(previous objective, new finish)`.
    fn merge_incremental(&mut self, idx: usize, finish: f64) {
        self.merge_rep(idx);
        self.schedule.objective = self.schedule.objective.max(finish);
    }

    /// CP path: the solver-returned outcome replaces the running
    /// objective with the makespan actually committed onto the jobs.
    fn merge_solved(&mut self, idx: usize, outcome: crate::cp::SolveOutcome) {
        self.last_cp_outcome = Some(outcome);
        self.merge_rep(idx);
        let makespan = self.instances[idx]
            .ra_pst
            .jobs
            .values()
            .filter(|j| j.selected)
            .filter_map(|j| j.end())
            .max()
            .unwrap_or(0) as f64;
        self.schedule.objective = self.schedule.objective.max(makespan);
    }

    /// Invalid instances yield `objective = NaN` and appear with
    /// `selected=false` on every job.
    fn merge_invalid(&mut self, idx: usize) {
        self.merge_rep(idx);
        self.schedule.objective = f64::NAN;
    }

    // -- Metadata & persistence --------------------------------------

    /// Appends document-level solve metadata (ground:
    /// `Simulator.add_allocation_metadata`).
    fn finalize_metadata(&mut self, computing_time: f64, solver_status: String) {
        let total_interval_length: i64 = self.instances.iter().flat_map(|i| i.ra_pst.jobs.values()).filter(|j| j.selected).map(|j| j.cost).sum();

        self.schedule.solution = Some(SolutionMeta {
            objective: self.schedule.objective,
            optimality_gap: None,
            computing_time,
            solver_status,
            branches: None,
            propagations: None,
            total_interval_length,
            lower_bound: None,
        });
    }

    /// Single-writer, atomic persist: write to a sibling temp file, then
    /// rename over the destination, so a reader never observes a
    /// partially written document.
    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.schedule)?;
        let tmp_path = tmp_sibling(&self.out_path);
        if let Some(parent) = self.out_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&tmp_path, json).map_err(|e| Error::SchedulePersistenceError(e.to_string()))?;
        fs::rename(&tmp_path, &self.out_path).map_err(|e| Error::SchedulePersistenceError(e.to_string()))?;
        Ok(())
    }

    pub fn schedule(&self) -> &ScheduleDocument {
        &self.schedule
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceId, RaPstFixture};

    fn single_task_instance(id: &str, release_time: i64) -> Instance {
        let fx: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1"],
            "branches": [{"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 5}]}]
        }))
        .unwrap();
        let ra_pst = fx.build(InstanceId::new(id), release_time).unwrap();
        Instance::new(InstanceId::new(id), release_time, ra_pst)
    }

    #[test]
    fn heuristic_resource_contention_places_second_instance_after_the_first() {
        let dir = std::env::temp_dir().join(format!("rapst_test_{}", std::process::id()));
        let out = dir.join("schedule.json");
        let cfg = CpConfig { time_limit_secs: 1, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };
        let mut driver = Driver::new(&out, cfg);
        driver.add_instance(single_task_instance("i1", 0), AllocationStrategy::Heuristic);
        driver.add_instance(single_task_instance("i2", 0), AllocationStrategy::Heuristic);

        driver.run().unwrap();

        assert_eq!(driver.schedule().objective, 10.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mixed_strategy_queue_is_rejected() {
        let out = std::env::temp_dir().join("rapst_test_mixed.json");
        let cfg = CpConfig { time_limit_secs: 1, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };
        let mut driver = Driver::new(&out, cfg);
        driver.add_instance(single_task_instance("i1", 0), AllocationStrategy::Heuristic);
        driver.add_instance(single_task_instance("i2", 0), AllocationStrategy::SingleInstanceCp);

        let err = driver.run().unwrap_err();
        assert!(matches!(err, Error::MixedStrategyUnsupported));
    }

    #[test]
    fn single_instance_cp_warm_matches_plain_single_instance_cp() {
        let out = std::env::temp_dir().join("rapst_test_warm.json");
        let cfg = CpConfig { time_limit_secs: 2, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };
        let mut driver = Driver::new(&out, cfg);
        driver.add_instance(single_task_instance("i1", 0), AllocationStrategy::SingleInstanceCpWarm);

        driver.run().unwrap();
        assert_eq!(driver.schedule().objective, 5.0);
    }

    /// A process whose cheapest branch deletes another task (spec.md's own
    /// "delete branch" example) must still warm-start a CP solve: the warm
    /// map has to cover every job of every branch of every task in the
    /// pristine instance, including the one the heuristic pre-pass went on
    /// to delete, not just the tasks it left undeleted.
    #[test]
    fn single_instance_cp_warm_survives_a_deleted_task() {
        let fx: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1", "t2"],
            "branches": [
                {"task": "t1", "jobs": [{"id": "j1b1", "resource": "R1", "cost": 3}]},
                {"task": "t1", "jobs": [{"id": "j1b2", "resource": "R2", "cost": 2}], "deletes": ["t2"]},
                {"task": "t2", "jobs": [{"id": "j2", "resource": "R1", "cost": 4}]},
            ]
        }))
        .unwrap();
        let ra_pst = fx.build(InstanceId::new("i1"), 0).unwrap();
        let out = std::env::temp_dir().join("rapst_test_warm_delete.json");
        let cfg = CpConfig { time_limit_secs: 2, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 };
        let mut driver = Driver::new(&out, cfg);
        driver.add_instance(Instance::new(InstanceId::new("i1"), 0, ra_pst), AllocationStrategy::SingleInstanceCpWarm);

        // Must not fail with Error::StartingPointMismatch, and must find the
        // branch that drops t2 entirely (objective 2, beating 3+4 or 2+4).
        driver.run().unwrap();
        assert_eq!(driver.schedule().objective, 2.0);
    }
}
