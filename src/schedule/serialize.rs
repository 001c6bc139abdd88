use std::collections::{BTreeMap, HashMap};

use crate::model::ids::JobKey;
use crate::model::Instance;
use crate::schedule::document::{BranchRep, InstanceRep, JobRep, TaskRep};

/// Bidirectional bridge between an [`Instance`]'s internal arena keys and
/// the stable composite ids of the flat schedule representation:
/// `"<instance>-<task>-<branchIndex>"` for branches, `"<instance>-<job>"`
/// for jobs.
pub struct SerializedInstance {
    pub rep: InstanceRep,
    pub job_key_by_id: HashMap<String, JobKey>,
}

/// Serializes `instance`'s current RA-PST state into the flat
/// `InstanceRep` the CP adapter and the schedule document consume.
pub fn serialize_instance(instance: &Instance) -> SerializedInstance {
    let ra_pst = &instance.ra_pst;
    let instance_id = instance.id.as_str();

    let mut tasks = BTreeMap::new();
    let mut branches = BTreeMap::new();
    let mut jobs = BTreeMap::new();
    let mut job_key_by_id = HashMap::new();
    let mut resources: Vec<String> = Vec::new();

    for &task_key in &ra_pst.tasklist {
        let task = &ra_pst.tasks[task_key];
        let mut branch_ids = Vec::new();

        for (branch_index, &branch_key) in task.branches.iter().enumerate() {
            let branch_id = format!("{}-{}-{}", instance_id, task.id, branch_index);
            branch_ids.push(branch_id.clone());

            let branch = &ra_pst.branches[branch_key];
            let mut job_ids = Vec::new();
            for &job_key in &branch.jobs {
                let job = &ra_pst.jobs[job_key];
                let job_id = format!("{}-{}", instance_id, job.id);
                job_ids.push(job_id.clone());
                job_key_by_id.insert(job_id.clone(), job_key);
            }

            let deletes = branch.deletes.iter().map(|&tk| ra_pst.tasks[tk].id.clone()).collect();

            branches.insert(branch_id, BranchRep { task: task.id.clone(), jobs: job_ids, deletes, branch_cost: branch.cost });
        }

        tasks.insert(task.id.clone(), TaskRep { branches: branch_ids });
    }

    for (branch_key, branch) in ra_pst.branches.iter() {
        let task = &ra_pst.tasks[branch.task];
        let branch_index = task.branches.iter().position(|&k| k == branch_key).unwrap_or(0);
        let branch_id = format!("{}-{}-{}", instance_id, task.id, branch_index);

        for &job_key in &branch.jobs {
            let job = &ra_pst.jobs[job_key];
            let job_id = format!("{}-{}", instance_id, job.id);
            resources.push(job.resource.as_str().to_string());

            let after = job.after.iter().map(|&pk| format!("{}-{}", instance_id, ra_pst.jobs[pk].id)).collect();

            jobs.insert(
                job_id,
                JobRep {
                    branch: branch_id.clone(),
                    resource: job.resource.as_str().to_string(),
                    cost: job.cost,
                    after,
                    instance: instance_id.to_string(),
                    min_start_time: job.min_start_time,
                    release_time: job.release_time,
                    selected: job.selected,
                    start: job.start,
                },
            );
        }
    }

    resources.sort();
    resources.dedup();

    let rep = InstanceRep { tasks, resources, branches, jobs, fixed: instance.fixed, solution: None };
    SerializedInstance { rep, job_key_by_id }
}

/// Writes `selected`/`start` fields from a (possibly solver-updated)
/// `InstanceRep` back onto `instance`'s arena, keyed by the job composite
/// ids recorded at serialization time.
pub fn apply_rep_back(instance: &mut Instance, rep: &InstanceRep, job_key_by_id: &HashMap<String, JobKey>) {
    for (job_id, job_rep) in &rep.jobs {
        if let Some(&job_key) = job_key_by_id.get(job_id) {
            let job = &mut instance.ra_pst.jobs[job_key];
            job.selected = job_rep.selected;
            job.start = job_rep.start;
        }
    }
    instance.fixed = rep.fixed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceId, RaPstFixture};

    #[test]
    fn composite_ids_are_stable_and_unique() {
        let fx: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1", "t2"],
            "branches": [
                {"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 3}]},
                {"task": "t2", "jobs": [{"id": "j2", "resource": "R1", "cost": 4, "after": ["j1"]}]},
            ]
        }))
        .unwrap();
        let ra_pst = fx.build(InstanceId::new("i1"), 0).unwrap();
        let instance = Instance::new(InstanceId::new("i1"), 0, ra_pst);

        let serialized = serialize_instance(&instance);
        assert!(serialized.rep.branches.contains_key("i1-t1-0"));
        assert!(serialized.rep.branches.contains_key("i1-t2-0"));
        assert!(serialized.rep.jobs.contains_key("i1-j1"));
        assert!(serialized.rep.jobs.contains_key("i1-j2"));
        assert_eq!(serialized.rep.jobs["i1-j2"].after, vec!["i1-j1".to_string()]);
    }

    /// Round-trip law: serializing, mutating the flat rep as a
    /// warm-starting strategy or persisted document would, then applying
    /// it back reproduces the same `selected`/`start` state on the arena.
    #[test]
    fn apply_rep_back_restores_selected_and_start_from_the_flat_rep() {
        let fx: RaPstFixture = serde_json::from_value(serde_json::json!({
            "tasks": ["t1"],
            "branches": [{"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 5}]}]
        }))
        .unwrap();
        let ra_pst = fx.build(InstanceId::new("i1"), 0).unwrap();
        let mut instance = Instance::new(InstanceId::new("i1"), 0, ra_pst);

        let serialized = serialize_instance(&instance);
        let mut rep = serialized.rep.clone();
        rep.jobs.get_mut("i1-j1").unwrap().selected = true;
        rep.jobs.get_mut("i1-j1").unwrap().start = Some(0);
        rep.fixed = true;

        apply_rep_back(&mut instance, &rep, &serialized.job_key_by_id);

        let job_key = *serialized.job_key_by_id.get("i1-j1").unwrap();
        assert!(instance.ra_pst.jobs[job_key].selected);
        assert_eq!(instance.ra_pst.jobs[job_key].start, Some(0));
        assert!(instance.fixed);
    }
}
