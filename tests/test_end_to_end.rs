//! End-to-end scenarios exercising the full allocation pipeline, driven
//! through the public `Driver` API exactly as the CLI would.

use rapst_engine::cp::CpConfig;
use rapst_engine::driver::{AllocationStrategy, Driver};
use rapst_engine::model::{InstanceId, RaPstFixture};

fn cfg() -> CpConfig {
    CpConfig { time_limit_secs: 2, sigma: 0, horizon: 1000, break_symmetries: false, alpha: 0.0 }
}

fn instance_from(fixture_json: serde_json::Value, id: &str, release_time: i64) -> rapst_engine::model::Instance {
    let fixture: RaPstFixture = serde_json::from_value(fixture_json).unwrap();
    let ra_pst = fixture.build(InstanceId::new(id), release_time).unwrap();
    rapst_engine::model::Instance::new(InstanceId::new(id), release_time, ra_pst)
}

/// Scenario 1: trivial single task, one resource.
#[test]
fn trivial_single_task_one_resource() {
    let mut driver = Driver::new(std::env::temp_dir().join("rapst_e2e_1.json"), cfg());
    driver.add_instance(
        instance_from(
            serde_json::json!({
                "tasks": ["t1"],
                "branches": [{"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 5}]}]
            }),
            "i1",
            0,
        ),
        AllocationStrategy::Heuristic,
    );

    driver.run().unwrap();

    let instance = &driver.instances()[0];
    let job = instance.ra_pst.jobs.values().find(|j| j.id == "j1").unwrap();
    assert!(job.selected);
    assert_eq!(job.start, Some(0));
    assert_eq!(driver.schedule().objective, 5.0);
}

/// Scenario 2: two tasks joined by precedence on the same resource.
#[test]
fn two_tasks_precedence() {
    let mut driver = Driver::new(std::env::temp_dir().join("rapst_e2e_2.json"), cfg());
    driver.add_instance(
        instance_from(
            serde_json::json!({
                "tasks": ["t1", "t2"],
                "branches": [
                    {"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 3}]},
                    {"task": "t2", "jobs": [{"id": "j2", "resource": "R1", "cost": 4, "after": ["j1"]}]},
                ]
            }),
            "i1",
            0,
        ),
        AllocationStrategy::Heuristic,
    );

    driver.run().unwrap();

    let instance = &driver.instances()[0];
    let j1 = &instance.ra_pst.jobs[instance.ra_pst.jobs.iter().find(|(_, j)| j.id == "j1").unwrap().0];
    let j2 = &instance.ra_pst.jobs[instance.ra_pst.jobs.iter().find(|(_, j)| j.id == "j2").unwrap().0];
    assert_eq!(j1.start, Some(0));
    assert_eq!(j2.start, Some(3));
    assert_eq!(driver.schedule().objective, 7.0);
}

/// Scenario 3: two independent instances contend for one resource; one
/// is pushed behind the other.
#[test]
fn resource_contention_between_instances() {
    let mut driver = Driver::new(std::env::temp_dir().join("rapst_e2e_3.json"), cfg());
    let fixture = serde_json::json!({
        "tasks": ["t1"],
        "branches": [{"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 5}]}]
    });
    driver.add_instance(instance_from(fixture.clone(), "i1", 0), AllocationStrategy::Heuristic);
    driver.add_instance(instance_from(fixture, "i2", 0), AllocationStrategy::Heuristic);

    driver.run().unwrap();

    let starts: Vec<i64> = driver.instances().iter().flat_map(|i| i.ra_pst.jobs.values()).filter_map(|j| j.start).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(sorted, vec![0, 5]);
    assert_eq!(driver.schedule().objective, 10.0);
}

/// Scenario 4: a delete-branch choice beats keeping the deleted task,
/// under the joint CP solve.
#[test]
fn delete_branch_wins_under_joint_cp() {
    let mut driver = Driver::new(std::env::temp_dir().join("rapst_e2e_4.json"), cfg());
    driver.add_instance(
        instance_from(
            serde_json::json!({
                "tasks": ["t1", "t2"],
                "branches": [
                    {"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 3}]},
                    {"task": "t1", "change_type": "Delete", "deletes": ["t2"], "jobs": [{"id": "j2", "resource": "R2", "cost": 2}]},
                    {"task": "t2", "jobs": [{"id": "j3", "resource": "R1", "cost": 4}]},
                ]
            }),
            "i1",
            0,
        ),
        AllocationStrategy::SingleInstanceCp,
    );

    driver.run().unwrap();

    let instance = &driver.instances()[0];
    let t1 = instance.ra_pst.task_key("t1").unwrap();
    let t2 = instance.ra_pst.task_key("t2").unwrap();
    let chosen = instance.applied_branches[&t1];
    assert_eq!(instance.ra_pst.branches[chosen].jobs.len(), 1);
    assert_eq!(instance.ra_pst.jobs[instance.ra_pst.branches[chosen].jobs[0]].id, "j2");
    assert!(instance.ra_pst.tasks[t2].deleted);
    assert_eq!(driver.schedule().objective, 2.0);
}

/// Scenario 6: two branches finish at the same time; the cheaper one
/// wins the tie-break.
#[test]
fn heuristic_tie_break_prefers_lower_cost() {
    let mut driver = Driver::new(std::env::temp_dir().join("rapst_e2e_6.json"), cfg());
    driver.add_instance(
        instance_from(
            serde_json::json!({
                "tasks": ["t1"],
                "branches": [
                    {"task": "t1", "jobs": [
                        {"id": "j-a1", "resource": "R1", "cost": 1},
                        {"id": "j-a2", "resource": "R2", "cost": 2, "after": ["j-a1"]}
                    ]},
                    {"task": "t1", "jobs": [{"id": "j-b", "resource": "R3", "cost": 4}]},
                ]
            }),
            "i1",
            0,
        ),
        AllocationStrategy::Heuristic,
    );

    driver.run().unwrap();

    let instance = &driver.instances()[0];
    let t1 = instance.ra_pst.task_key("t1").unwrap();
    let chosen = instance.applied_branches[&t1];
    let jobs = &instance.ra_pst.branches[chosen].jobs;
    assert_eq!(jobs.len(), 2, "the cheaper (cost 1+2=3) branch, not the cost-4 singleton, must win");
}

/// A schedule document persisted by the driver round-trips through
/// serde and keeps stable composite ids.
#[test]
fn persisted_schedule_document_is_well_formed_json() {
    let out = std::env::temp_dir().join("rapst_e2e_persist.json");
    let mut driver = Driver::new(&out, cfg());
    driver.add_instance(
        instance_from(
            serde_json::json!({
                "tasks": ["t1"],
                "branches": [{"task": "t1", "jobs": [{"id": "j1", "resource": "R1", "cost": 5}]}]
            }),
            "i1",
            0,
        ),
        AllocationStrategy::Heuristic,
    );
    driver.run().unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let doc: rapst_engine::schedule::ScheduleDocument = serde_json::from_str(&text).unwrap();
    assert!(doc.instances[0].jobs.contains_key("i1-j1"));
    assert!(doc.solution.is_some());
    let _ = std::fs::remove_file(&out);
}
