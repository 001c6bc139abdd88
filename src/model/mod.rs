//! The RA-PST data model: flat arenas of tasks, branches
//! and jobs, plus the process instance that owns a private deep copy of
//! one such arena.

pub mod branch;
pub mod ids;
pub mod instance;
pub mod job;
pub mod rapst;
pub mod task;

pub use branch::{Branch, ChangeType};
pub use ids::{BranchId, BranchKey, InstanceId, JobId, JobKey, ResourceId, TaskId, TaskKey};
pub use instance::Instance;
pub use job::Job;
pub use rapst::{BranchFixture, BranchView, FixtureChangeType, JobFixture, RaPst, RaPstFixture};
pub use task::Task;
