//! The Schedule Document: the canonical exchange format, and the
//! serialization bridge between an [`crate::model::Instance`]'s arena and
//! its flat `InstanceRep`.

pub mod document;
pub mod serialize;

pub use document::{BranchRep, InstanceRep, JobRep, ScheduleDocument, SolutionMeta, TaskRep};
pub use serialize::{apply_rep_back, serialize_instance, SerializedInstance};
