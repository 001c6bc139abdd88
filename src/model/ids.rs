//! Phantom-typed string identifiers plus the slotmap arena keys used by
//! the RA-PST model.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::marker::PhantomData;

/// A string-backed identifier tagged with its owning domain type so that a
/// `TaskId` and a `ResourceId` can never be confused at compile time, even
/// though both are just wrapped `String`s underneath.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T> {
    pub value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Id { value: value.into(), _marker: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.rsplit("::").next().unwrap_or(full_name);
        write!(f, "{}({:?})", clean_name, self.value)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id: Id<T>) -> Self {
        id.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobTag;

pub type ResourceId = Id<ResourceTag>;
pub type TaskId = Id<TaskTag>;
pub type InstanceId = Id<InstanceTag>;
/// Externally-visible, stable composite branch id: `"<instance>-<task>-<branchIndex>"`.
pub type BranchId = Id<BranchTag>;
/// Externally-visible, stable composite job id: `"<instance>-<job>"`.
pub type JobId = Id<JobTag>;

new_key_type! {
    /// Internal arena key for a [`crate::model::branch::Branch`] inside an
    /// [`crate::model::rapst::RaPst`]. Distinct from the externally
    /// serialized [`BranchId`].
    pub struct BranchKey;

    /// Internal arena key for a [`crate::model::job::Job`].
    pub struct JobKey;

    /// Internal arena key for a [`crate::model::task::Task`].
    pub struct TaskKey;
}
