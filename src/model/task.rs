use serde::{Deserialize, Serialize};

use crate::model::ids::BranchKey;

/// A task as it appears in the process tree: an identifier plus every
/// admissible branch. A task may be marked deleted by the selection of a
/// branch elsewhere in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub branches: Vec<BranchKey>,
    pub deleted: bool,
    /// Written by the change-operation engine once a branch has been
    /// applied; consumed by the heuristic allocator and the serializer.
    pub expected_start: Option<i64>,
    pub expected_end: Option<i64>,
    /// Resource profile chosen for this task, once allocated.
    pub allocation: Option<BranchKey>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Task { id: id.into(), branches: Vec::new(), deleted: false, expected_start: None, expected_end: None, allocation: None }
    }
}
