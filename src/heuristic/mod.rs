//! Earliest-finish-time Heuristic Allocator: task-by-task
//! allocation against a shared, per-resource timeline.

pub mod allocator;
pub mod timeline;

pub use allocator::HeuristicAllocator;
pub use timeline::ResourceTimeline;
