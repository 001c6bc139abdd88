use std::collections::HashMap;

use crate::model::ResourceId;

/// Per-resource timeline of already-committed (selected) job intervals,
/// used to find the earliest free window for a new job. Generalizes the
/// teacher's capacity-`Slot` bookkeeping (`schedule/slot.rs`) to a
/// continuous, unit-capacity interval list — each resource here runs
/// strictly one job at a time, so a resource's
/// timeline is just its sorted, pairwise non-overlapping interval set.
#[derive(Debug, Clone, Default)]
pub struct ResourceTimeline {
    intervals: HashMap<ResourceId, Vec<(i64, i64)>>,
}

impl ResourceTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest `start >= earliest` such that `[start, start + duration)`
    /// does not overlap any interval already booked on `resource`.
    pub fn earliest_free_slot(&self, resource: &ResourceId, duration: i64, earliest: i64) -> i64 {
        let mut candidate = earliest;
        let Some(booked) = self.intervals.get(resource) else {
            return candidate;
        };
        // `booked` is kept sorted by start; scan forward, pushing the
        // candidate past any interval it would overlap.
        loop {
            let mut moved = false;
            for &(s, e) in booked {
                if candidate < e && s < candidate + duration {
                    candidate = e;
                    moved = true;
                }
            }
            if !moved {
                return candidate;
            }
        }
    }

    pub fn book(&mut self, resource: ResourceId, start: i64, end: i64) {
        let entry = self.intervals.entry(resource).or_default();
        entry.push((start, end));
        entry.sort_unstable_by_key(|&(s, _)| s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_booking_starts_at_earliest() {
        let tl = ResourceTimeline::new();
        let r = ResourceId::new("R1");
        assert_eq!(tl.earliest_free_slot(&r, 5, 0), 0);
    }

    #[test]
    fn second_booking_is_pushed_past_the_first() {
        let mut tl = ResourceTimeline::new();
        let r = ResourceId::new("R1");
        tl.book(r.clone(), 0, 5);
        assert_eq!(tl.earliest_free_slot(&r, 5, 0), 5);
    }

    #[test]
    fn fits_in_a_gap() {
        let mut tl = ResourceTimeline::new();
        let r = ResourceId::new("R1");
        tl.book(r.clone(), 0, 5);
        tl.book(r.clone(), 10, 15);
        assert_eq!(tl.earliest_free_slot(&r, 5, 0), 5);
        assert_eq!(tl.earliest_free_slot(&r, 6, 0), 15);
    }
}
