//! Greedy lane assignment for the day timeline.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};

use crate::services::recurrence::{Occurrence, OccurrenceId};

/// Short or point-in-time occurrences still take this much room on the timeline.
pub const MIN_VISUAL_MINUTES: i64 = 15;

/// End used for layout: the real end, stretched to the visual minimum.
pub fn effective_end(occ: &Occurrence) -> NaiveDateTime {
    occ.start_time + occ.duration().max(Duration::minutes(MIN_VISUAL_MINUTES))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneLayout {
    pub lanes: HashMap<OccurrenceId, usize>,
    pub lane_count: usize,
}

impl LaneLayout {
    pub fn lane_of(&self, id: &OccurrenceId) -> Option<usize> {
        self.lanes.get(id).copied()
    }
}

/// First-fit packing over the time axis.
///
/// Expects occurrences sorted by start, longer first on ties. Each one goes to
/// the first lane whose last end is not after its start, or opens a new lane.
pub fn pack(occurrences: &[Occurrence]) -> LaneLayout {
    let mut lane_ends: Vec<NaiveDateTime> = Vec::new();
    let mut lanes = HashMap::with_capacity(occurrences.len());

    for occ in occurrences {
        let end = effective_end(occ);
        let lane = match lane_ends.iter().position(|lane_end| *lane_end <= occ.start_time) {
            Some(i) => {
                lane_ends[i] = end;
                i
            }
            None => {
                lane_ends.push(end);
                lane_ends.len() - 1
            }
        };
        lanes.insert(occ.id.clone(), lane);
    }

    LaneLayout {
        lanes,
        lane_count: lane_ends.len(),
    }
}
