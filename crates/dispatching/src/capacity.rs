use std::collections::{HashSet, VecDeque};
use std::{error, fmt};

use chrono::Duration;
use utility::id::Id;

use model::dispatch_stretch::Segment;
use model::section::TrainSection;
use model::track_stretch::{
    StretchOccupancy, Track, TrackDirection, TrackStretch, TravelDirection,
};

use crate::layout::Network;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// No usable free track on the stretch (or on one reached through
    /// an unsignalled junction).
    NoCapacity { track_stretch_id: i64 },
    /// Opposing traffic on a single-track stretch.
    DirectionConflict { track_stretch_id: i64 },
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCapacity { track_stretch_id } => {
                write!(f, "no free track on stretch {}", track_stretch_id)
            }
            Self::DirectionConflict { track_stretch_id } => {
                write!(f, "opposing traffic on single-track stretch {}", track_stretch_id)
            }
        }
    }
}

impl error::Error for CapacityError {}

#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub track_stretch_id: Id<TrackStretch>,
    pub track_index: usize,
    pub travel: TravelDirection,
}

/// A fully checked occupancy, not yet applied. Planning never touches
/// the network, so a failed depart or pass leaves no trace; applying a
/// plan cannot fail.
#[derive(Debug, Clone)]
pub struct OccupancyPlan {
    pub section_id: Id<TrainSection>,
    pub root_stretch_id: Id<TrackStretch>,
    pub new_entries: Vec<PlannedEntry>,
    /// Stretches the section already holds which stay protected under
    /// the new root (a junction ahead still covers them).
    pub restamped: Vec<Id<TrackStretch>>,
}

/// Plans the occupancy of `root` for `section_id`, cascading over
/// unsignalled junctions: every stretch leaving such a junction is
/// claimed too, until a control point or a plain place ends the
/// recursion.
pub fn plan_occupancy(
    network: &Network,
    section_id: Id<TrainSection>,
    root: Segment,
    train_max_length: Option<f64>,
) -> Result<OccupancyPlan, CapacityError> {
    let mut plan = OccupancyPlan {
        section_id,
        root_stretch_id: root.track_stretch_id,
        new_entries: Vec::new(),
        restamped: Vec::new(),
    };
    let mut visited: HashSet<Id<TrackStretch>> = HashSet::new();
    let mut queue: VecDeque<Segment> = VecDeque::from([root]);

    while let Some(segment) = queue.pop_front() {
        if !visited.insert(segment.track_stretch_id) {
            continue;
        }
        let Some(stretch) = network.track_stretches.get(&segment.track_stretch_id)
        else {
            continue;
        };
        let Some(travel) = stretch.travel_from(segment.from_place_id) else {
            continue;
        };

        if stretch.occupancy_of(section_id).is_some() {
            plan.restamped.push(segment.track_stretch_id);
        } else {
            if stretch.usable_track_count() == 1
                && stretch.occupancies.iter().any(|occupancy| {
                    occupancy.section_id != section_id && occupancy.travel != travel
                })
            {
                return Err(CapacityError::DirectionConflict {
                    track_stretch_id: segment.track_stretch_id.raw(),
                });
            }
            let track_index = select_track(stretch, travel, train_max_length)
                .ok_or(CapacityError::NoCapacity {
                    track_stretch_id: segment.track_stretch_id.raw(),
                })?;
            plan.new_entries.push(PlannedEntry {
                track_stretch_id: segment.track_stretch_id,
                track_index,
                travel,
            });
        }

        let junction = network
            .places
            .get(&segment.to_place_id)
            .map(|place| place.cascades_occupancy())
            .unwrap_or(false);
        if junction {
            for outgoing in network.outgoing_stretches(segment.to_place_id) {
                if outgoing == segment.track_stretch_id {
                    continue;
                }
                let Some(next) = network.track_stretches.get(&outgoing) else {
                    continue;
                };
                let Some(far_end) = next.other_end(segment.to_place_id) else {
                    continue;
                };
                queue.push_back(Segment {
                    track_stretch_id: outgoing,
                    from_place_id: segment.to_place_id,
                    to_place_id: far_end,
                });
            }
        }
    }
    Ok(plan)
}

/// Track choice on one stretch: closed tracks never, one-way tracks
/// matching the travel direction first, then a free double-directed
/// track, preferring the up-track when running from→to. Candidates are
/// taken in list order, which is the data source's display order.
fn select_track(
    stretch: &TrackStretch,
    travel: TravelDirection,
    train_max_length: Option<f64>,
) -> Option<usize> {
    let fits = |track: &Track| match (train_max_length, track.max_length) {
        (Some(train), Some(track_limit)) => train <= track_limit,
        _ => true,
    };
    let matching_one_way = match travel {
        TravelDirection::FromTo => TrackDirection::ForwardOnly,
        TravelDirection::ToFrom => TrackDirection::BackwardOnly,
    };

    if let Some(index) = stretch
        .tracks
        .iter()
        .enumerate()
        .filter(|(index, track)| {
            track.direction == matching_one_way
                && !stretch.is_track_occupied(*index)
                && fits(track)
        })
        .map(|(index, _)| index)
        .next()
    {
        return Some(index);
    }

    let mut candidates: Vec<(usize, &Track)> = stretch
        .tracks
        .iter()
        .enumerate()
        .filter(|(index, track)| {
            track.direction == TrackDirection::DoubleDirected
                && !stretch.is_track_occupied(*index)
                && fits(track)
        })
        .collect();
    candidates.sort_by_key(|(index, track)| {
        let against_preference = match travel {
            TravelDirection::FromTo => !track.is_up_track,
            TravelDirection::ToFrom => track.is_up_track,
        };
        (against_preference, *index)
    });
    candidates.first().map(|(index, _)| *index)
}

/// Applies a plan. Restamped occupancies keep their entry time; only
/// their release group changes.
pub fn apply_plan(network: &mut Network, plan: &OccupancyPlan, entered_at: Duration) {
    for entry in &plan.new_entries {
        if let Some(stretch) = network.track_stretches.get_mut(&entry.track_stretch_id)
        {
            stretch.occupancies.push(StretchOccupancy {
                section_id: plan.section_id,
                track_index: entry.track_index,
                travel: entry.travel,
                root_stretch_id: plan.root_stretch_id,
                entered_at,
            });
        }
    }
    for stretch_id in &plan.restamped {
        if let Some(stretch) = network.track_stretches.get_mut(stretch_id) {
            for occupancy in &mut stretch.occupancies {
                if occupancy.section_id == plan.section_id {
                    occupancy.root_stretch_id = plan.root_stretch_id;
                }
            }
        }
    }
    log::debug!(
        "section {} occupies {} stretches (root {})",
        plan.section_id,
        plan.new_entries.len() + plan.restamped.len(),
        plan.root_stretch_id
    );
}

/// Releases the occupancy group a section took when it entered
/// `root_stretch_id`, leaving occupancies restamped to a newer root in
/// place.
pub fn release_group(
    network: &mut Network,
    section_id: Id<TrainSection>,
    root_stretch_id: Id<TrackStretch>,
) {
    for stretch in network.track_stretches.values_mut() {
        stretch.occupancies.retain(|occupancy| {
            occupancy.section_id != section_id
                || occupancy.root_stretch_id != root_stretch_id
        });
    }
}

/// Releases everything a section holds, cascaded or not.
pub fn release_all(network: &mut Network, section_id: Id<TrainSection>) {
    for stretch in network.track_stretches.values_mut() {
        stretch
            .occupancies
            .retain(|occupancy| occupancy.section_id != section_id);
    }
}
