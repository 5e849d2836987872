use std::{error, fmt};

use chrono::{DateTime, Utc};
use utility::id::Id;

use event_log::{
    DispatchChangeType, DispatchEventRecord, EventLogError, TrainChangeType,
    TrainEventRecord,
};
use model::section::{DispatchState, TrainSection};
use model::train::TrainState;

use crate::capacity::{self, CapacityError};
use crate::layout::Network;

/// Replay failed: the logs and the rebuilt layout do not line up, or
/// the replayed state violates an invariant. Fatal; the broker must
/// not serve actions from such a state.
#[derive(Debug)]
pub enum RestoreError {
    EventLog(EventLogError),
    UnknownTrain { id: i64 },
    UnknownCall { id: i64 },
    UnknownSection { id: i64 },
    UnknownTrack { call_id: i64, track: String },
    MalformedRecord { description: String },
    Capacity { section_id: i64, why: CapacityError },
    CorruptState { description: String },
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventLog(why) => write!(f, "{}", why),
            Self::UnknownTrain { id } => write!(f, "log references unknown train {}", id),
            Self::UnknownCall { id } => write!(f, "log references unknown call {}", id),
            Self::UnknownSection { id } => {
                write!(f, "log references unknown section {}", id)
            }
            Self::UnknownTrack { call_id, track } => {
                write!(f, "call {} has no track {:?} at its place", call_id, track)
            }
            Self::MalformedRecord { description } => {
                write!(f, "malformed record: {}", description)
            }
            Self::Capacity { section_id, why } => {
                write!(f, "section {} cannot re-occupy: {}", section_id, why)
            }
            Self::CorruptState { description } => {
                write!(f, "replayed state is corrupt: {}", description)
            }
        }
    }
}

impl error::Error for RestoreError {}

impl From<EventLogError> for RestoreError {
    fn from(why: EventLogError) -> Self {
        Self::EventLog(why)
    }
}

enum ReplayRecord {
    Train(TrainEventRecord),
    Dispatch(DispatchEventRecord),
}

impl ReplayRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Train(record) => record.timestamp,
            Self::Dispatch(record) => record.timestamp,
        }
    }

    /// Train records sort before dispatch records at equal timestamps;
    /// within one file the append order stands.
    fn file_rank(&self) -> u8 {
        match self {
            Self::Train(_) => 0,
            Self::Dispatch(_) => 1,
        }
    }
}

/// Replays both event logs in timestamp order against a freshly built
/// network, re-deriving occupancies as it goes, then verifies the
/// invariants of the result.
pub fn replay(
    network: &mut Network,
    train_records: Vec<TrainEventRecord>,
    dispatch_records: Vec<DispatchEventRecord>,
) -> Result<(), RestoreError> {
    let mut merged: Vec<ReplayRecord> = train_records
        .into_iter()
        .map(ReplayRecord::Train)
        .chain(dispatch_records.into_iter().map(ReplayRecord::Dispatch))
        .collect();
    // stable, so equal keys keep their file order
    merged.sort_by_key(|record| (record.timestamp(), record.file_rank()));
    log::info!("replaying {} event records", merged.len());

    for record in merged {
        match record {
            ReplayRecord::Train(record) => apply_train_record(network, record)?,
            ReplayRecord::Dispatch(record) => apply_dispatch_record(network, record)?,
        }
    }

    verify_invariants(network)
        .map_err(|description| RestoreError::CorruptState { description })
}

fn apply_train_record(
    network: &mut Network,
    record: TrainEventRecord,
) -> Result<(), RestoreError> {
    match record.change_type {
        TrainChangeType::State => {
            let (Some(train_id), Some(state)) = (record.train_id, record.state) else {
                return Err(malformed("state record without train or state"));
            };
            let Some(train) = network.trains.get_mut(&train_id) else {
                return Err(RestoreError::UnknownTrain { id: train_id.raw() });
            };
            // the undo buffer is deliberately not reconstructed
            train.state = state;
        }
        TrainChangeType::ObservedArrival | TrainChangeType::ObservedDeparture => {
            let (Some(call_id), Some(time)) = (record.call_id, record.time) else {
                return Err(malformed("observed time record without call or time"));
            };
            let Some(call) = network.calls.get_mut(&call_id) else {
                return Err(RestoreError::UnknownCall { id: call_id.raw() });
            };
            if record.change_type == TrainChangeType::ObservedArrival {
                call.observed_arrival = Some(time);
            } else {
                call.observed_departure = Some(time);
            }
        }
        TrainChangeType::TrackChange => {
            let (Some(call_id), Some(track)) = (record.call_id, record.new_track)
            else {
                return Err(malformed("track change record without call or track"));
            };
            let Some(call) = network.calls.get(&call_id) else {
                return Err(RestoreError::UnknownCall { id: call_id.raw() });
            };
            let place = network.places.get(&call.place_id);
            if place.and_then(|place| place.track(&track)).is_none() {
                return Err(RestoreError::UnknownTrack {
                    call_id: call_id.raw(),
                    track,
                });
            }
            if let Some(call) = network.calls.get_mut(&call_id) {
                call.live_track = Some(track);
            }
        }
    }
    Ok(())
}

fn apply_dispatch_record(
    network: &mut Network,
    record: DispatchEventRecord,
) -> Result<(), RestoreError> {
    let section_id = record.section_id;
    let Some(section) = network.sections.get(&section_id) else {
        return Err(RestoreError::UnknownSection {
            id: section_id.raw(),
        });
    };
    let old_state = section.state;
    let old_index = section.current_track_stretch_index;

    match record.change_type {
        DispatchChangeType::State => {
            let Some(new_state) = record.state else {
                return Err(malformed("dispatch state record without a state"));
            };
            if new_state == DispatchState::Departed {
                let index = record.track_stretch_index.unwrap_or(0);
                occupy_for_replay(network, section_id, index)?;
                if let Some(section) = network.sections.get_mut(&section_id) {
                    section.current_track_stretch_index = index;
                }
                // departing puts a manned train on the line, with no
                // record of its own
                let train_id = network
                    .sections
                    .get(&section_id)
                    .map(|section| section.train_id);
                if let Some(train) =
                    train_id.and_then(|id| network.trains.get_mut(&id))
                {
                    if train.state == TrainState::Manned {
                        train.state = TrainState::Running;
                    }
                }
            } else if old_state == DispatchState::Departed {
                capacity::release_all(network, section_id);
            }
            if let Some(section) = network.sections.get_mut(&section_id) {
                section.state = new_state;
            }
        }
        DispatchChangeType::Pass => {
            let Some(new_index) = record.track_stretch_index else {
                return Err(malformed("pass record without an index"));
            };
            let segments = network
                .sections
                .get(&section_id)
                .map(|section| network.segments_of(section))
                .unwrap_or_default();
            let old_segment = segments.get(old_index).copied();
            match (record.signal_place_id, segments.get(new_index)) {
                (Some(signal), Some(segment)) if segment.from_place_id != signal => {
                    return Err(malformed("pass record names the wrong signal place"));
                }
                (_, None) => {
                    return Err(malformed("pass record index beyond the route"));
                }
                _ => {}
            }
            occupy_for_replay(network, section_id, new_index)?;
            if let Some(old_segment) = old_segment {
                capacity::release_group(
                    network,
                    section_id,
                    old_segment.track_stretch_id,
                );
            }
            if let Some(section) = network.sections.get_mut(&section_id) {
                section.current_track_stretch_index = new_index;
            }
        }
    }
    Ok(())
}

/// Re-occupies `segments[index]` for a replayed depart or pass, with
/// the same cascade rule the executor uses. Entry times anchor to the
/// call's observed (or scheduled) departure, which the log restores
/// before the dispatch record of the same timestamp.
fn occupy_for_replay(
    network: &mut Network,
    section_id: Id<TrainSection>,
    index: usize,
) -> Result<(), RestoreError> {
    let Some(section) = network.sections.get(&section_id) else {
        return Err(RestoreError::UnknownSection {
            id: section_id.raw(),
        });
    };
    let Some(segment) = network
        .dispatch_stretches
        .get(&section.dispatch_stretch_id)
        .and_then(|stretch| stretch.segment_in(section.direction, index))
    else {
        return Err(malformed("departed record index beyond the route"));
    };
    let train_max_length = network
        .trains
        .get(&section.train_id)
        .and_then(|train| train.max_length);
    let entered_at = network
        .calls
        .get(&section.departure_call_id)
        .map(|call| call.observed_departure.unwrap_or(call.scheduled.departure))
        .unwrap_or_default();

    let plan =
        capacity::plan_occupancy(network, section_id, segment, train_max_length)
            .map_err(|why| RestoreError::Capacity {
                section_id: section_id.raw(),
                why,
            })?;
    capacity::apply_plan(network, &plan, entered_at);
    Ok(())
}

fn malformed(description: &str) -> RestoreError {
    RestoreError::MalformedRecord {
        description: description.to_owned(),
    }
}

/// Checks the universal invariants of a network. Run after replay, and
/// by tests over any reachable state.
pub fn verify_invariants(network: &Network) -> Result<(), String> {
    // every train's sections form one chain with exactly one head
    for train_id in network.trains.keys() {
        let sections = network.sections_of_train(*train_id);
        if sections.is_empty() {
            continue;
        }
        let heads = sections
            .iter()
            .filter(|id| {
                network
                    .sections
                    .get(*id)
                    .map(|section| section.is_first())
                    .unwrap_or(false)
            })
            .count();
        if heads != 1 {
            return Err(format!(
                "train {} has {} first sections",
                train_id, heads
            ));
        }
    }

    for (section_id, section) in &network.sections {
        let segments = network.segments_of(section);
        if !segments.is_empty()
            && section.current_track_stretch_index >= segments.len()
        {
            return Err(format!(
                "section {} index {} beyond its {} segments",
                section_id,
                section.current_track_stretch_index,
                segments.len()
            ));
        }

        let held: Vec<_> = network
            .track_stretches
            .iter()
            .filter(|(_, stretch)| stretch.occupancy_of(*section_id).is_some())
            .map(|(id, _)| *id)
            .collect();
        if section.state == DispatchState::Departed {
            let current = segments
                .get(section.current_track_stretch_index)
                .map(|segment| segment.track_stretch_id);
            if current.map(|id| !held.contains(&id)).unwrap_or(true) {
                return Err(format!(
                    "departed section {} does not hold its current stretch",
                    section_id
                ));
            }
        } else if !held.is_empty() {
            return Err(format!(
                "section {} in state {} holds {} occupancies",
                section_id,
                section.state,
                held.len()
            ));
        }

        // a non-first section this far along implies its predecessor
        // once departed
        if !section.is_first()
            && matches!(
                section.state,
                DispatchState::Requested
                    | DispatchState::Accepted
                    | DispatchState::Departed
                    | DispatchState::Arrived
            )
        {
            let previous_ok = section
                .previous_section_id
                .and_then(|id| network.sections.get(&id))
                .map(|previous| {
                    matches!(
                        previous.state,
                        DispatchState::Departed
                            | DispatchState::Arrived
                            | DispatchState::Canceled
                    )
                })
                .unwrap_or(false);
            if !previous_ok {
                return Err(format!(
                    "section {} progressed although its predecessor never departed",
                    section_id
                ));
            }
        }
    }

    for (stretch_id, stretch) in &network.track_stretches {
        if stretch.usable_track_count() == 1 {
            let mut directions = stretch
                .occupancies
                .iter()
                .map(|occupancy| occupancy.travel);
            if let Some(first) = directions.next() {
                if directions.any(|travel| travel != first) {
                    return Err(format!(
                        "single-track stretch {} holds opposing traffic",
                        stretch_id
                    ));
                }
            }
        }
        for (position, occupancy) in stretch.occupancies.iter().enumerate() {
            if stretch.occupancies[position + 1..]
                .iter()
                .any(|other| other.track_index == occupancy.track_index)
            {
                return Err(format!(
                    "stretch {} track {} is double-occupied",
                    stretch_id, occupancy.track_index
                ));
            }
        }
    }

    Ok(())
}
