use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utility::id::Id;
use utility::serde::duration;

use model::call::TrainStationCall;
use model::place::OperationPlace;
use model::section::{DispatchState, TrainSection};
use model::train::{Train, TrainState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainChangeType {
    State,
    ObservedArrival,
    ObservedDeparture,
    TrackChange,
}

/// One line of the train-events log. Column layout is fixed:
/// `Timestamp,ChangeType,TrainId,CallId,State,Time,NewTrack`, unused
/// columns stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainEventRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ChangeType")]
    pub change_type: TrainChangeType,
    #[serde(rename = "TrainId")]
    pub train_id: Option<Id<Train>>,
    #[serde(rename = "CallId")]
    pub call_id: Option<Id<TrainStationCall>>,
    #[serde(rename = "State")]
    pub state: Option<TrainState>,
    #[serde(
        rename = "Time",
        serialize_with = "duration::serialize_option",
        deserialize_with = "duration::deserialize_option"
    )]
    pub time: Option<Duration>,
    #[serde(rename = "NewTrack")]
    pub new_track: Option<String>,
}

impl TrainEventRecord {
    fn empty(timestamp: DateTime<Utc>, change_type: TrainChangeType) -> Self {
        Self {
            timestamp,
            change_type,
            train_id: None,
            call_id: None,
            state: None,
            time: None,
            new_track: None,
        }
    }

    pub fn state_change(
        timestamp: DateTime<Utc>,
        train_id: Id<Train>,
        state: TrainState,
    ) -> Self {
        Self {
            train_id: Some(train_id),
            state: Some(state),
            ..Self::empty(timestamp, TrainChangeType::State)
        }
    }

    pub fn observed_arrival(
        timestamp: DateTime<Utc>,
        call_id: Id<TrainStationCall>,
        time: Duration,
    ) -> Self {
        Self {
            call_id: Some(call_id),
            time: Some(time),
            ..Self::empty(timestamp, TrainChangeType::ObservedArrival)
        }
    }

    pub fn observed_departure(
        timestamp: DateTime<Utc>,
        call_id: Id<TrainStationCall>,
        time: Duration,
    ) -> Self {
        Self {
            call_id: Some(call_id),
            time: Some(time),
            ..Self::empty(timestamp, TrainChangeType::ObservedDeparture)
        }
    }

    pub fn track_change(
        timestamp: DateTime<Utc>,
        call_id: Id<TrainStationCall>,
        new_track: String,
    ) -> Self {
        Self {
            call_id: Some(call_id),
            new_track: Some(new_track),
            ..Self::empty(timestamp, TrainChangeType::TrackChange)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchChangeType {
    State,
    Pass,
}

/// One line of the dispatch-events log. Column layout is fixed:
/// `Timestamp,ChangeType,SectionId,State,TrackStretchIndex,SignalPlaceId`.
///
/// For `State` records the index is populated iff the new state is
/// `Departed`; for `Pass` records it is the new index and the signal
/// place names the place being passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEventRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ChangeType")]
    pub change_type: DispatchChangeType,
    #[serde(rename = "SectionId")]
    pub section_id: Id<TrainSection>,
    #[serde(rename = "State")]
    pub state: Option<DispatchState>,
    #[serde(rename = "TrackStretchIndex")]
    pub track_stretch_index: Option<usize>,
    #[serde(rename = "SignalPlaceId")]
    pub signal_place_id: Option<Id<OperationPlace>>,
}

impl DispatchEventRecord {
    pub fn state_change(
        timestamp: DateTime<Utc>,
        section_id: Id<TrainSection>,
        state: DispatchState,
        track_stretch_index: Option<usize>,
    ) -> Self {
        Self {
            timestamp,
            change_type: DispatchChangeType::State,
            section_id,
            state: Some(state),
            track_stretch_index,
            signal_place_id: None,
        }
    }

    pub fn pass(
        timestamp: DateTime<Utc>,
        section_id: Id<TrainSection>,
        track_stretch_index: usize,
        signal_place_id: Id<OperationPlace>,
    ) -> Self {
        Self {
            timestamp,
            change_type: DispatchChangeType::Pass,
            section_id,
            state: None,
            track_stretch_index: Some(track_stretch_index),
            signal_place_id: Some(signal_place_id),
        }
    }
}
