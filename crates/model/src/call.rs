use chrono::Duration;
use schemars::JsonSchema;
use serde::Serialize;
use utility::id::{HasId, Id};
use utility::serde::duration;

use crate::place::OperationPlace;
use crate::train::Train;

/// Scheduled arrival and departure as day-durations. The fast clock
/// may run in any direction, so these are never compared against real
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallTimes {
    #[serde(serialize_with = "duration::serialize")]
    #[schemars(schema_with = "duration::schema")]
    pub arrival: Duration,
    #[serde(serialize_with = "duration::serialize")]
    #[schemars(schema_with = "duration::schema")]
    pub departure: Duration,
}

/// One scheduled stop of a train at an operation place.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainStationCall {
    pub train_id: Id<Train>,
    pub place_id: Id<OperationPlace>,
    pub scheduled: CallTimes,
    /// Planned station track number, validated against the place.
    pub planned_track: Option<String>,
    /// Live override, set by a dispatcher during the session.
    pub live_track: Option<String>,
    #[serde(serialize_with = "duration::serialize_option")]
    #[schemars(schema_with = "duration::schema_option")]
    pub observed_arrival: Option<Duration>,
    #[serde(serialize_with = "duration::serialize_option")]
    #[schemars(schema_with = "duration::schema_option")]
    pub observed_departure: Option<Duration>,
    pub is_arrival: bool,
    pub is_departure: bool,
    /// Position within the train's journey, 1-based.
    pub sequence_number: i32,
}

impl TrainStationCall {
    /// The track the call currently stands on: the live override if a
    /// dispatcher set one, else the planned track.
    pub fn current_track(&self) -> Option<&str> {
        self.live_track
            .as_deref()
            .or(self.planned_track.as_deref())
    }
}

impl HasId for TrainStationCall {
    type IdType = i64;
}
