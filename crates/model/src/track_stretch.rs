use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};
use utility::serde::duration;

use crate::place::OperationPlace;
use crate::section::TrainSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TrackDirection {
    ForwardOnly,
    BackwardOnly,
    DoubleDirected,
    Closed,
}

/// One physical track of a track stretch.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub designation: Option<String>,
    pub direction: TrackDirection,
    pub is_up_track: bool,
    pub max_length: Option<f64>,
}

/// Direction of travel over a stretch, relative to its from/to
/// orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TravelDirection {
    FromTo,
    ToFrom,
}

impl TravelDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::FromTo => Self::ToFrom,
            Self::ToFrom => Self::FromTo,
        }
    }
}

/// A live occupancy of one track of a stretch by a train section.
/// `root_stretch_id` names the stretch whose entry created it, so a
/// whole cascade group can be released together.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StretchOccupancy {
    pub section_id: Id<TrainSection>,
    pub track_index: usize,
    pub travel: TravelDirection,
    pub root_stretch_id: Id<TrackStretch>,
    #[serde(serialize_with = "duration::serialize")]
    #[schemars(schema_with = "duration::schema")]
    pub entered_at: Duration,
}

/// A physical segment of line between two adjacent operation places.
/// Capacity lives here, never on dispatch stretches.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackStretch {
    pub from_place_id: Id<OperationPlace>,
    pub to_place_id: Id<OperationPlace>,
    pub tracks: Vec<Track>,
    pub occupancies: Vec<StretchOccupancy>,
}

impl TrackStretch {
    /// Tracks that can carry traffic at all. Closed tracks do not count
    /// towards the single-track meet rule.
    pub fn usable_track_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|track| track.direction != TrackDirection::Closed)
            .count()
    }

    pub fn connects(
        &self,
        a: Id<OperationPlace>,
        b: Id<OperationPlace>,
    ) -> bool {
        (self.from_place_id == a && self.to_place_id == b)
            || (self.from_place_id == b && self.to_place_id == a)
    }

    pub fn other_end(
        &self,
        place_id: Id<OperationPlace>,
    ) -> Option<Id<OperationPlace>> {
        if self.from_place_id == place_id {
            Some(self.to_place_id)
        } else if self.to_place_id == place_id {
            Some(self.from_place_id)
        } else {
            None
        }
    }

    /// Travel direction over this stretch when entering at `entry`.
    pub fn travel_from(
        &self,
        entry: Id<OperationPlace>,
    ) -> Option<TravelDirection> {
        if self.from_place_id == entry {
            Some(TravelDirection::FromTo)
        } else if self.to_place_id == entry {
            Some(TravelDirection::ToFrom)
        } else {
            None
        }
    }

    pub fn occupancy_of(
        &self,
        section_id: Id<TrainSection>,
    ) -> Option<&StretchOccupancy> {
        self.occupancies
            .iter()
            .find(|occupancy| occupancy.section_id == section_id)
    }

    pub fn is_track_occupied(&self, track_index: usize) -> bool {
        self.occupancies
            .iter()
            .any(|occupancy| occupancy.track_index == track_index)
    }
}

impl HasId for TrackStretch {
    type IdType = i64;
}
