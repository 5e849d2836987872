use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::place::OperationPlace;
use crate::track_stretch::TrackStretch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StretchDirection {
    Forward,
    Reverse,
}

/// One track stretch of a dispatch stretch, oriented along the
/// direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub track_stretch_id: Id<TrackStretch>,
    pub from_place_id: Id<OperationPlace>,
    pub to_place_id: Id<OperationPlace>,
}

impl Segment {
    pub fn reversed(self) -> Self {
        Self {
            track_stretch_id: self.track_stretch_id,
            from_place_id: self.to_place_id,
            to_place_id: self.from_place_id,
        }
    }
}

/// A logical route between two stations. The segment sequence is
/// derived at build time as the shortest path over the track stretch
/// graph; the reverse direction shares the same stretches.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStretch {
    pub from_station_id: Id<OperationPlace>,
    pub to_station_id: Id<OperationPlace>,
    /// Oriented from `from_station_id` to `to_station_id`.
    pub segments: Vec<Segment>,
}

impl DispatchStretch {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments_in(&self, direction: StretchDirection) -> Vec<Segment> {
        match direction {
            StretchDirection::Forward => self.segments.clone(),
            StretchDirection::Reverse => self
                .segments
                .iter()
                .rev()
                .map(|segment| segment.reversed())
                .collect(),
        }
    }

    pub fn segment_in(
        &self,
        direction: StretchDirection,
        index: usize,
    ) -> Option<Segment> {
        match direction {
            StretchDirection::Forward => self.segments.get(index).copied(),
            StretchDirection::Reverse => {
                let reversed_index = self.segments.len().checked_sub(index + 1)?;
                self.segments.get(reversed_index).map(|s| s.reversed())
            }
        }
    }

    pub fn endpoints_in(
        &self,
        direction: StretchDirection,
    ) -> (Id<OperationPlace>, Id<OperationPlace>) {
        match direction {
            StretchDirection::Forward => (self.from_station_id, self.to_station_id),
            StretchDirection::Reverse => (self.to_station_id, self.from_station_id),
        }
    }

    /// The direction in which this stretch runs from `from` to `to`,
    /// if it does at all.
    pub fn direction_between(
        &self,
        from: Id<OperationPlace>,
        to: Id<OperationPlace>,
    ) -> Option<StretchDirection> {
        if self.from_station_id == from && self.to_station_id == to {
            Some(StretchDirection::Forward)
        } else if self.from_station_id == to && self.to_station_id == from {
            Some(StretchDirection::Reverse)
        } else {
            None
        }
    }
}

impl HasId for DispatchStretch {
    type IdType = i64;
}
