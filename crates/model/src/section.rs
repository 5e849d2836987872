use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::call::TrainStationCall;
use crate::dispatch_stretch::{DispatchStretch, StretchDirection};
use crate::train::Train;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum DispatchState {
    None,
    Requested,
    Accepted,
    Rejected,
    Revoked,
    Departed,
    Arrived,
    Canceled,
}

impl DispatchState {
    /// States a departure dispatcher may request from again.
    pub fn allows_request(self) -> bool {
        matches!(self, Self::None | Self::Rejected | Self::Revoked)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Requested => "Requested",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Revoked => "Revoked",
            Self::Departed => "Departed",
            Self::Arrived => "Arrived",
            Self::Canceled => "Canceled",
        };
        write!(f, "{}", name)
    }
}

/// One leg of a train's journey over one dispatch stretch, between a
/// departure call and an arrival call.
///
/// Sections of one train form a linear chain over
/// `previous_section_id`; only the journey's first section has none.
/// `current_track_stretch_index` is meaningful only while the state is
/// `Departed`.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainSection {
    pub train_id: Id<Train>,
    pub dispatch_stretch_id: Id<DispatchStretch>,
    pub direction: StretchDirection,
    pub departure_call_id: Id<TrainStationCall>,
    pub arrival_call_id: Id<TrainStationCall>,
    pub previous_section_id: Option<Id<TrainSection>>,
    pub state: DispatchState,
    pub current_track_stretch_index: usize,
}

impl TrainSection {
    pub fn is_first(&self) -> bool {
        self.previous_section_id.is_none()
    }
}

impl HasId for TrainSection {
    type IdType = i64;
}
