use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::HasId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum TrainState {
    Planned,
    Manned,
    Running,
    Canceled,
    Aborted,
    Completed,
}

impl TrainState {
    /// States in which the train still takes part in dispatching.
    pub fn is_dispatchable(self) -> bool {
        !matches!(self, Self::Canceled | Self::Aborted | Self::Completed)
    }
}

impl fmt::Display for TrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planned => "Planned",
            Self::Manned => "Manned",
            Self::Running => "Running",
            Self::Canceled => "Canceled",
            Self::Aborted => "Aborted",
            Self::Completed => "Completed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainIdentity {
    pub prefix: String,
    pub number: String,
}

impl fmt::Display for TrainIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.number)
        } else {
            write!(f, "{} {}", self.prefix, self.number)
        }
    }
}

/// A scheduled train of the operating session.
///
/// `previous_state` is a single-slot undo buffer: it captures the state
/// immediately before the most recent explicit train action and is
/// cleared again by undo. It is never two deep.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Train {
    pub company: String,
    pub identity: TrainIdentity,
    pub state: TrainState,
    pub previous_state: Option<TrainState>,
    pub max_length: Option<f64>,
}

impl HasId for Train {
    type IdType = i64;
}
