use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::dispatcher::Dispatcher;
use crate::place::OperationPlace;
use crate::section::TrainSection;

/// The closed set of actions a dispatcher can take. The legal-set
/// function and the executor share this one source of truth.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum ActionKind {
    Request,
    Accept,
    Reject,
    Revoke,
    Depart,
    Pass,
    Arrive,
    Clear,
    Manned,
    Canceled,
    Aborted,
    UndoTrainState,
}

impl ActionKind {
    /// Actions that change the train's state rather than a section's
    /// dispatch state.
    pub fn is_train_action(self) -> bool {
        matches!(
            self,
            Self::Manned | Self::Canceled | Self::Aborted | Self::UndoTrainState
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "Request",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Revoke => "Revoke",
            Self::Depart => "Depart",
            Self::Pass => "Pass",
            Self::Arrive => "Arrive",
            Self::Clear => "Clear",
            Self::Manned => "Manned",
            Self::Canceled => "Canceled",
            Self::Aborted => "Aborted",
            Self::UndoTrainState => "Undo",
        };
        write!(f, "{}", name)
    }
}

/// One legal action for one dispatcher on one section, ready for a
/// collaborating surface to render and send back verbatim.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    pub kind: ActionKind,
    pub section_id: Id<TrainSection>,
    pub dispatcher_id: Id<Dispatcher>,
    /// For `Pass`: the signal place being crossed.
    pub target_place_id: Option<Id<OperationPlace>>,
    pub label: String,
}

impl ActionContext {
    /// Whether `other` asks for the same state change. The label is
    /// display data and does not take part in the comparison.
    pub fn matches(&self, other: &ActionContext) -> bool {
        self.kind == other.kind
            && self.section_id == other.section_id
            && self.target_place_id == other.target_place_id
    }
}
