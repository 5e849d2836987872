use schemars::JsonSchema;
use serde::Serialize;
use utility::id::{HasId, Id};

use crate::place::OperationPlace;

/// A person acting on behalf of a manned station, and of every signal
/// place delegated to that station. Keyed by the station's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dispatcher {
    pub station_id: Id<OperationPlace>,
    pub name: String,
    pub signature: String,
}

impl Dispatcher {
    pub fn id(&self) -> Id<Dispatcher> {
        Id::new(self.station_id.raw())
    }
}

impl HasId for Dispatcher {
    type IdType = i64;
}
