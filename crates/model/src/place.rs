use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

/// A numbered track (or platform) inside an operation place. Not
/// capacity-managed; it only names where a train is planned to stand.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationTrack {
    pub number: String,
    pub max_length: Option<f64>,
    pub is_main: bool,
    pub display_order: i32,
    pub platform_length: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PlaceKind {
    /// A manned or unmanned station. A station is its own control point.
    Station { is_manned: bool },
    /// A signal post or signalled junction, operated by some station's
    /// dispatcher.
    SignalControlledPlace {
        controlled_by_station_id: Id<OperationPlace>,
        is_junction: bool,
    },
    /// An unsignalled place. A junction here nobody controls, which is
    /// what triggers the occupancy cascade.
    Other { is_junction: bool },
}

/// Any point of the railway where a train may be located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationPlace {
    pub name: String,
    pub signature: String,
    pub kind: PlaceKind,
    pub tracks: Vec<StationTrack>,
}

impl OperationPlace {
    pub fn is_manned_station(&self) -> bool {
        matches!(self.kind, PlaceKind::Station { is_manned: true })
    }

    /// True for places where a dispatcher (their own or a delegating
    /// station's) watches the traffic. The occupancy cascade stops here.
    pub fn is_control_point(&self) -> bool {
        matches!(
            self.kind,
            PlaceKind::Station { .. } | PlaceKind::SignalControlledPlace { .. }
        )
    }

    /// True iff occupying a stretch that ends here spills over into all
    /// other stretches leaving this place.
    pub fn cascades_occupancy(&self) -> bool {
        matches!(self.kind, PlaceKind::Other { is_junction: true })
    }

    /// The station whose dispatcher is authorized to act here.
    pub fn control_station_id(
        &self,
        own_id: Id<OperationPlace>,
    ) -> Option<Id<OperationPlace>> {
        match self.kind {
            PlaceKind::Station { .. } => Some(own_id),
            PlaceKind::SignalControlledPlace {
                controlled_by_station_id,
                ..
            } => Some(controlled_by_station_id),
            PlaceKind::Other { .. } => None,
        }
    }

    pub fn track(&self, number: &str) -> Option<&StationTrack> {
        self.tracks.iter().find(|track| track.number == number)
    }
}

impl HasId for OperationPlace {
    type IdType = i64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(is_manned: bool) -> OperationPlace {
        OperationPlace {
            name: "Arlberg".to_owned(),
            signature: "Ab".to_owned(),
            kind: PlaceKind::Station { is_manned },
            tracks: Vec::new(),
        }
    }

    #[test]
    fn a_station_is_its_own_control_point() {
        let place = station(true);
        assert_eq!(place.control_station_id(Id::new(5)), Some(Id::new(5)));
    }

    #[test]
    fn a_signal_place_is_controlled_by_its_station() {
        let place = OperationPlace {
            name: "Block 12".to_owned(),
            signature: "B12".to_owned(),
            kind: PlaceKind::SignalControlledPlace {
                controlled_by_station_id: Id::new(2),
                is_junction: false,
            },
            tracks: Vec::new(),
        };
        assert_eq!(place.control_station_id(Id::new(9)), Some(Id::new(2)));
        assert!(place.is_control_point());
        assert!(!place.cascades_occupancy());
    }

    #[test]
    fn only_unsignalled_junctions_cascade() {
        let junction = OperationPlace {
            name: "Wye".to_owned(),
            signature: "W".to_owned(),
            kind: PlaceKind::Other { is_junction: true },
            tracks: Vec::new(),
        };
        assert!(junction.cascades_occupancy());
        assert!(!junction.is_control_point());
        assert!(!station(true).cascades_occupancy());
    }
}
