use std::collections::{HashMap, HashSet, VecDeque};
use std::{error, fmt};

use indexmap::IndexMap;
use itertools::Itertools;
use utility::id::{Id, IdSequence};

use model::call::{CallTimes, TrainStationCall};
use model::dispatch_stretch::{DispatchStretch, Segment, StretchDirection};
use model::dispatcher::Dispatcher;
use model::place::{OperationPlace, PlaceKind};
use model::section::{DispatchState, TrainSection};
use model::track_stretch::TrackStretch;
use model::train::{Train, TrainIdentity, TrainState};

use crate::source::DataSource;
use crate::InitError;

/// The data source produced a graph the session cannot run on. Fatal
/// at init.
#[derive(Debug)]
pub enum LayoutError {
    UnknownPlace { id: i64 },
    NotAStation { id: i64 },
    UnknownTrain { id: i64 },
    UnknownPlannedTrack { place_id: i64, track: String },
    DegenerateStretch { id: i64 },
    DegenerateRoute { id: i64 },
    NoPath { from: i64, to: i64 },
    NoDispatchStretch { from: i64, to: i64 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPlace { id } => {
                write!(f, "reference to unknown operation place {}", id)
            }
            Self::NotAStation { id } => {
                write!(f, "place {} is referenced as a station but is none", id)
            }
            Self::UnknownTrain { id } => {
                write!(f, "call references unknown train {}", id)
            }
            Self::UnknownPlannedTrack { place_id, track } => {
                write!(f, "place {} has no track {:?}", place_id, track)
            }
            Self::DegenerateStretch { id } => {
                write!(f, "track stretch {} starts and ends at the same place", id)
            }
            Self::DegenerateRoute { id } => {
                write!(f, "dispatch stretch {} starts and ends at the same station", id)
            }
            Self::NoPath { from, to } => {
                write!(f, "no path through the track graph from {} to {}", from, to)
            }
            Self::NoDispatchStretch { from, to } => {
                write!(f, "no dispatch stretch between stations {} and {}", from, to)
            }
        }
    }
}

impl error::Error for LayoutError {}

/// The whole operating state: the immutable layout graph plus the live
/// train, call, section and occupancy state. All cross-references are
/// stable identifiers resolved through the maps here, so replay never
/// has to re-wire object graphs.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub places: IndexMap<Id<OperationPlace>, OperationPlace>,
    pub track_stretches: IndexMap<Id<TrackStretch>, TrackStretch>,
    pub dispatch_stretches: IndexMap<Id<DispatchStretch>, DispatchStretch>,
    pub trains: IndexMap<Id<Train>, Train>,
    pub calls: IndexMap<Id<TrainStationCall>, TrainStationCall>,
    pub sections: IndexMap<Id<TrainSection>, TrainSection>,
    pub dispatchers: IndexMap<Id<Dispatcher>, Dispatcher>,
}

impl Network {
    fn empty() -> Self {
        Self {
            places: IndexMap::new(),
            track_stretches: IndexMap::new(),
            dispatch_stretches: IndexMap::new(),
            trains: IndexMap::new(),
            calls: IndexMap::new(),
            sections: IndexMap::new(),
            dispatchers: IndexMap::new(),
        }
    }

    /// The station whose dispatcher is authorized to act at `place_id`.
    pub fn control_station_of(
        &self,
        place_id: Id<OperationPlace>,
    ) -> Option<Id<OperationPlace>> {
        self.places
            .get(&place_id)
            .and_then(|place| place.control_station_id(place_id))
    }

    pub fn segments_of(&self, section: &TrainSection) -> Vec<Segment> {
        self.dispatch_stretches
            .get(&section.dispatch_stretch_id)
            .map(|stretch| stretch.segments_in(section.direction))
            .unwrap_or_default()
    }

    pub fn current_segment(&self, section: &TrainSection) -> Option<Segment> {
        self.dispatch_stretches
            .get(&section.dispatch_stretch_id)?
            .segment_in(section.direction, section.current_track_stretch_index)
    }

    pub fn is_previous_departed(&self, section: &TrainSection) -> bool {
        match section.previous_section_id {
            None => true,
            Some(previous_id) => self
                .sections
                .get(&previous_id)
                .map(|previous| previous.state == DispatchState::Departed)
                .unwrap_or(false),
        }
    }

    /// Whether the section currently takes part in dispatching: its
    /// train is still live and its predecessor (if any) has departed.
    pub fn is_section_dispatchable(&self, section: &TrainSection) -> bool {
        let train_live = self
            .trains
            .get(&section.train_id)
            .map(|train| train.state.is_dispatchable())
            .unwrap_or(false);
        train_live && self.is_previous_departed(section)
    }

    /// Sections that still show up on dispatcher boards.
    pub fn is_section_visible(&self, section: &TrainSection) -> bool {
        let train_live = self
            .trains
            .get(&section.train_id)
            .map(|train| train.state.is_dispatchable())
            .unwrap_or(false);
        section.state != DispatchState::Arrived && train_live
    }

    /// The next signal-controlled boundary at or after the current
    /// segment, if any. The final segment's end is the arrival station
    /// and never counts. While one remains ahead, arrival cannot be
    /// granted; unsignalled boundaries never block it.
    pub fn next_signal_boundary(
        &self,
        section: &TrainSection,
    ) -> Option<(usize, Id<OperationPlace>)> {
        let segments = self.segments_of(section);
        for (index, segment) in segments
            .iter()
            .enumerate()
            .skip(section.current_track_stretch_index)
        {
            if index + 1 == segments.len() {
                break;
            }
            let place = self.places.get(&segment.to_place_id)?;
            if matches!(place.kind, PlaceKind::SignalControlledPlace { .. }) {
                return Some((index, segment.to_place_id));
            }
        }
        None
    }

    /// True iff no later section of the same train follows this one.
    pub fn is_last_section(&self, section_id: Id<TrainSection>) -> bool {
        !self
            .sections
            .values()
            .any(|section| section.previous_section_id == Some(section_id))
    }

    /// All stretches leaving `place_id`, in ascending stretch id.
    pub fn outgoing_stretches(
        &self,
        place_id: Id<OperationPlace>,
    ) -> Vec<Id<TrackStretch>> {
        let mut ids: Vec<Id<TrackStretch>> = self
            .track_stretches
            .iter()
            .filter(|(_, stretch)| {
                stretch.from_place_id == place_id || stretch.to_place_id == place_id
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort_by_key(|id| id.raw());
        ids
    }

    pub fn sections_of_train(&self, train_id: Id<Train>) -> Vec<Id<TrainSection>> {
        self.sections
            .iter()
            .filter(|(_, section)| section.train_id == train_id)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Builds the network from the data source: places, stretches, derived
/// dispatch routes, trains, ordered calls and the section chains.
pub async fn build_network<S>(source: &S) -> Result<Network, InitError>
where
    S: DataSource + ?Sized,
{
    let mut network = Network::empty();
    let mut place_ids = IdSequence::new();
    let mut stretch_ids = IdSequence::new();
    let mut route_ids = IdSequence::new();
    let mut train_ids = IdSequence::new();
    let mut call_ids = IdSequence::new();
    let mut section_ids = IdSequence::new();

    // operation places
    for record in source
        .get_operation_places()
        .await
        .map_err(InitError::Source)?
    {
        let id: Id<OperationPlace> = place_ids.resolve(record.id);
        network.places.insert(
            id,
            OperationPlace {
                name: record.name,
                signature: record.signature,
                kind: record.kind,
                tracks: record.tracks,
            },
        );
    }
    for place in network.places.values() {
        if let PlaceKind::SignalControlledPlace {
            controlled_by_station_id,
            ..
        } = place.kind
        {
            match network.places.get(&controlled_by_station_id) {
                Some(station) if matches!(station.kind, PlaceKind::Station { .. }) => {}
                Some(_) => {
                    return Err(LayoutError::NotAStation {
                        id: controlled_by_station_id.raw(),
                    }
                    .into())
                }
                None => {
                    return Err(LayoutError::UnknownPlace {
                        id: controlled_by_station_id.raw(),
                    }
                    .into())
                }
            }
        }
    }

    // track stretches
    for record in source
        .get_track_stretches()
        .await
        .map_err(InitError::Source)?
    {
        let id: Id<TrackStretch> = stretch_ids.resolve(record.id);
        let from = require_place(&network, record.from_place_id)?;
        let to = require_place(&network, record.to_place_id)?;
        if from == to {
            return Err(LayoutError::DegenerateStretch { id: id.raw() }.into());
        }
        network.track_stretches.insert(
            id,
            TrackStretch {
                from_place_id: from,
                to_place_id: to,
                tracks: record.tracks,
                occupancies: Vec::new(),
            },
        );
    }

    // dispatch stretches, segments derived by shortest path
    let adjacency = adjacency_of(&network);
    for record in source
        .get_dispatch_stretches()
        .await
        .map_err(InitError::Source)?
    {
        let id: Id<DispatchStretch> = route_ids.resolve(record.id);
        let from = require_station(&network, record.from_station_id)?;
        let to = require_station(&network, record.to_station_id)?;
        if from == to {
            return Err(LayoutError::DegenerateRoute { id: id.raw() }.into());
        }
        let segments =
            shortest_path(&adjacency, from, to).ok_or(LayoutError::NoPath {
                from: from.raw(),
                to: to.raw(),
            })?;
        log::debug!(
            "dispatch stretch {}: {} segments between {} and {}",
            id,
            segments.len(),
            from,
            to
        );
        network.dispatch_stretches.insert(
            id,
            DispatchStretch {
                from_station_id: from,
                to_station_id: to,
                segments,
            },
        );
    }

    // trains
    for record in source.get_trains().await.map_err(InitError::Source)? {
        let id: Id<Train> = train_ids.resolve(record.id);
        network.trains.insert(
            id,
            Train {
                company: record.company,
                identity: TrainIdentity {
                    prefix: record.prefix,
                    number: record.number,
                },
                state: TrainState::Planned,
                previous_state: None,
                max_length: record.max_length,
            },
        );
    }

    // calls
    for record in source
        .get_train_station_calls()
        .await
        .map_err(InitError::Source)?
    {
        let id: Id<TrainStationCall> = call_ids.resolve(record.id);
        let train_id = Id::new(record.train_id);
        if !network.trains.contains_key(&train_id) {
            return Err(LayoutError::UnknownTrain {
                id: record.train_id,
            }
            .into());
        }
        let place_id = require_place(&network, record.place_id)?;
        if let Some(track) = &record.planned_track {
            let place = network.places.get(&place_id);
            if place.and_then(|place| place.track(track)).is_none() {
                return Err(LayoutError::UnknownPlannedTrack {
                    place_id: place_id.raw(),
                    track: track.clone(),
                }
                .into());
            }
        }
        network.calls.insert(
            id,
            TrainStationCall {
                train_id,
                place_id,
                scheduled: CallTimes {
                    arrival: record.scheduled_arrival,
                    departure: record.scheduled_departure,
                },
                planned_track: record.planned_track,
                live_track: None,
                observed_arrival: None,
                observed_departure: None,
                is_arrival: true,
                is_departure: true,
                sequence_number: record.sequence_number,
            },
        );
    }

    // journey order and section chains
    let train_ids_in_order: Vec<Id<Train>> = network.trains.keys().copied().collect();
    for train_id in train_ids_in_order {
        let mut journey: Vec<Id<TrainStationCall>> = network
            .calls
            .iter()
            .filter(|(_, call)| call.train_id == train_id)
            .map(|(id, _)| *id)
            .collect();
        journey.sort_by_key(|id| {
            let call = &network.calls[id];
            (call.scheduled.departure, call.sequence_number, id.raw())
        });
        let last = journey.len();
        for (position, call_id) in journey.iter().enumerate() {
            if let Some(call) = network.calls.get_mut(call_id) {
                call.sequence_number = position as i32 + 1;
                call.is_arrival = position > 0;
                call.is_departure = position + 1 < last;
            }
        }

        let mut previous_section_id: Option<Id<TrainSection>> = None;
        for (departure_call_id, arrival_call_id) in
            journey.iter().copied().tuple_windows()
        {
            let departure_place = network.calls[&departure_call_id].place_id;
            let arrival_place = network.calls[&arrival_call_id].place_id;
            let (dispatch_stretch_id, direction) = network
                .dispatch_stretches
                .iter()
                .find_map(|(id, stretch)| {
                    stretch
                        .direction_between(departure_place, arrival_place)
                        .map(|direction| (*id, direction))
                })
                .ok_or(LayoutError::NoDispatchStretch {
                    from: departure_place.raw(),
                    to: arrival_place.raw(),
                })?;
            let section_id: Id<TrainSection> = Id::new(section_ids.next());
            network.sections.insert(
                section_id,
                TrainSection {
                    train_id,
                    dispatch_stretch_id,
                    direction,
                    departure_call_id,
                    arrival_call_id,
                    previous_section_id,
                    state: DispatchState::None,
                    current_track_stretch_index: 0,
                },
            );
            previous_section_id = Some(section_id);
        }
    }

    // one dispatcher per manned station
    for (id, place) in &network.places {
        if place.is_manned_station() {
            network.dispatchers.insert(
                Id::new(id.raw()),
                Dispatcher {
                    station_id: *id,
                    name: place.name.clone(),
                    signature: place.signature.clone(),
                },
            );
        }
    }

    log::info!(
        "built network: {} places, {} track stretches, {} dispatch stretches, {} trains, {} sections",
        network.places.len(),
        network.track_stretches.len(),
        network.dispatch_stretches.len(),
        network.trains.len(),
        network.sections.len()
    );
    Ok(network)
}

fn require_place(
    network: &Network,
    raw: i64,
) -> Result<Id<OperationPlace>, LayoutError> {
    let id = Id::new(raw);
    if network.places.contains_key(&id) {
        Ok(id)
    } else {
        Err(LayoutError::UnknownPlace { id: raw })
    }
}

fn require_station(
    network: &Network,
    raw: i64,
) -> Result<Id<OperationPlace>, LayoutError> {
    let id = require_place(network, raw)?;
    match network.places.get(&id).map(|place| &place.kind) {
        Some(PlaceKind::Station { .. }) => Ok(id),
        _ => Err(LayoutError::NotAStation { id: raw }),
    }
}

type Adjacency =
    HashMap<Id<OperationPlace>, Vec<(Id<TrackStretch>, Id<OperationPlace>)>>;

fn adjacency_of(network: &Network) -> Adjacency {
    let mut adjacency: Adjacency = HashMap::new();
    for (id, stretch) in &network.track_stretches {
        adjacency
            .entry(stretch.from_place_id)
            .or_default()
            .push((*id, stretch.to_place_id));
        adjacency
            .entry(stretch.to_place_id)
            .or_default()
            .push((*id, stretch.from_place_id));
    }
    // ascending stretch ids, so equal-length paths resolve towards the
    // smaller ones
    for neighbors in adjacency.values_mut() {
        neighbors.sort_by_key(|(id, _)| id.raw());
    }
    adjacency
}

/// Breadth-first search over the undirected stretch graph: fewest
/// hops, neighbors visited in ascending stretch id.
fn shortest_path(
    adjacency: &Adjacency,
    from: Id<OperationPlace>,
    to: Id<OperationPlace>,
) -> Option<Vec<Segment>> {
    let mut visited: HashSet<Id<OperationPlace>> = HashSet::from([from]);
    let mut came_from: HashMap<
        Id<OperationPlace>,
        (Id<OperationPlace>, Id<TrackStretch>),
    > = HashMap::new();
    let mut queue: VecDeque<Id<OperationPlace>> = VecDeque::from([from]);

    while let Some(current) = queue.pop_front() {
        if current == to {
            break;
        }
        let Some(neighbors) = adjacency.get(&current) else {
            continue;
        };
        for (stretch_id, neighbor) in neighbors {
            if visited.insert(*neighbor) {
                came_from.insert(*neighbor, (current, *stretch_id));
                queue.push_back(*neighbor);
            }
        }
    }

    if !visited.contains(&to) {
        return None;
    }
    let mut segments = Vec::new();
    let mut cursor = to;
    while cursor != from {
        let (predecessor, stretch_id) = came_from.get(&cursor)?;
        segments.push(Segment {
            track_stretch_id: *stretch_id,
            from_place_id: *predecessor,
            to_place_id: cursor,
        });
        cursor = *predecessor;
    }
    segments.reverse();
    Some(segments)
}
