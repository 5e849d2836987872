use chrono::Duration;
use schemars::JsonSchema;
use serde::Serialize;
use utility::id::Id;
use utility::serde::duration;

use model::action::ActionContext;
use model::dispatcher::Dispatcher;
use model::section::{DispatchState, TrainSection};
use model::train::{Train, TrainState};

use crate::actions;
use crate::layout::Network;

/// One row of a dispatcher's arrivals or departures board, with the
/// legal actions for that dispatcher precomputed.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    pub section_id: Id<TrainSection>,
    pub train_id: Id<Train>,
    pub train: String,
    pub company: String,
    pub train_state: TrainState,
    pub state: DispatchState,
    pub from: String,
    pub to: String,
    #[serde(serialize_with = "duration::serialize")]
    #[schemars(schema_with = "duration::schema")]
    pub scheduled_departure: Duration,
    #[serde(serialize_with = "duration::serialize")]
    #[schemars(schema_with = "duration::schema")]
    pub scheduled_arrival: Duration,
    #[serde(serialize_with = "duration::serialize_option")]
    #[schemars(schema_with = "duration::schema_option")]
    pub observed_departure: Option<Duration>,
    #[serde(serialize_with = "duration::serialize_option")]
    #[schemars(schema_with = "duration::schema_option")]
    pub observed_arrival: Option<Duration>,
    pub departure_track: Option<String>,
    pub arrival_track: Option<String>,
    pub actions: Vec<ActionContext>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainView {
    pub train_id: Id<Train>,
    pub name: String,
    pub company: String,
    pub state: TrainState,
    pub previous_state: Option<TrainState>,
}

pub fn train_view(network: &Network, train_id: Id<Train>) -> Option<TrainView> {
    let train = network.trains.get(&train_id)?;
    Some(TrainView {
        train_id,
        name: train.identity.to_string(),
        company: train.company.clone(),
        state: train.state,
        previous_state: train.previous_state,
    })
}

pub fn section_view(
    network: &Network,
    dispatcher_id: Id<Dispatcher>,
    section_id: Id<TrainSection>,
) -> Option<SectionView> {
    let section = network.sections.get(&section_id)?;
    let train = network.trains.get(&section.train_id)?;
    let departure_call = network.calls.get(&section.departure_call_id)?;
    let arrival_call = network.calls.get(&section.arrival_call_id)?;
    let from = network.places.get(&departure_call.place_id)?;
    let to = network.places.get(&arrival_call.place_id)?;
    Some(SectionView {
        section_id,
        train_id: section.train_id,
        train: train.identity.to_string(),
        company: train.company.clone(),
        train_state: train.state,
        state: section.state,
        from: from.name.clone(),
        to: to.name.clone(),
        scheduled_departure: departure_call.scheduled.departure,
        scheduled_arrival: arrival_call.scheduled.arrival,
        observed_departure: departure_call.observed_departure,
        observed_arrival: arrival_call.observed_arrival,
        departure_track: departure_call.current_track().map(str::to_owned),
        arrival_track: arrival_call.current_track().map(str::to_owned),
        actions: actions::available_actions(network, dispatcher_id, section_id),
    })
}

fn board(
    network: &Network,
    dispatcher_id: Id<Dispatcher>,
    limit: Option<usize>,
    pick_departures: bool,
) -> Vec<SectionView> {
    let Some(dispatcher) = network.dispatchers.get(&dispatcher_id) else {
        return Vec::new();
    };
    let station_id = dispatcher.station_id;

    let mut rows: Vec<(Duration, i64, Id<TrainSection>)> = network
        .sections
        .iter()
        .filter(|(_, section)| network.is_section_visible(section))
        .filter_map(|(id, section)| {
            let call_id = if pick_departures {
                section.departure_call_id
            } else {
                section.arrival_call_id
            };
            let call = network.calls.get(&call_id)?;
            if network.control_station_of(call.place_id) != Some(station_id) {
                return None;
            }
            let time = if pick_departures {
                call.scheduled.departure
            } else {
                call.scheduled.arrival
            };
            Some((time, id.raw(), *id))
        })
        .collect();
    rows.sort_by_key(|(time, raw_id, _)| (*time, *raw_id));
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows.into_iter()
        .filter_map(|(_, _, id)| section_view(network, dispatcher_id, id))
        .collect()
}

/// Visible sections departing under this dispatcher's authority,
/// soonest first.
pub fn departures_for(
    network: &Network,
    dispatcher_id: Id<Dispatcher>,
    limit: Option<usize>,
) -> Vec<SectionView> {
    board(network, dispatcher_id, limit, true)
}

/// Visible sections arriving under this dispatcher's authority,
/// soonest first.
pub fn arrivals_for(
    network: &Network,
    dispatcher_id: Id<Dispatcher>,
    limit: Option<usize>,
) -> Vec<SectionView> {
    board(network, dispatcher_id, limit, false)
}
