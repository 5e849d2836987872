use utility::id::Id;

use model::action::{ActionContext, ActionKind};
use model::dispatcher::Dispatcher;
use model::place::{OperationPlace, PlaceKind};
use model::section::{DispatchState, TrainSection};
use model::train::TrainState;

use crate::layout::Network;

/// Computes the legal actions for one dispatcher on one section. Pure:
/// no side effects, and the executor validates against the same
/// function, so policy lives in exactly one place. Automation clients
/// receive the identical list.
pub fn available_actions(
    network: &Network,
    dispatcher_id: Id<Dispatcher>,
    section_id: Id<TrainSection>,
) -> Vec<ActionContext> {
    let mut actions = Vec::new();
    let Some(section) = network.sections.get(&section_id) else {
        return actions;
    };
    let Some(train) = network.trains.get(&section.train_id) else {
        return actions;
    };
    let Some(dispatcher) = network.dispatchers.get(&dispatcher_id) else {
        return actions;
    };
    let (Some(departure_call), Some(arrival_call)) = (
        network.calls.get(&section.departure_call_id),
        network.calls.get(&section.arrival_call_id),
    ) else {
        return actions;
    };

    let station_id = dispatcher.station_id;
    let is_departure_dispatcher =
        network.control_station_of(departure_call.place_id) == Some(station_id);
    let is_arrival_dispatcher =
        network.control_station_of(arrival_call.place_id) == Some(station_id);

    let mut offer = |kind: ActionKind, target: Option<Id<OperationPlace>>,
                     label: String| {
        actions.push(ActionContext {
            kind,
            section_id,
            dispatcher_id,
            target_place_id: target,
            label,
        });
    };

    if network.is_section_dispatchable(section) {
        match section.state {
            state if state.allows_request() => {
                if is_departure_dispatcher {
                    offer(ActionKind::Request, None, ActionKind::Request.to_string());
                }
            }
            DispatchState::Requested => {
                if is_departure_dispatcher {
                    offer(ActionKind::Revoke, None, ActionKind::Revoke.to_string());
                }
                if is_arrival_dispatcher {
                    offer(ActionKind::Accept, None, ActionKind::Accept.to_string());
                    offer(ActionKind::Reject, None, ActionKind::Reject.to_string());
                }
            }
            DispatchState::Accepted => {
                if is_departure_dispatcher {
                    offer(ActionKind::Depart, None, ActionKind::Depart.to_string());
                    offer(ActionKind::Revoke, None, ActionKind::Revoke.to_string());
                }
            }
            DispatchState::Departed => {
                let segments = network.segments_of(section);
                let index = section.current_track_stretch_index;
                let on_last = index + 1 >= segments.len();
                if !on_last {
                    if let Some(boundary_id) =
                        segments.get(index).map(|segment| segment.to_place_id)
                    {
                        if let Some(PlaceKind::SignalControlledPlace {
                            controlled_by_station_id,
                            ..
                        }) = network.places.get(&boundary_id).map(|place| &place.kind)
                        {
                            if *controlled_by_station_id == station_id {
                                let place_name = network
                                    .places
                                    .get(&boundary_id)
                                    .map(|place| place.name.clone())
                                    .unwrap_or_default();
                                offer(
                                    ActionKind::Pass,
                                    Some(boundary_id),
                                    format!("Pass {}", place_name),
                                );
                            }
                        }
                    }
                }
                if is_arrival_dispatcher
                    && network.next_signal_boundary(section).is_none()
                {
                    offer(ActionKind::Arrive, None, ActionKind::Arrive.to_string());
                }
            }
            _ => {}
        }
    }

    // a departed section of a canceled or aborted train must still be
    // taken off the line
    if section.state == DispatchState::Departed
        && matches!(train.state, TrainState::Canceled | TrainState::Aborted)
        && (is_departure_dispatcher || is_arrival_dispatcher)
    {
        offer(ActionKind::Clear, None, ActionKind::Clear.to_string());
    }

    if section.is_first() {
        if train.state == TrainState::Planned {
            offer(ActionKind::Manned, None, ActionKind::Manned.to_string());
        }
        // a crew that never left may still be stood down
        if matches!(train.state, TrainState::Planned | TrainState::Manned) {
            offer(ActionKind::Canceled, None, ActionKind::Canceled.to_string());
        }
    }
    if !section.is_first() && train.state == TrainState::Running {
        offer(ActionKind::Aborted, None, ActionKind::Aborted.to_string());
    }
    if train.previous_state.is_some()
        && matches!(
            train.state,
            TrainState::Manned | TrainState::Canceled | TrainState::Aborted
        )
    {
        offer(
            ActionKind::UndoTrainState,
            None,
            format!("Undo {}", train.state),
        );
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{
        bidirectional_track, core_of, junction_wye, network_of, signalled_line,
        two_station_line,
    };

    fn kinds_for(
        network: &Network,
        dispatcher: i64,
        section: i64,
    ) -> Vec<ActionKind> {
        available_actions(network, Id::new(dispatcher), Id::new(section))
            .into_iter()
            .map(|action| action.kind)
            .collect()
    }

    fn set_section_state(network: &mut Network, section: i64, state: DispatchState) {
        if let Some(section) = network.sections.get_mut(&Id::new(section)) {
            section.state = state;
        }
    }

    fn set_train_state(network: &mut Network, train: i64, state: TrainState) {
        if let Some(train) = network.trains.get_mut(&Id::new(train)) {
            train.state = state;
        }
    }

    #[tokio::test]
    async fn only_the_departure_dispatcher_may_request() {
        let network = network_of(&two_station_line(vec![bidirectional_track()])).await;
        assert!(kinds_for(&network, 1, 1).contains(&ActionKind::Request));
        assert!(!kinds_for(&network, 2, 1).contains(&ActionKind::Request));
    }

    #[tokio::test]
    async fn a_requested_section_offers_accept_and_reject_to_the_arrival_side() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        set_section_state(&mut network, 1, DispatchState::Requested);

        let departure_side = kinds_for(&network, 1, 1);
        assert!(departure_side.contains(&ActionKind::Revoke));
        assert!(!departure_side.contains(&ActionKind::Accept));

        let arrival_side = kinds_for(&network, 2, 1);
        assert!(arrival_side.contains(&ActionKind::Accept));
        assert!(arrival_side.contains(&ActionKind::Reject));
        assert!(!arrival_side.contains(&ActionKind::Revoke));
    }

    #[tokio::test]
    async fn rejected_and_revoked_sections_may_be_requested_again() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        for state in [DispatchState::Rejected, DispatchState::Revoked] {
            set_section_state(&mut network, 1, state);
            assert!(kinds_for(&network, 1, 1).contains(&ActionKind::Request));
        }
    }

    #[tokio::test]
    async fn an_accepted_section_offers_depart_and_revoke() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        set_section_state(&mut network, 1, DispatchState::Accepted);
        let kinds = kinds_for(&network, 1, 1);
        assert!(kinds.contains(&ActionKind::Depart));
        assert!(kinds.contains(&ActionKind::Revoke));
        assert!(!kinds_for(&network, 2, 1).contains(&ActionKind::Depart));
    }

    #[tokio::test]
    async fn the_pass_belongs_to_the_signal_controller_and_arrive_waits() {
        let mut network = network_of(&signalled_line()).await;
        set_section_state(&mut network, 1, DispatchState::Departed);

        // the signal is controlled by station 1; its dispatcher passes
        let departure_side = available_actions(&network, Id::new(1), Id::new(1));
        let pass = departure_side
            .iter()
            .find(|action| action.kind == ActionKind::Pass)
            .expect("pass offered to the controller");
        assert_eq!(pass.target_place_id, Some(Id::new(3)));

        // the arrival dispatcher cannot arrive while the signal is ahead
        let arrival_side = kinds_for(&network, 2, 1);
        assert!(!arrival_side.contains(&ActionKind::Arrive));
        assert!(!arrival_side.contains(&ActionKind::Pass));
    }

    #[tokio::test]
    async fn past_the_signal_only_arrive_remains() {
        let mut network = network_of(&signalled_line()).await;
        set_section_state(&mut network, 1, DispatchState::Departed);
        if let Some(section) = network.sections.get_mut(&Id::new(1)) {
            section.current_track_stretch_index = 1;
        }
        assert!(!kinds_for(&network, 1, 1).contains(&ActionKind::Pass));
        assert!(kinds_for(&network, 2, 1).contains(&ActionKind::Arrive));
    }

    #[tokio::test]
    async fn an_unsignalled_junction_never_blocks_the_arrival() {
        let mut network = network_of(&junction_wye()).await;
        set_section_state(&mut network, 1, DispatchState::Departed);
        // still on the first of two segments, but nothing ahead is
        // signal-controlled
        assert!(kinds_for(&network, 2, 1).contains(&ActionKind::Arrive));
    }

    #[tokio::test]
    async fn train_actions_sit_on_the_first_section_only() {
        let core = core_of(&junction_wye()).await;
        let network = core.core.network;
        let first = kinds_for(&network, 1, 1);
        assert!(first.contains(&ActionKind::Manned));
        assert!(first.contains(&ActionKind::Canceled));
        assert!(!first.contains(&ActionKind::Aborted));
    }

    #[tokio::test]
    async fn a_manned_train_can_still_be_canceled_but_not_manned_again() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        set_train_state(&mut network, 1, TrainState::Manned);
        let kinds = kinds_for(&network, 1, 1);
        assert!(kinds.contains(&ActionKind::Canceled));
        assert!(!kinds.contains(&ActionKind::Manned));
    }

    #[tokio::test]
    async fn a_running_train_may_be_aborted_from_later_sections() {
        let mut source = junction_wye();
        // give train 1 a second leg so a non-first section exists
        source.calls.push(crate::testing::call(5, 1, 3, 60));
        source.dispatch_stretches.push(
            crate::source::DispatchStretchRecord {
                id: 3,
                from_station_id: 2,
                to_station_id: 3,
            },
        );
        let mut network = network_of(&source).await;
        set_train_state(&mut network, 1, TrainState::Running);
        set_section_state(&mut network, 1, DispatchState::Departed);

        let second_section = network
            .sections
            .iter()
            .find(|(_, section)| {
                section.train_id == Id::new(1) && !section.is_first()
            })
            .map(|(id, _)| id.raw())
            .expect("train 1 has a second section");
        let kinds = kinds_for(&network, 2, second_section);
        assert!(kinds.contains(&ActionKind::Aborted));
        assert!(!kinds.contains(&ActionKind::Manned));
    }

    #[tokio::test]
    async fn a_later_section_stays_quiet_until_the_previous_departed() {
        let mut source = two_station_line(vec![bidirectional_track()]);
        source.places.push(crate::testing::station(3, "Cranz"));
        source
            .track_stretches
            .push(crate::testing::stretch(2, 2, 3, vec![bidirectional_track()]));
        source.dispatch_stretches.push(
            crate::source::DispatchStretchRecord {
                id: 2,
                from_station_id: 2,
                to_station_id: 3,
            },
        );
        source.calls.push(crate::testing::call(3, 1, 3, 60));
        let mut network = network_of(&source).await;

        assert!(kinds_for(&network, 2, 2).is_empty());
        set_section_state(&mut network, 1, DispatchState::Departed);
        assert!(kinds_for(&network, 2, 2).contains(&ActionKind::Request));
    }

    #[tokio::test]
    async fn undo_appears_with_a_buffered_state_and_a_label() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        if let Some(train) = network.trains.get_mut(&Id::new(1)) {
            train.state = TrainState::Manned;
            train.previous_state = Some(TrainState::Planned);
        }
        let undo = available_actions(&network, Id::new(1), Id::new(1))
            .into_iter()
            .find(|action| action.kind == ActionKind::UndoTrainState)
            .expect("undo offered");
        assert_eq!(undo.label, "Undo Manned");
    }

    #[tokio::test]
    async fn undo_needs_a_buffered_state() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        set_train_state(&mut network, 1, TrainState::Manned);
        assert!(!kinds_for(&network, 1, 1).contains(&ActionKind::UndoTrainState));
    }

    #[tokio::test]
    async fn a_departed_section_of_a_dead_train_offers_clear() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        set_section_state(&mut network, 1, DispatchState::Departed);
        set_train_state(&mut network, 1, TrainState::Canceled);

        let kinds = kinds_for(&network, 1, 1);
        assert!(kinds.contains(&ActionKind::Clear));
        // the dead train takes its dispatch actions with it
        assert!(!kinds.contains(&ActionKind::Arrive));
    }

    #[tokio::test]
    async fn a_completed_train_offers_nothing() {
        let mut network =
            network_of(&two_station_line(vec![bidirectional_track()])).await;
        set_section_state(&mut network, 1, DispatchState::Arrived);
        set_train_state(&mut network, 1, TrainState::Completed);
        assert!(kinds_for(&network, 1, 1).is_empty());
        assert!(kinds_for(&network, 2, 1).is_empty());
    }
}
