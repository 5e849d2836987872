use std::{error, fmt};

use chrono::Duration;
use utility::id::Id;

use event_log::{
    DispatchEventRecord, EventLogError, EventSink, MonotonicTimestamps,
    TrainEventRecord,
};
use model::action::{ActionContext, ActionKind};
use model::call::TrainStationCall;
use model::dispatcher::Dispatcher;
use model::section::{DispatchState, TrainSection};
use model::train::TrainState;

use crate::actions;
use crate::capacity::{self, CapacityError};
use crate::clock::TimeProvider;
use crate::layout::Network;

/// Why an action was refused. Refusals never mutate anything and never
/// write an event.
#[derive(Debug)]
pub enum ExecutionError {
    /// The action is not in the dispatcher's current legal set.
    ActionNotAvailable,
    NoCapacity { track_stretch_id: i64 },
    DirectionConflict { track_stretch_id: i64 },
    /// A pass was requested for a place that is not the next segment's
    /// origin.
    InvalidPassTarget,
    /// The event append failed; the staged mutation was dropped.
    Persistence(EventLogError),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActionNotAvailable => write!(f, "action not available"),
            Self::NoCapacity { track_stretch_id } => {
                write!(f, "no free track on stretch {}", track_stretch_id)
            }
            Self::DirectionConflict { track_stretch_id } => {
                write!(f, "opposing traffic on single-track stretch {}", track_stretch_id)
            }
            Self::InvalidPassTarget => write!(f, "not the next signal place"),
            Self::Persistence(why) => write!(f, "event append failed: {}", why),
        }
    }
}

impl error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Persistence(why) => Some(why),
            _ => None,
        }
    }
}

impl From<CapacityError> for ExecutionError {
    fn from(why: CapacityError) -> Self {
        match why {
            CapacityError::NoCapacity { track_stretch_id } => {
                Self::NoCapacity { track_stretch_id }
            }
            CapacityError::DirectionConflict { track_stretch_id } => {
                Self::DirectionConflict { track_stretch_id }
            }
        }
    }
}

impl From<EventLogError> for ExecutionError {
    fn from(why: EventLogError) -> Self {
        Self::Persistence(why)
    }
}

/// The serialized heart of the session: the network plus the event
/// sinks and clocks. Everything here runs inside the broker's critical
/// section; an action is staged, made durable, and only then applied,
/// so the observable state change happens atomically with the event
/// append.
pub struct DispatchCore {
    pub network: Network,
    train_events: Box<dyn EventSink<TrainEventRecord>>,
    dispatch_events: Box<dyn EventSink<DispatchEventRecord>>,
    timestamps: MonotonicTimestamps,
    time_provider: Box<dyn TimeProvider>,
}

impl DispatchCore {
    pub fn new(
        network: Network,
        train_events: Box<dyn EventSink<TrainEventRecord>>,
        dispatch_events: Box<dyn EventSink<DispatchEventRecord>>,
        time_provider: Box<dyn TimeProvider>,
    ) -> Self {
        Self {
            network,
            train_events,
            dispatch_events,
            timestamps: MonotonicTimestamps::new(),
            time_provider,
        }
    }

    pub fn available_actions(
        &self,
        dispatcher_id: Id<Dispatcher>,
        section_id: Id<TrainSection>,
    ) -> Vec<ActionContext> {
        actions::available_actions(&self.network, dispatcher_id, section_id)
    }

    /// Validates and applies one action. The legal set is recomputed
    /// here; whatever a surface displayed earlier carries no authority.
    pub fn execute(&mut self, request: &ActionContext) -> Result<(), ExecutionError> {
        let legal = actions::available_actions(
            &self.network,
            request.dispatcher_id,
            request.section_id,
        );
        let Some(chosen) = legal.iter().find(|action| action.matches(request)) else {
            // a pass to the wrong place is a distinct refusal
            if request.kind == ActionKind::Pass
                && legal.iter().any(|action| action.kind == ActionKind::Pass)
            {
                return Err(ExecutionError::InvalidPassTarget);
            }
            return Err(ExecutionError::ActionNotAvailable);
        };
        let chosen = chosen.clone();
        log::debug!(
            "dispatcher {} executes {:?} on section {}",
            request.dispatcher_id,
            chosen.kind,
            request.section_id
        );

        match chosen.kind {
            ActionKind::Request => {
                self.set_dispatch_state(request.section_id, DispatchState::Requested)
            }
            ActionKind::Accept => {
                self.set_dispatch_state(request.section_id, DispatchState::Accepted)
            }
            ActionKind::Reject => {
                self.set_dispatch_state(request.section_id, DispatchState::Rejected)
            }
            ActionKind::Revoke => {
                self.set_dispatch_state(request.section_id, DispatchState::Revoked)
            }
            ActionKind::Depart => self.depart(request.section_id),
            ActionKind::Pass => self.pass(request.section_id),
            ActionKind::Arrive => self.arrive(request.section_id),
            ActionKind::Clear => self.clear(request.section_id),
            ActionKind::Manned => {
                self.set_train_state(request.section_id, TrainState::Manned)
            }
            ActionKind::Canceled => {
                self.set_train_state(request.section_id, TrainState::Canceled)
            }
            ActionKind::Aborted => {
                self.set_train_state(request.section_id, TrainState::Aborted)
            }
            ActionKind::UndoTrainState => self.undo_train_state(request.section_id),
        }
    }

    /// Sets a call's live track override and records the change. Not
    /// part of the action state machine; any dispatcher may adjust a
    /// track while the session runs.
    pub fn change_call_track(
        &mut self,
        call_id: Id<TrainStationCall>,
        track_number: &str,
    ) -> Result<(), ExecutionError> {
        let Some(call) = self.network.calls.get(&call_id) else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let place = self.network.places.get(&call.place_id);
        if place.and_then(|place| place.track(track_number)).is_none() {
            return Err(ExecutionError::ActionNotAvailable);
        }

        let timestamp = self.timestamps.next();
        self.train_events.append(&TrainEventRecord::track_change(
            timestamp,
            call_id,
            track_number.to_owned(),
        ))?;
        if let Some(call) = self.network.calls.get_mut(&call_id) {
            call.live_track = Some(track_number.to_owned());
        }
        Ok(())
    }

    fn set_dispatch_state(
        &mut self,
        section_id: Id<TrainSection>,
        new_state: DispatchState,
    ) -> Result<(), ExecutionError> {
        let timestamp = self.timestamps.next();
        self.dispatch_events.append(&DispatchEventRecord::state_change(
            timestamp, section_id, new_state, None,
        ))?;
        if let Some(section) = self.network.sections.get_mut(&section_id) {
            section.state = new_state;
        }
        Ok(())
    }

    fn set_train_state(
        &mut self,
        section_id: Id<TrainSection>,
        new_state: TrainState,
    ) -> Result<(), ExecutionError> {
        let Some(train_id) = self
            .network
            .sections
            .get(&section_id)
            .map(|section| section.train_id)
        else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let timestamp = self.timestamps.next();
        self.train_events.append(&TrainEventRecord::state_change(
            timestamp, train_id, new_state,
        ))?;
        if let Some(train) = self.network.trains.get_mut(&train_id) {
            train.previous_state = Some(train.state);
            train.state = new_state;
        }
        Ok(())
    }

    fn undo_train_state(
        &mut self,
        section_id: Id<TrainSection>,
    ) -> Result<(), ExecutionError> {
        let Some(train_id) = self
            .network
            .sections
            .get(&section_id)
            .map(|section| section.train_id)
        else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let Some(restored) = self
            .network
            .trains
            .get(&train_id)
            .and_then(|train| train.previous_state)
        else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let timestamp = self.timestamps.next();
        self.train_events.append(&TrainEventRecord::state_change(
            timestamp, train_id, restored,
        ))?;
        if let Some(train) = self.network.trains.get_mut(&train_id) {
            train.state = restored;
            train.previous_state = None;
        }
        Ok(())
    }

    fn depart(&mut self, section_id: Id<TrainSection>) -> Result<(), ExecutionError> {
        let Some(section) = self.network.sections.get(&section_id) else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let train_id = section.train_id;
        let departure_call_id = section.departure_call_id;
        let Some(first_segment) = self
            .network
            .dispatch_stretches
            .get(&section.dispatch_stretch_id)
            .and_then(|stretch| stretch.segment_in(section.direction, 0))
        else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let train_max_length = self
            .network
            .trains
            .get(&train_id)
            .and_then(|train| train.max_length);

        // capacity is checked before anything becomes durable
        let plan = capacity::plan_occupancy(
            &self.network,
            section_id,
            first_segment,
            train_max_length,
        )?;
        let observed = self.observed_departure_time(departure_call_id);

        let timestamp = self.timestamps.next();
        self.train_events.append(&TrainEventRecord::observed_departure(
            timestamp,
            departure_call_id,
            observed,
        ))?;
        self.dispatch_events.append(&DispatchEventRecord::state_change(
            timestamp,
            section_id,
            DispatchState::Departed,
            Some(0),
        ))?;

        capacity::apply_plan(&mut self.network, &plan, observed);
        if let Some(section) = self.network.sections.get_mut(&section_id) {
            section.state = DispatchState::Departed;
            section.current_track_stretch_index = 0;
        }
        if let Some(call) = self.network.calls.get_mut(&departure_call_id) {
            call.observed_departure = Some(observed);
        }
        if let Some(train) = self.network.trains.get_mut(&train_id) {
            // departing a manned train puts it on the line; there is no
            // explicit Running action and no event for this
            if train.state == TrainState::Manned {
                train.state = TrainState::Running;
            }
        }
        Ok(())
    }

    fn pass(&mut self, section_id: Id<TrainSection>) -> Result<(), ExecutionError> {
        let Some(section) = self.network.sections.get(&section_id) else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let train_id = section.train_id;
        let index = section.current_track_stretch_index;
        let next_index = index + 1;
        let segments = self.network.segments_of(section);
        let Some(current_segment) = segments.get(index).copied() else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let Some(next_segment) = segments.get(next_index).copied() else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let train_max_length = self
            .network
            .trains
            .get(&train_id)
            .and_then(|train| train.max_length);
        let departure_call_id = section.departure_call_id;

        let plan = capacity::plan_occupancy(
            &self.network,
            section_id,
            next_segment,
            train_max_length,
        )?;

        let timestamp = self.timestamps.next();
        self.dispatch_events.append(&DispatchEventRecord::pass(
            timestamp,
            section_id,
            next_index,
            current_segment.to_place_id,
        ))?;

        let entered_at = self.observed_departure_time(departure_call_id);
        capacity::apply_plan(&mut self.network, &plan, entered_at);
        capacity::release_group(
            &mut self.network,
            section_id,
            current_segment.track_stretch_id,
        );
        if let Some(section) = self.network.sections.get_mut(&section_id) {
            section.current_track_stretch_index = next_index;
        }
        Ok(())
    }

    fn arrive(&mut self, section_id: Id<TrainSection>) -> Result<(), ExecutionError> {
        let Some(section) = self.network.sections.get(&section_id) else {
            return Err(ExecutionError::ActionNotAvailable);
        };
        let train_id = section.train_id;
        let arrival_call_id = section.arrival_call_id;
        let is_journey_end = self.network.is_last_section(section_id);
        let observed = self
            .network
            .calls
            .get(&arrival_call_id)
            .map(|call| self.time_provider.time(Some(call.scheduled.arrival)));

        let timestamp = self.timestamps.next();
        if is_journey_end {
            // the terminal arrival is the train's completion; its
            // timestamp lives on the state row
            self.train_events.append(&TrainEventRecord::state_change(
                timestamp,
                train_id,
                TrainState::Completed,
            ))?;
        } else if let Some(observed) = observed {
            self.train_events.append(&TrainEventRecord::observed_arrival(
                timestamp,
                arrival_call_id,
                observed,
            ))?;
        }
        self.dispatch_events.append(&DispatchEventRecord::state_change(
            timestamp,
            section_id,
            DispatchState::Arrived,
            None,
        ))?;

        capacity::release_all(&mut self.network, section_id);
        if let Some(section) = self.network.sections.get_mut(&section_id) {
            section.state = DispatchState::Arrived;
        }
        if is_journey_end {
            if let Some(train) = self.network.trains.get_mut(&train_id) {
                train.state = TrainState::Completed;
            }
        } else if let Some(observed) = observed {
            if let Some(call) = self.network.calls.get_mut(&arrival_call_id) {
                call.observed_arrival = Some(observed);
            }
        }
        Ok(())
    }

    fn clear(&mut self, section_id: Id<TrainSection>) -> Result<(), ExecutionError> {
        let timestamp = self.timestamps.next();
        self.dispatch_events.append(&DispatchEventRecord::state_change(
            timestamp,
            section_id,
            DispatchState::Canceled,
            None,
        ))?;
        capacity::release_all(&mut self.network, section_id);
        if let Some(section) = self.network.sections.get_mut(&section_id) {
            section.state = DispatchState::Canceled;
        }
        Ok(())
    }

    /// The session time of a departure, anchored to the call's
    /// schedule. Occupancies reuse this as their entry time so a replay
    /// derives identical state.
    fn observed_departure_time(
        &self,
        departure_call_id: Id<TrainStationCall>,
    ) -> Duration {
        let scheduled = self
            .network
            .calls
            .get(&departure_call_id)
            .map(|call| call.scheduled.departure);
        self.time_provider.time(scheduled)
    }
}
