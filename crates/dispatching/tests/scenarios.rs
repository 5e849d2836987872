//! End-to-end operating scenarios against a real broker with file
//! backed event logs.

use chrono::Duration;
use utility::id::Id;

use dispatching::broker::{Broker, BrokerConfig};
use dispatching::clock::FixedTimeProvider;
use dispatching::source::{
    CallRecord, DispatchStretchRecord, InMemorySource, PlaceRecord, TrainRecord,
    TrackStretchRecord,
};
use dispatching::RequestError;
use model::action::{ActionContext, ActionKind};
use model::place::{PlaceKind, StationTrack};
use model::section::DispatchState;
use model::track_stretch::{Track, TrackDirection};
use model::train::TrainState;

fn station(id: i64, name: &str) -> PlaceRecord {
    PlaceRecord {
        id,
        name: name.to_owned(),
        signature: name.chars().take(2).collect(),
        kind: PlaceKind::Station { is_manned: true },
        tracks: vec![StationTrack {
            number: "1".to_owned(),
            max_length: None,
            is_main: true,
            display_order: 1,
            platform_length: None,
        }],
    }
}

fn bidirectional_track() -> Track {
    Track {
        designation: None,
        direction: TrackDirection::DoubleDirected,
        is_up_track: false,
        max_length: None,
    }
}

fn stretch(id: i64, from: i64, to: i64) -> TrackStretchRecord {
    TrackStretchRecord {
        id,
        from_place_id: from,
        to_place_id: to,
        tracks: vec![bidirectional_track()],
    }
}

fn train(id: i64, number: &str) -> TrainRecord {
    TrainRecord {
        id,
        company: "MRC".to_owned(),
        prefix: "P".to_owned(),
        number: number.to_owned(),
        max_length: None,
    }
}

fn call(id: i64, train_id: i64, place_id: i64, minutes_past_ten: i64) -> CallRecord {
    CallRecord {
        id,
        train_id,
        place_id,
        scheduled_arrival: Duration::hours(10) + Duration::minutes(minutes_past_ten),
        scheduled_departure: Duration::hours(10)
            + Duration::minutes(minutes_past_ten),
        planned_track: Some("1".to_owned()),
        sequence_number: id as i32,
    }
}

/// A(1)–B(2) over one bidirectional stretch, train 1 from A to B.
fn plain_line() -> InMemorySource {
    InMemorySource {
        places: vec![station(1, "Ahrdorf"), station(2, "Bevern")],
        track_stretches: vec![stretch(1, 1, 2)],
        dispatch_stretches: vec![DispatchStretchRecord {
            id: 1,
            from_station_id: 1,
            to_station_id: 2,
        }],
        trains: vec![train(1, "101")],
        calls: vec![call(1, 1, 1, 0), call(2, 1, 2, 30)],
    }
}

/// A(1)–S(3, signal controlled by A)–C(2), train 1 from A to C.
fn signalled_line() -> InMemorySource {
    InMemorySource {
        places: vec![
            station(1, "Ahrdorf"),
            station(2, "Cranz"),
            PlaceRecord {
                id: 3,
                name: "Block Siggen".to_owned(),
                signature: "Bks".to_owned(),
                kind: PlaceKind::SignalControlledPlace {
                    controlled_by_station_id: Id::new(1),
                    is_junction: false,
                },
                tracks: Vec::new(),
            },
        ],
        track_stretches: vec![stretch(1, 1, 3), stretch(2, 3, 2)],
        dispatch_stretches: vec![DispatchStretchRecord {
            id: 1,
            from_station_id: 1,
            to_station_id: 2,
        }],
        trains: vec![train(1, "101")],
        calls: vec![call(1, 1, 1, 0), call(2, 1, 2, 30)],
    }
}

fn config_in(dir: &tempfile::TempDir) -> BrokerConfig {
    BrokerConfig {
        train_events_path: dir.path().join("train-events.csv"),
        dispatch_events_path: dir.path().join("dispatch-events.csv"),
    }
}

async fn start(source: &InMemorySource, config: BrokerConfig, restart: bool) -> Broker {
    Broker::start(
        source,
        Box::new(FixedTimeProvider::new(Duration::hours(9))),
        config,
        restart,
    )
    .await
    .expect("broker init")
}

/// Finds and executes `kind`, asserting it was offered.
async fn act(broker: &Broker, dispatcher: i64, section: i64, kind: ActionKind) {
    let action = offered(broker, dispatcher, section, kind)
        .await
        .unwrap_or_else(|| panic!("{:?} not offered to dispatcher {}", kind, dispatcher));
    broker.execute(action).await.expect("action refused");
}

async fn offered(
    broker: &Broker,
    dispatcher: i64,
    section: i64,
    kind: ActionKind,
) -> Option<ActionContext> {
    broker
        .actions_for(Id::new(dispatcher), Id::new(section))
        .await
        .expect("broker gone")
        .into_iter()
        .find(|action| action.kind == kind)
}

#[tokio::test]
async fn s1_a_single_section_journey_completes_and_logs_seven_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = plain_line();
    let broker = start(&source, config_in(&dir), false).await;

    act(&broker, 1, 1, ActionKind::Manned).await;
    act(&broker, 1, 1, ActionKind::Request).await;
    act(&broker, 2, 1, ActionKind::Accept).await;
    act(&broker, 1, 1, ActionKind::Depart).await;
    act(&broker, 2, 1, ActionKind::Arrive).await;

    let train = broker.train_by_id(Id::new(1)).await.expect("train exists");
    assert_eq!(train.state, TrainState::Completed);

    // arrived sections leave the boards
    let board = broker
        .departures_for(Id::new(1), None)
        .await
        .expect("broker gone");
    assert!(board.is_empty());

    broker.shutdown().await.expect("clean shutdown");

    let train_rows: Vec<event_log::TrainEventRecord> =
        event_log::read_all(dir.path().join("train-events.csv")).unwrap();
    let dispatch_rows: Vec<event_log::DispatchEventRecord> =
        event_log::read_all(dir.path().join("dispatch-events.csv")).unwrap();
    assert_eq!(train_rows.len(), 3);
    assert_eq!(dispatch_rows.len(), 4);
    assert_eq!(dispatch_rows[2].state, Some(DispatchState::Departed));
    assert_eq!(dispatch_rows[2].track_stretch_index, Some(0));
}

#[tokio::test]
async fn s2_a_rejection_allows_a_fresh_request() {
    let dir = tempfile::tempdir().unwrap();
    let source = plain_line();
    let broker = start(&source, config_in(&dir), false).await;

    act(&broker, 1, 1, ActionKind::Manned).await;
    act(&broker, 1, 1, ActionKind::Request).await;
    act(&broker, 2, 1, ActionKind::Reject).await;
    act(&broker, 1, 1, ActionKind::Request).await;
    act(&broker, 2, 1, ActionKind::Accept).await;
    act(&broker, 1, 1, ActionKind::Depart).await;
    act(&broker, 2, 1, ActionKind::Arrive).await;

    let train = broker.train_by_id(Id::new(1)).await.expect("train exists");
    assert_eq!(train.state, TrainState::Completed);
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn s3_a_single_track_meet_is_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = plain_line();
    source.trains.push(train(2, "102"));
    source.calls.push(call(3, 2, 2, 10));
    source.calls.push(call(4, 2, 1, 40));
    source.dispatch_stretches.push(DispatchStretchRecord {
        id: 2,
        from_station_id: 2,
        to_station_id: 1,
    });
    let broker = start(&source, config_in(&dir), false).await;

    for (section, departure, arrival) in [(1i64, 1i64, 2i64), (2, 2, 1)] {
        act(&broker, departure, section, ActionKind::Manned).await;
        act(&broker, departure, section, ActionKind::Request).await;
        act(&broker, arrival, section, ActionKind::Accept).await;
    }
    act(&broker, 1, 1, ActionKind::Depart).await;

    let depart = offered(&broker, 2, 2, ActionKind::Depart)
        .await
        .expect("depart offered");
    let refused = broker.execute(depart).await;
    assert!(matches!(
        refused,
        Err(RequestError::Execution(
            dispatching::ExecutionError::DirectionConflict { .. }
        ))
    ));

    // the loser is untouched; the meet resolves after the arrival
    act(&broker, 2, 1, ActionKind::Arrive).await;
    act(&broker, 2, 2, ActionKind::Depart).await;
    act(&broker, 1, 2, ActionKind::Arrive).await;
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn s4_the_pass_sequence_hands_the_train_over_the_signal() {
    let dir = tempfile::tempdir().unwrap();
    let source = signalled_line();
    let broker = start(&source, config_in(&dir), false).await;

    act(&broker, 1, 1, ActionKind::Manned).await;
    act(&broker, 1, 1, ActionKind::Request).await;
    act(&broker, 2, 1, ActionKind::Accept).await;
    act(&broker, 1, 1, ActionKind::Depart).await;

    // before the pass: no arrive for C, no pass for C, pass for A only
    assert!(offered(&broker, 2, 1, ActionKind::Arrive).await.is_none());
    assert!(offered(&broker, 2, 1, ActionKind::Pass).await.is_none());
    let pass = offered(&broker, 1, 1, ActionKind::Pass)
        .await
        .expect("pass offered to the controller");
    assert_eq!(pass.target_place_id, Some(Id::new(3)));
    broker.execute(pass).await.expect("pass accepted");

    act(&broker, 2, 1, ActionKind::Arrive).await;
    let train = broker.train_by_id(Id::new(1)).await.expect("train exists");
    assert_eq!(train.state, TrainState::Completed);
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn s5_an_unsignalled_junction_cascades_the_occupancy() {
    let dir = tempfile::tempdir().unwrap();
    // A(1), B(2), C(3) around junction J(4)
    let source = InMemorySource {
        places: vec![
            station(1, "Ahrdorf"),
            station(2, "Bevern"),
            station(3, "Cranz"),
            PlaceRecord {
                id: 4,
                name: "Abzweig Jering".to_owned(),
                signature: "Aj".to_owned(),
                kind: PlaceKind::Other { is_junction: true },
                tracks: Vec::new(),
            },
        ],
        track_stretches: vec![stretch(1, 1, 4), stretch(2, 4, 2), stretch(3, 4, 3)],
        dispatch_stretches: vec![
            DispatchStretchRecord {
                id: 1,
                from_station_id: 1,
                to_station_id: 2,
            },
            DispatchStretchRecord {
                id: 2,
                from_station_id: 3,
                to_station_id: 2,
            },
        ],
        trains: vec![train(1, "101"), train(2, "202")],
        calls: vec![
            call(1, 1, 1, 0),
            call(2, 1, 2, 30),
            call(3, 2, 3, 5),
            call(4, 2, 2, 40),
        ],
    };
    let broker = start(&source, config_in(&dir), false).await;

    for (section, departure, arrival) in [(1i64, 1i64, 2i64), (2, 3, 2)] {
        act(&broker, departure, section, ActionKind::Manned).await;
        act(&broker, departure, section, ActionKind::Request).await;
        act(&broker, arrival, section, ActionKind::Accept).await;
    }

    act(&broker, 1, 1, ActionKind::Depart).await;
    // the cascade holds every leg of the wye, so the second train is
    // stuck until the first one arrives
    let depart = offered(&broker, 3, 2, ActionKind::Depart)
        .await
        .expect("depart offered");
    let refused = broker.execute(depart).await;
    assert!(matches!(
        refused,
        Err(RequestError::Execution(
            dispatching::ExecutionError::NoCapacity { .. }
        ))
    ));

    act(&broker, 2, 1, ActionKind::Arrive).await;
    act(&broker, 3, 2, ActionKind::Depart).await;
    act(&broker, 2, 2, ActionKind::Arrive).await;
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn s6_undo_is_one_level_deep() {
    let dir = tempfile::tempdir().unwrap();
    let source = plain_line();
    let broker = start(&source, config_in(&dir), false).await;

    act(&broker, 1, 1, ActionKind::Manned).await;
    act(&broker, 1, 1, ActionKind::UndoTrainState).await;
    let train = broker.train_by_id(Id::new(1)).await.expect("train exists");
    assert_eq!(train.state, TrainState::Planned);
    assert!(offered(&broker, 1, 1, ActionKind::UndoTrainState)
        .await
        .is_none());

    // cancel out of Manned; undo returns to Manned, the state captured
    // immediately before the cancel
    act(&broker, 1, 1, ActionKind::Manned).await;
    act(&broker, 1, 1, ActionKind::Canceled).await;
    act(&broker, 1, 1, ActionKind::UndoTrainState).await;
    let train = broker.train_by_id(Id::new(1)).await.expect("train exists");
    assert_eq!(train.state, TrainState::Manned);
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn s7_a_restarted_broker_resumes_mid_journey() {
    let dir = tempfile::tempdir().unwrap();
    let source = signalled_line();

    let broker = start(&source, config_in(&dir), false).await;
    act(&broker, 1, 1, ActionKind::Manned).await;
    act(&broker, 1, 1, ActionKind::Request).await;
    act(&broker, 2, 1, ActionKind::Accept).await;
    act(&broker, 1, 1, ActionKind::Depart).await;
    act(&broker, 1, 1, ActionKind::Pass).await;
    broker.shutdown().await.expect("clean shutdown");

    // same data source, same logs, fresh broker
    let broker = start(&source, config_in(&dir), true).await;
    let board = broker
        .arrivals_for(Id::new(2), None)
        .await
        .expect("broker gone");
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].state, DispatchState::Departed);
    assert_eq!(board[0].train_state, TrainState::Running);

    // the journey finishes exactly as it would have without the restart
    act(&broker, 2, 1, ActionKind::Arrive).await;
    let train = broker.train_by_id(Id::new(1)).await.expect("train exists");
    assert_eq!(train.state, TrainState::Completed);
    broker.shutdown().await.expect("clean shutdown");

    // the continued session kept appending to the same logs
    let dispatch_rows: Vec<event_log::DispatchEventRecord> =
        event_log::read_all(dir.path().join("dispatch-events.csv")).unwrap();
    assert_eq!(dispatch_rows.last().map(|row| row.state), Some(Some(DispatchState::Arrived)));
}

#[tokio::test]
async fn boards_sort_by_schedule_and_honor_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = plain_line();
    // a second, earlier train on the same route
    source.trains.push(train(2, "102"));
    source.calls.push(CallRecord {
        id: 3,
        train_id: 2,
        place_id: 1,
        scheduled_arrival: Duration::hours(9) + Duration::minutes(45),
        scheduled_departure: Duration::hours(9) + Duration::minutes(45),
        planned_track: Some("1".to_owned()),
        sequence_number: 1,
    });
    source.calls.push(call(4, 2, 2, 15));
    let broker = start(&source, config_in(&dir), false).await;

    let board = broker
        .departures_for(Id::new(1), None)
        .await
        .expect("broker gone");
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].train, "P 102");
    assert_eq!(board[1].train, "P 101");

    let limited = broker
        .departures_for(Id::new(1), Some(1))
        .await
        .expect("broker gone");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].train, "P 102");
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn a_changed_track_survives_the_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = plain_line();
    source.places[1].tracks.push(StationTrack {
        number: "2".to_owned(),
        max_length: None,
        is_main: false,
        display_order: 2,
        platform_length: None,
    });
    let broker = start(&source, config_in(&dir), false).await;

    broker
        .change_call_track(Id::new(2), "2".to_owned())
        .await
        .expect("track change accepted");
    broker.shutdown().await.expect("clean shutdown");

    let broker = start(&source, config_in(&dir), true).await;
    let board = broker
        .arrivals_for(Id::new(2), None)
        .await
        .expect("broker gone");
    assert_eq!(board[0].arrival_track.as_deref(), Some("2"));
    broker.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn dispatchers_are_the_manned_stations() {
    let dir = tempfile::tempdir().unwrap();
    let broker = start(&plain_line(), config_in(&dir), false).await;

    let dispatchers = broker.dispatchers().await.expect("broker gone");
    assert_eq!(dispatchers.len(), 2);
    let first = broker
        .dispatcher_by_id(Id::new(1))
        .await
        .expect("dispatcher exists");
    assert_eq!(first.name, "Ahrdorf");
    assert!(matches!(
        broker.dispatcher_by_id(Id::new(9)).await,
        Err(RequestError::NotFound)
    ));
    broker.shutdown().await.expect("clean shutdown");
}
