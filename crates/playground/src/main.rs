use std::fs;

use chrono::Duration;

use dispatching::broker::{Broker, BrokerConfig};
use dispatching::clock::SystemTimeProvider;
use dispatching::source::{
    CallRecord, DispatchStretchRecord, InMemorySource, PlaceRecord, TrainRecord,
    TrackStretchRecord,
};
use model::action::ActionKind;
use model::place::{PlaceKind, StationTrack};
use model::track_stretch::{Track, TrackDirection};
use utility::id::Id;

/// A miniature operating session: two manned stations with a block
/// signal between them, one scheduled train, driven through its whole
/// journey by both dispatchers.
fn demo_source() -> InMemorySource {
    let station_track = |number: &str| StationTrack {
        number: number.to_owned(),
        max_length: None,
        is_main: number == "1",
        display_order: number.parse().unwrap_or(0),
        platform_length: None,
    };
    let plain_track = Track {
        designation: None,
        direction: TrackDirection::DoubleDirected,
        is_up_track: false,
        max_length: None,
    };

    InMemorySource {
        places: vec![
            PlaceRecord {
                id: 1,
                name: "Raisdorf".to_owned(),
                signature: "Rd".to_owned(),
                kind: PlaceKind::Station { is_manned: true },
                tracks: vec![station_track("1"), station_track("2")],
            },
            PlaceRecord {
                id: 2,
                name: "Preetz".to_owned(),
                signature: "Pr".to_owned(),
                kind: PlaceKind::Station { is_manned: true },
                tracks: vec![station_track("1")],
            },
            PlaceRecord {
                id: 3,
                name: "Block Rastorf".to_owned(),
                signature: "Bkr".to_owned(),
                kind: PlaceKind::SignalControlledPlace {
                    controlled_by_station_id: Id::new(1),
                    is_junction: false,
                },
                tracks: Vec::new(),
            },
        ],
        track_stretches: vec![
            TrackStretchRecord {
                id: 1,
                from_place_id: 1,
                to_place_id: 3,
                tracks: vec![plain_track.clone()],
            },
            TrackStretchRecord {
                id: 2,
                from_place_id: 3,
                to_place_id: 2,
                tracks: vec![plain_track],
            },
        ],
        dispatch_stretches: vec![DispatchStretchRecord {
            id: 1,
            from_station_id: 1,
            to_station_id: 2,
        }],
        trains: vec![TrainRecord {
            id: 1,
            company: "Erixx".to_owned(),
            prefix: "RE".to_owned(),
            number: "83".to_owned(),
            max_length: None,
        }],
        calls: vec![
            CallRecord {
                id: 1,
                train_id: 1,
                place_id: 1,
                scheduled_arrival: Duration::hours(10),
                scheduled_departure: Duration::hours(10) + Duration::minutes(5),
                planned_track: Some("1".to_owned()),
                sequence_number: 1,
            },
            CallRecord {
                id: 2,
                train_id: 1,
                place_id: 2,
                scheduled_arrival: Duration::hours(10) + Duration::minutes(25),
                scheduled_departure: Duration::hours(10) + Duration::minutes(25),
                planned_track: Some("1".to_owned()),
                sequence_number: 2,
            },
        ],
    }
}

async fn run_action(
    broker: &Broker,
    dispatcher_raw: i64,
    section_raw: i64,
    kind: ActionKind,
) {
    let actions = broker
        .actions_for(Id::new(dispatcher_raw), Id::new(section_raw))
        .await
        .expect("broker gone");
    let Some(action) = actions.into_iter().find(|action| action.kind == kind) else {
        println!("({:?} is not available right now)", kind);
        return;
    };
    println!("» {} (dispatcher {})", action.label, dispatcher_raw);
    broker.execute(action).await.expect("action refused");
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let log_dir = std::env::temp_dir()
        .join(format!("dispatching-playground-{}", std::process::id()));
    fs::create_dir_all(&log_dir).expect("cannot create log directory");
    let config = BrokerConfig {
        train_events_path: log_dir.join("train-events.csv"),
        dispatch_events_path: log_dir.join("dispatch-events.csv"),
    };
    println!("event logs in {}", log_dir.display());

    let source = demo_source();
    let broker = Broker::start(&source, Box::new(SystemTimeProvider), config, false)
        .await
        .expect("broker init failed");

    let dispatchers = broker.dispatchers().await.expect("broker gone");
    println!(
        "dispatchers: {}",
        serde_json::to_string_pretty(&dispatchers).expect("serializable")
    );

    // the Raisdorf board before anything happened
    let board = broker
        .departures_for(Id::new(1), None)
        .await
        .expect("broker gone");
    println!(
        "departures at Raisdorf: {}",
        serde_json::to_string_pretty(&board).expect("serializable")
    );

    // the whole journey: staffing, request, acceptance, departure, the
    // block signal, arrival
    run_action(&broker, 1, 1, ActionKind::Manned).await;
    run_action(&broker, 1, 1, ActionKind::Request).await;
    run_action(&broker, 2, 1, ActionKind::Accept).await;
    run_action(&broker, 1, 1, ActionKind::Depart).await;
    run_action(&broker, 1, 1, ActionKind::Pass).await;
    run_action(&broker, 2, 1, ActionKind::Arrive).await;

    let train = broker.train_by_id(Id::new(1)).await.expect("broker gone");
    println!(
        "train after the session: {}",
        serde_json::to_string_pretty(&train).expect("serializable")
    );

    broker.shutdown().await.expect("broker gone");
}
