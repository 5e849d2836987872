use std::sync::{Arc, Mutex};

use chrono::Duration;
use utility::id::Id;

use event_log::{DispatchEventRecord, MemoryEventLog, TrainEventRecord};
use model::action::{ActionContext, ActionKind};
use model::place::{PlaceKind, StationTrack};
use model::track_stretch::{Track, TrackDirection};

use crate::clock::FixedTimeProvider;
use crate::executor::{DispatchCore, ExecutionError};
use crate::layout::{build_network, Network};
use crate::source::{
    CallRecord, DispatchStretchRecord, InMemorySource, PlaceRecord, TrainRecord,
    TrackStretchRecord,
};

pub(crate) fn station(id: i64, name: &str) -> PlaceRecord {
    PlaceRecord {
        id,
        name: name.to_owned(),
        signature: name.chars().take(2).collect(),
        kind: PlaceKind::Station { is_manned: true },
        tracks: vec![
            StationTrack {
                number: "1".to_owned(),
                max_length: None,
                is_main: true,
                display_order: 1,
                platform_length: None,
            },
            StationTrack {
                number: "2".to_owned(),
                max_length: None,
                is_main: false,
                display_order: 2,
                platform_length: None,
            },
        ],
    }
}

pub(crate) fn signal_place(id: i64, name: &str, station_id: i64) -> PlaceRecord {
    PlaceRecord {
        id,
        name: name.to_owned(),
        signature: name.chars().take(3).collect(),
        kind: PlaceKind::SignalControlledPlace {
            controlled_by_station_id: Id::new(station_id),
            is_junction: false,
        },
        tracks: Vec::new(),
    }
}

pub(crate) fn junction_place(id: i64, name: &str) -> PlaceRecord {
    PlaceRecord {
        id,
        name: name.to_owned(),
        signature: name.chars().take(2).collect(),
        kind: PlaceKind::Other { is_junction: true },
        tracks: Vec::new(),
    }
}

pub(crate) fn bidirectional_track() -> Track {
    Track {
        designation: None,
        direction: TrackDirection::DoubleDirected,
        is_up_track: false,
        max_length: None,
    }
}

pub(crate) fn stretch(id: i64, from: i64, to: i64, tracks: Vec<Track>) -> TrackStretchRecord {
    TrackStretchRecord {
        id,
        from_place_id: from,
        to_place_id: to,
        tracks,
    }
}

pub(crate) fn train(id: i64, number: &str) -> TrainRecord {
    TrainRecord {
        id,
        company: "MRC".to_owned(),
        prefix: "P".to_owned(),
        number: number.to_owned(),
        max_length: None,
    }
}

pub(crate) fn call(
    id: i64,
    train_id: i64,
    place_id: i64,
    minutes_past_ten: i64,
) -> CallRecord {
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

/// Two manned stations joined by one stretch, one train from A to B.
/// Place ids: A=1, B=2; stretch 1; dispatch stretch 1; train 1 with
/// calls 1 (A) and 2 (B); the single section gets id 1.
pub(crate) fn two_station_line(tracks: Vec<Track>) -> InMemorySource {
    InMemorySource {
        places: vec![station(1, "Ahrdorf"), station(2, "Bevern")],
        track_stretches: vec![stretch(1, 1, 2, tracks)],
        dispatch_stretches: vec![DispatchStretchRecord {
            id: 1,
            from_station_id: 1,
            to_station_id: 2,
        }],
        trains: vec![train(1, "101")],
        calls: vec![call(1, 1, 1, 0), call(2, 1, 2, 30)],
    }
}

/// Stations A=1 and C=2 with a block signal S=3 (controlled by A)
/// between them. Stretches: 1 = A–S, 2 = S–C. One train A to C.
pub(crate) fn signalled_line() -> InMemorySource {
    InMemorySource {
        places: vec![
            station(1, "Ahrdorf"),
            station(2, "Cranz"),
            signal_place(3, "Block Siggen", 1),
        ],
        track_stretches: vec![
            stretch(1, 1, 3, vec![bidirectional_track()]),
            stretch(2, 3, 2, vec![bidirectional_track()]),
        ],
        dispatch_stretches: vec![DispatchStretchRecord {
            id: 1,
            from_station_id: 1,
            to_station_id: 2,
        }],
        trains: vec![train(1, "101")],
        calls: vec![call(1, 1, 1, 0), call(2, 1, 2, 30)],
    }
}

/// Stations A=1, B=2, C=3 around an unsignalled junction J=4.
/// Stretches: 1 = A–J, 2 = J–B, 3 = J–C. Dispatch stretches:
/// 1 = A→B, 2 = C→B. Train 1 runs A→B, train 2 runs C→B.
pub(crate) fn junction_wye() -> InMemorySource {
    InMemorySource {
        places: vec![
            station(1, "Ahrdorf"),
            station(2, "Bevern"),
            station(3, "Cranz"),
            junction_place(4, "Abzweig Jering"),
        ],
        track_stretches: vec![
            stretch(1, 1, 4, vec![bidirectional_track()]),
            stretch(2, 4, 2, vec![bidirectional_track()]),
            stretch(3, 4, 3, vec![bidirectional_track()]),
        ],
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
    }
}

pub(crate) async fn network_of(source: &InMemorySource) -> Network {
    build_network(source).await.expect("fixture layout must build")
}

/// A dispatch core over in-memory sinks, with handles onto the record
/// streams for assertions.
pub(crate) struct TestCore {
    pub core: DispatchCore,
    pub train_records: Arc<Mutex<Vec<TrainEventRecord>>>,
    pub dispatch_records: Arc<Mutex<Vec<DispatchEventRecord>>>,
}

pub(crate) async fn core_of(source: &InMemorySource) -> TestCore {
    let network = network_of(source).await;
    let train_sink: MemoryEventLog<TrainEventRecord> = MemoryEventLog::new();
    let dispatch_sink: MemoryEventLog<DispatchEventRecord> = MemoryEventLog::new();
    let train_records = train_sink.records();
    let dispatch_records = dispatch_sink.records();
    let core = DispatchCore::new(
        network,
        Box::new(train_sink),
        Box::new(dispatch_sink),
        Box::new(FixedTimeProvider::new(Duration::hours(9))),
    );
    TestCore {
        core,
        train_records,
        dispatch_records,
    }
}

/// Executes `kind` as `dispatcher` on `section`, resolving the pass
/// target from the current legal set when one is offered.
pub(crate) fn act(
    core: &mut DispatchCore,
    dispatcher: i64,
    section: i64,
    kind: ActionKind,
) -> Result<(), ExecutionError> {
    let dispatcher_id = Id::new(dispatcher);
    let section_id = Id::new(section);
    let request = core
        .available_actions(dispatcher_id, section_id)
        .into_iter()
        .find(|action| action.kind == kind)
        .unwrap_or(ActionContext {
            kind,
            section_id,
            dispatcher_id,
            target_place_id: None,
            label: kind.to_string(),
        });
    core.execute(&request)
}

pub(crate) fn offered_kinds(
    core: &DispatchCore,
    dispatcher: i64,
    section: i64,
) -> Vec<ActionKind> {
    core.available_actions(Id::new(dispatcher), Id::new(section))
        .into_iter()
        .map(|action| action.kind)
        .collect()
}
