use async_trait::async_trait;
use chrono::Duration;

use model::place::{PlaceKind, StationTrack};
use model::track_stretch::Track;

/// Anything the loading side can fail with. The broker does not retry;
/// init surfaces the error verbatim.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Operation place as delivered by the data source. An `id` of zero or
/// negative means "assign the next monotonic one"; production data
/// carries explicit identifiers so they stay stable across restarts.
#[derive(Debug, Clone)]
pub struct PlaceRecord {
    pub id: i64,
    pub name: String,
    pub signature: String,
    pub kind: PlaceKind,
    pub tracks: Vec<StationTrack>,
}

#[derive(Debug, Clone)]
pub struct TrackStretchRecord {
    pub id: i64,
    pub from_place_id: i64,
    pub to_place_id: i64,
    pub tracks: Vec<Track>,
}

/// Only the endpoints; the segment sequence is derived by shortest
/// path at build time.
#[derive(Debug, Clone)]
pub struct DispatchStretchRecord {
    pub id: i64,
    pub from_station_id: i64,
    pub to_station_id: i64,
}

#[derive(Debug, Clone)]
pub struct TrainRecord {
    pub id: i64,
    pub company: String,
    pub prefix: String,
    pub number: String,
    pub max_length: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub id: i64,
    pub train_id: i64,
    pub place_id: i64,
    pub scheduled_arrival: Duration,
    pub scheduled_departure: Duration,
    pub planned_track: Option<String>,
    /// Tie breaker when two calls share a scheduled departure.
    pub sequence_number: i32,
}

/// The layout and timetable loader. Called exactly once per method at
/// broker init, in declaration order; later payloads may reference
/// identifiers of earlier ones but never the other way around.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_operation_places(&self) -> Result<Vec<PlaceRecord>, SourceError>;
    async fn get_track_stretches(&self)
        -> Result<Vec<TrackStretchRecord>, SourceError>;
    async fn get_dispatch_stretches(
        &self,
    ) -> Result<Vec<DispatchStretchRecord>, SourceError>;
    async fn get_trains(&self) -> Result<Vec<TrainRecord>, SourceError>;
    async fn get_train_station_calls(&self) -> Result<Vec<CallRecord>, SourceError>;
}

/// Data source over plain record vectors, for tests, the playground
/// and embedders that load by other means.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    pub places: Vec<PlaceRecord>,
    pub track_stretches: Vec<TrackStretchRecord>,
    pub dispatch_stretches: Vec<DispatchStretchRecord>,
    pub trains: Vec<TrainRecord>,
    pub calls: Vec<CallRecord>,
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn get_operation_places(&self) -> Result<Vec<PlaceRecord>, SourceError> {
        Ok(self.places.clone())
    }

    async fn get_track_stretches(
        &self,
    ) -> Result<Vec<TrackStretchRecord>, SourceError> {
        Ok(self.track_stretches.clone())
    }

    async fn get_dispatch_stretches(
        &self,
    ) -> Result<Vec<DispatchStretchRecord>, SourceError> {
        Ok(self.dispatch_stretches.clone())
    }

    async fn get_trains(&self) -> Result<Vec<TrainRecord>, SourceError> {
        Ok(self.trains.clone())
    }

    async fn get_train_station_calls(&self) -> Result<Vec<CallRecord>, SourceError> {
        Ok(self.calls.clone())
    }
}
