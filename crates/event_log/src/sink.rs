use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::EventLogError;

/// An append-only destination for event records. A successful append
/// guarantees the record is durable.
pub trait EventSink<R>: Send {
    fn append(&mut self, record: &R) -> Result<(), EventLogError>;
}

/// CSV event log backed by a file opened in append mode for the whole
/// session. The header line is written on first write into an empty
/// file; every append is flushed and fsynced before it reports success.
pub struct CsvEventLog<R> {
    writer: csv::Writer<File>,
    _record: PhantomData<fn() -> R>,
}

impl<R> CsvEventLog<R> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EventLogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);
        Ok(Self {
            writer,
            _record: PhantomData,
        })
    }
}

impl<R> EventSink<R> for CsvEventLog<R>
where
    R: Serialize + Send,
{
    fn append(&mut self, record: &R) -> Result<(), EventLogError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// In-memory sink for tests and the playground. The shared handle
/// stays readable after the sink moved into a broker.
pub struct MemoryEventLog<R> {
    records: Arc<Mutex<Vec<R>>>,
}

impl<R> MemoryEventLog<R> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn records(&self) -> Arc<Mutex<Vec<R>>> {
        Arc::clone(&self.records)
    }
}

impl<R> Default for MemoryEventLog<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> EventSink<R> for MemoryEventLog<R>
where
    R: Clone + Send,
{
    fn append(&mut self, record: &R) -> Result<(), EventLogError> {
        self.records
            .lock()
            .expect("event record lock poisoned")
            .push(record.clone());
        Ok(())
    }
}
