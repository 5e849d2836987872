use std::{error, fmt, io};

pub mod reader;
pub mod records;
pub mod sink;
pub mod timestamp;

pub use reader::read_all;
pub use records::{
    DispatchChangeType, DispatchEventRecord, TrainChangeType, TrainEventRecord,
};
pub use sink::{CsvEventLog, EventSink, MemoryEventLog};
pub use timestamp::MonotonicTimestamps;

#[derive(Debug)]
pub enum EventLogError {
    Io(io::Error),
    Csv(csv::Error),
}

impl fmt::Display for EventLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(why) => write!(f, "event log io error: {}", why),
            Self::Csv(why) => write!(f, "event log record error: {}", why),
        }
    }
}

impl error::Error for EventLogError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(why) => Some(why),
            Self::Csv(why) => Some(why),
        }
    }
}

impl From<io::Error> for EventLogError {
    fn from(why: io::Error) -> Self {
        Self::Io(why)
    }
}

impl From<csv::Error> for EventLogError {
    fn from(why: csv::Error) -> Self {
        Self::Csv(why)
    }
}
