use std::fs::File;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::EventLogError;

/// Reads a whole event log into memory. A missing file is an empty
/// session, not an error; an unknown change type or malformed line is
/// a hard error, so a restore never proceeds from half-understood
/// history.
pub fn read_all<R, P>(path: P) -> Result<Vec<R>, EventLogError>
where
    R: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    log::debug!("read {} records from {}", records.len(), path.display());
    Ok(records)
}
