use std::{error, fmt};

use tokio::sync::{mpsc, oneshot};

pub mod actions;
pub mod broker;
pub mod capacity;
pub mod clock;
pub mod executor;
pub mod layout;
pub mod restore;
pub mod source;
#[cfg(test)]
mod testing;
pub mod views;

pub use broker::{Broker, BrokerConfig, InitError};
pub use executor::{DispatchCore, ExecutionError};
pub use layout::{LayoutError, Network};
pub use restore::RestoreError;

/// Errors a collaborator sees on the broker handle.
#[derive(Debug)]
pub enum RequestError {
    NotFound,
    /// The broker is in a fatal state and refuses state changes.
    Refused,
    Execution(ExecutionError),
    SendError(Box<mpsc::error::SendError<broker::Command>>),
    ResponseError(oneshot::error::RecvError),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such entity"),
            Self::Refused => write!(f, "the broker refuses further actions"),
            Self::Execution(why) => write!(f, "{}", why),
            Self::SendError(_) => write!(f, "the broker is gone"),
            Self::ResponseError(_) => write!(f, "the broker dropped the request"),
        }
    }
}

impl error::Error for RequestError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Execution(why) => Some(why),
            Self::ResponseError(why) => Some(why),
            _ => None,
        }
    }
}

impl From<ExecutionError> for RequestError {
    fn from(why: ExecutionError) -> Self {
        Self::Execution(why)
    }
}

impl From<mpsc::error::SendError<broker::Command>> for RequestError {
    fn from(why: mpsc::error::SendError<broker::Command>) -> Self {
        Self::SendError(Box::new(why))
    }
}

impl From<oneshot::error::RecvError> for RequestError {
    fn from(why: oneshot::error::RecvError) -> Self {
        Self::ResponseError(why)
    }
}

pub type RequestResult<O> = Result<O, RequestError>;
