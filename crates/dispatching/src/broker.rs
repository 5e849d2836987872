use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::{error, fmt};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use utility::id::Id;

use event_log::{CsvEventLog, EventLogError};
use model::action::ActionContext;
use model::call::TrainStationCall;
use model::dispatcher::Dispatcher;
use model::section::TrainSection;
use model::train::Train;

use crate::clock::TimeProvider;
use crate::executor::DispatchCore;
use crate::layout::{self, LayoutError};
use crate::restore::{self, RestoreError};
use crate::source::{DataSource, SourceError};
use crate::views::{self, SectionView, TrainView};
use crate::{RequestError, RequestResult};

/// Init failed before the broker ever served a request.
#[derive(Debug)]
pub enum InitError {
    Source(SourceError),
    InvalidLayout(LayoutError),
    Restore(RestoreError),
    EventLog(EventLogError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(why) => write!(f, "data source failed: {}", why),
            Self::InvalidLayout(why) => write!(f, "invalid layout: {}", why),
            Self::Restore(why) => write!(f, "restore failed: {}", why),
            Self::EventLog(why) => write!(f, "{}", why),
        }
    }
}

impl error::Error for InitError {}

impl From<LayoutError> for InitError {
    fn from(why: LayoutError) -> Self {
        Self::InvalidLayout(why)
    }
}

impl From<RestoreError> for InitError {
    fn from(why: RestoreError) -> Self {
        Self::Restore(why)
    }
}

impl From<EventLogError> for InitError {
    fn from(why: EventLogError) -> Self {
        Self::EventLog(why)
    }
}

/// Where the two event logs live for this session.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub train_events_path: PathBuf,
    pub dispatch_events_path: PathBuf,
}

/// Mailbox messages of the broker task. Mutations and reads travel the
/// same queue, which is what serializes them: a read observes the
/// state between completed actions, never a half-applied one.
pub enum Command {
    Dispatchers {
        respond_to: oneshot::Sender<Vec<Dispatcher>>,
    },
    DispatcherById {
        dispatcher_id: Id<Dispatcher>,
        respond_to: oneshot::Sender<Option<Dispatcher>>,
    },
    DeparturesFor {
        dispatcher_id: Id<Dispatcher>,
        limit: Option<usize>,
        respond_to: oneshot::Sender<Vec<SectionView>>,
    },
    ArrivalsFor {
        dispatcher_id: Id<Dispatcher>,
        limit: Option<usize>,
        respond_to: oneshot::Sender<Vec<SectionView>>,
    },
    ActionsFor {
        dispatcher_id: Id<Dispatcher>,
        section_id: Id<TrainSection>,
        respond_to: oneshot::Sender<Vec<ActionContext>>,
    },
    Trains {
        respond_to: oneshot::Sender<Vec<TrainView>>,
    },
    TrainById {
        train_id: Id<Train>,
        respond_to: oneshot::Sender<Option<TrainView>>,
    },
    SectionsForTrain {
        train_id: Id<Train>,
        dispatcher_id: Id<Dispatcher>,
        respond_to: oneshot::Sender<Vec<SectionView>>,
    },
    Execute {
        action: ActionContext,
        respond_to: oneshot::Sender<RequestResult<()>>,
    },
    ChangeCallTrack {
        call_id: Id<TrainStationCall>,
        track_number: String,
        respond_to: oneshot::Sender<RequestResult<()>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the session's single coordinator. All state
/// lives in a task owning the `DispatchCore`; this handle only sends
/// commands and awaits answers.
#[derive(Clone)]
pub struct Broker {
    sender: mpsc::Sender<Command>,
}

impl Broker {
    /// Builds the network from the data source, replays the event logs
    /// on a restart, opens the sinks and spawns the coordinator task.
    pub async fn start<S>(
        source: &S,
        time_provider: Box<dyn TimeProvider>,
        config: BrokerConfig,
        is_restart: bool,
    ) -> Result<Broker, InitError>
    where
        S: DataSource + ?Sized,
    {
        let mut network = layout::build_network(source).await?;
        if is_restart {
            let train_records = event_log::read_all(&config.train_events_path)?;
            let dispatch_records =
                event_log::read_all(&config.dispatch_events_path)?;
            restore::replay(&mut network, train_records, dispatch_records)?;
            log::info!("restored session state from event logs");
        }
        let train_events = CsvEventLog::open(&config.train_events_path)?;
        let dispatch_events = CsvEventLog::open(&config.dispatch_events_path)?;
        let core = DispatchCore::new(
            network,
            Box::new(train_events),
            Box::new(dispatch_events),
            time_provider,
        );
        Ok(Self::spawn(core))
    }

    /// Spawns the coordinator over an already built core. Tests and
    /// embedders use this to bring their own sinks.
    pub fn spawn(core: DispatchCore) -> Broker {
        let (sender, mut receiver) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut core = core;
            let mut fatal = false;
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Shutdown { respond_to } => {
                        let _ = respond_to.send(());
                        break;
                    }
                    command => {
                        let result =
                            AssertUnwindSafe(handle(&mut core, command, fatal))
                                .catch_unwind()
                                .await;
                        if let Err(why) = result {
                            log::error!("dispatching core paniced: {:?}", why);
                            fatal = true;
                        }
                    }
                }
            }
        });
        Broker { sender }
    }

    pub async fn dispatchers(&self) -> RequestResult<Vec<Dispatcher>> {
        let (respond_to, response) = oneshot::channel();
        self.sender.send(Command::Dispatchers { respond_to }).await?;
        Ok(response.await?)
    }

    pub async fn dispatcher_by_id(
        &self,
        dispatcher_id: Id<Dispatcher>,
    ) -> RequestResult<Dispatcher> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::DispatcherById {
                dispatcher_id,
                respond_to,
            })
            .await?;
        response.await?.ok_or(RequestError::NotFound)
    }

    pub async fn departures_for(
        &self,
        dispatcher_id: Id<Dispatcher>,
        limit: Option<usize>,
    ) -> RequestResult<Vec<SectionView>> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::DeparturesFor {
                dispatcher_id,
                limit,
                respond_to,
            })
            .await?;
        Ok(response.await?)
    }

    pub async fn arrivals_for(
        &self,
        dispatcher_id: Id<Dispatcher>,
        limit: Option<usize>,
    ) -> RequestResult<Vec<SectionView>> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::ArrivalsFor {
                dispatcher_id,
                limit,
                respond_to,
            })
            .await?;
        Ok(response.await?)
    }

    pub async fn actions_for(
        &self,
        dispatcher_id: Id<Dispatcher>,
        section_id: Id<TrainSection>,
    ) -> RequestResult<Vec<ActionContext>> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::ActionsFor {
                dispatcher_id,
                section_id,
                respond_to,
            })
            .await?;
        Ok(response.await?)
    }

    pub async fn trains(&self) -> RequestResult<Vec<TrainView>> {
        let (respond_to, response) = oneshot::channel();
        self.sender.send(Command::Trains { respond_to }).await?;
        Ok(response.await?)
    }

    pub async fn train_by_id(&self, train_id: Id<Train>) -> RequestResult<TrainView> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::TrainById {
                train_id,
                respond_to,
            })
            .await?;
        response.await?.ok_or(RequestError::NotFound)
    }

    pub async fn sections_for_train(
        &self,
        train_id: Id<Train>,
        dispatcher_id: Id<Dispatcher>,
    ) -> RequestResult<Vec<SectionView>> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::SectionsForTrain {
                train_id,
                dispatcher_id,
                respond_to,
            })
            .await?;
        Ok(response.await?)
    }

    /// Runs one action through the critical section. The action set is
    /// revalidated inside; a stale surface gets a refusal, never a
    /// half-applied change.
    pub async fn execute(&self, action: ActionContext) -> RequestResult<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::Execute { action, respond_to })
            .await?;
        response.await?
    }

    pub async fn change_call_track(
        &self,
        call_id: Id<TrainStationCall>,
        track_number: String,
    ) -> RequestResult<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::ChangeCallTrack {
                call_id,
                track_number,
                respond_to,
            })
            .await?;
        response.await?
    }

    /// Stops the coordinator; the event files close when the core is
    /// dropped.
    pub async fn shutdown(self) -> RequestResult<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender.send(Command::Shutdown { respond_to }).await?;
        Ok(response.await?)
    }
}

async fn handle(core: &mut DispatchCore, command: Command, fatal: bool) {
    match command {
        Command::Dispatchers { respond_to } => {
            let dispatchers = core.network.dispatchers.values().cloned().collect();
            let _ = respond_to.send(dispatchers);
        }
        Command::DispatcherById {
            dispatcher_id,
            respond_to,
        } => {
            let dispatcher = core.network.dispatchers.get(&dispatcher_id).cloned();
            let _ = respond_to.send(dispatcher);
        }
        Command::DeparturesFor {
            dispatcher_id,
            limit,
            respond_to,
        } => {
            let _ = respond_to.send(views::departures_for(
                &core.network,
                dispatcher_id,
                limit,
            ));
        }
        Command::ArrivalsFor {
            dispatcher_id,
            limit,
            respond_to,
        } => {
            let _ = respond_to.send(views::arrivals_for(
                &core.network,
                dispatcher_id,
                limit,
            ));
        }
        Command::ActionsFor {
            dispatcher_id,
            section_id,
            respond_to,
        } => {
            let _ = respond_to.send(core.available_actions(dispatcher_id, section_id));
        }
        Command::Trains { respond_to } => {
            let trains = core
                .network
                .trains
                .keys()
                .copied()
                .collect::<Vec<_>>()
                .into_iter()
                .filter_map(|id| views::train_view(&core.network, id))
                .collect();
            let _ = respond_to.send(trains);
        }
        Command::TrainById {
            train_id,
            respond_to,
        } => {
            let _ = respond_to.send(views::train_view(&core.network, train_id));
        }
        Command::SectionsForTrain {
            train_id,
            dispatcher_id,
            respond_to,
        } => {
            let sections = core
                .network
                .sections_of_train(train_id)
                .into_iter()
                .filter_map(|id| views::section_view(&core.network, dispatcher_id, id))
                .collect();
            let _ = respond_to.send(sections);
        }
        Command::Execute { action, respond_to } => {
            let result = if fatal {
                Err(RequestError::Refused)
            } else {
                core.execute(&action).map_err(RequestError::Execution)
            };
            let _ = respond_to.send(result);
        }
        Command::ChangeCallTrack {
            call_id,
            track_number,
            respond_to,
        } => {
            let result = if fatal {
                Err(RequestError::Refused)
            } else {
                core.change_call_track(call_id, &track_number)
                    .map_err(RequestError::Execution)
            };
            let _ = respond_to.send(result);
        }
        Command::Shutdown { .. } => {
            // handled by the task loop before dispatching here
        }
    }
}
