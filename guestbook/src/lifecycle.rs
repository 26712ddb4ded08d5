// Copyright (C) 2026 The guestbook authors
//
// This file is part of guestbook.
//
// guestbook is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// guestbook is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with guestbook.  If not,
// see <http://www.gnu.org/licenses/>.

//! # lifecycle
//!
//! Tie this instance's presence record to the life of the process.
//!
//! # Introduction
//!
//! An instance moves through three states:
//!
//! ```text
//!  Unregistered --start()--> Registered --stop()--> Deregistered
//! ```
//!
//! [start](Controller::start) makes sure the guestbook schema exists & then registers this
//! instance. [stop](Controller::stop) removes the registration. The catch is that there are two
//! ways to be told we're going down: the graceful shutdown hook (a `SIGTERM`, in `guestbookd`) and
//! an explicit stop request from the hosting environment (`GET /_ah/stop`). Either may arrive
//! without the other, both may arrive, in either order, or neither. So `stop` may be called any
//! number of times from any number of tasks, and every call converges on the same thing:
//! [deregister](crate::registry::Backend::deregister) of our own ID.
//!
//! Deregistration is best-effort: failures are logged, not returned, and the call is bounded by a
//! timeout so that a wedged registry can't hold up process exit. A failed attempt leaves the state
//! alone so that the next trigger tries again.
//!
//! The state lock is only ever held briefly or across a bounded deregistration. In particular,
//! `start` does its I/O *outside* that lock, so a stop never waits on a slow (or hung) start-up. If
//! a stop lands while a start is in flight, the stop wins: the start removes the record it just
//! wrote & fails with [Error::Terminated].

use std::{fmt::Display, sync::Arc, time::Duration};

use snafu::{prelude::*, Backtrace};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    entities::InstanceId,
    registry::{self, Backend as RegistryBackend},
    storage::{self, Backend as StorageBackend},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Instance {instance_id} failed to register: {source}"))]
    Register {
        instance_id: InstanceId,
        source: registry::Error,
    },
    #[snafu(display("Failed to ensure the guestbook schema: {source}"))]
    Schema { source: storage::Error },
    #[snafu(display("Instance {instance_id} has been deregistered & can't be restarted"))]
    Terminated {
        instance_id: InstanceId,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

pub const DEFAULT_DEREGISTER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Unregistered,
    Registered,
    Deregistered,
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                State::Unregistered => "unregistered",
                State::Registered => "registered",
                State::Deregistered => "deregistered",
            }
        )
    }
}

/// What told us to stop
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopTrigger {
    /// The process is shutting down gracefully
    ShutdownHook,
    /// The hosting environment asked us to stop, perhaps without running the shutdown hook
    StopRequest,
}

impl Display for StopTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StopTrigger::ShutdownHook => "shutdown hook",
                StopTrigger::StopRequest => "stop request",
            }
        )
    }
}

/// Lifecycle controller for one instance
pub struct Controller {
    instance_id: InstanceId,
    storage: Arc<dyn StorageBackend + Send + Sync>,
    registry: Arc<dyn RegistryBackend + Send + Sync>,
    deregister_timeout: Duration,
    /// Serializes calls to `start`; held across start-up I/O. `stop` never takes it.
    starting: Mutex<()>,
    state: Mutex<State>,
}

impl Controller {
    pub fn new(
        instance_id: InstanceId,
        storage: Arc<dyn StorageBackend + Send + Sync>,
        registry: Arc<dyn RegistryBackend + Send + Sync>,
        deregister_timeout: Duration,
    ) -> Controller {
        Controller {
            instance_id,
            storage,
            registry,
            deregister_timeout,
            starting: Mutex::new(()),
            state: Mutex::new(State::Unregistered),
        }
    }
    pub async fn state(&self) -> State {
        *self.state.lock().await
    }
    /// Ensure the guestbook schema & register this instance
    ///
    /// Only the first successful call does anything; later calls return [State::Registered]
    /// straight away. A failed call leaves us [State::Unregistered], so it may be retried. Once
    /// deregistered, an instance stays that way.
    #[tracing::instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn start(&self) -> Result<State> {
        let _starting = self.starting.lock().await;
        match *self.state.lock().await {
            State::Registered => {
                debug!("Already registered.");
                return Ok(State::Registered);
            }
            State::Deregistered => return self.terminated(),
            State::Unregistered => (),
        }

        // These are two independent commits; if we die between them, the next start-up just does
        // both again.
        self.storage.ensure_schema().await.context(SchemaSnafu)?;
        self.registry
            .register(&self.instance_id)
            .await
            .context(RegisterSnafu {
                instance_id: self.instance_id.clone(),
            })?;

        let mut state = self.state.lock().await;
        if State::Deregistered == *state {
            warn!(
                "Instance {} was stopped while starting; removing its record.",
                self.instance_id
            );
            self.deregister("stop during start-up").await;
            return self.terminated();
        }
        *state = State::Registered;
        info!("Instance {} registered.", self.instance_id);
        Ok(*state)
    }
    /// Remove this instance's presence record
    ///
    /// Never fails; returns the state we're in afterward. Note that a stop while still
    /// [State::Unregistered] deregisters anyway: a previous incarnation may have crashed after
    /// writing the record but before recording the fact.
    #[tracing::instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn stop(&self, trigger: StopTrigger) -> State {
        let mut state = self.state.lock().await;
        if State::Deregistered == *state {
            debug!("Stop via {} after deregistration; nothing to do.", trigger);
            return State::Deregistered;
        }
        if self.deregister(trigger).await {
            *state = State::Deregistered;
        }
        *state
    }
    /// Deregister within the timeout; true if our record is gone
    async fn deregister(&self, cause: impl Display) -> bool {
        match tokio::time::timeout(
            self.deregister_timeout,
            self.registry.deregister(&self.instance_id),
        )
        .await
        {
            Ok(Ok(removed)) => {
                if removed {
                    info!("Instance {} deregistered via {}.", self.instance_id, cause);
                } else {
                    info!(
                        "Instance {} had no presence record on {}.",
                        self.instance_id, cause
                    );
                }
                true
            }
            Ok(Err(err)) => {
                error!(
                    "Failed to deregister instance {} on {}: {}",
                    self.instance_id, cause, err
                );
                false
            }
            Err(_) => {
                warn!(
                    "Deregistering instance {} on {} timed-out after {:?}.",
                    self.instance_id, cause, self.deregister_timeout
                );
                false
            }
        }
    }
    fn terminated(&self) -> Result<State> {
        TerminatedSnafu {
            instance_id: self.instance_id.clone(),
        }
        .fail()
    }
}
