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

//! # registry
//!
//! The instance registry: a durable set of "this instance is alive" markers.
//!
//! # Introduction
//!
//! Every guestbook instance writes a presence record for itself on start-up & removes it on the
//! way down. Records are grouped under a single [RegistryRoot] so that the whole set can be listed
//! without knowing any instance IDs in advance. A record carries no payload: its existence is the
//! whole message.
//!
//! [RegistryRoot]: crate::entities::RegistryRoot
//!
//! Listings are only eventually consistent with the latest `register`/`deregister` calls (just as
//! they would be over a replicated key-value store), and a record may outlive its instance if
//! that instance died without running either shutdown path. There's no expiry; a stale record
//! stays until someone deregisters it.

use std::collections::HashSet;

use async_trait::async_trait;
use itertools::Itertools;
use tracing::error;

use crate::entities::InstanceId;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Registry error
///
/// Note that there's no "not found" case: deregistering an absent ID is a success.
#[derive(Debug)]
pub struct Error {
    source: BoxedError,
}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error {
            source: Box::new(err),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instance registry unavailable: {}", self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait]
pub trait Backend {
    /// Write a presence record for `instance_id`; re-registering an ID is a successful no-op
    async fn register(&self, instance_id: &InstanceId) -> Result<()>;
    /// Remove the presence record for `instance_id`, if any
    ///
    /// Return true if a record was actually removed, false if there was none. Either way, the ID
    /// is not registered on successful return.
    async fn deregister(&self, instance_id: &InstanceId) -> Result<bool>;
    /// All IDs currently registered under this registry's root, in no particular order
    async fn list_alive(&self) -> Result<HashSet<InstanceId>>;
}

/// The outcome of [alive_instances]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AliveInstances {
    instances: HashSet<InstanceId>,
    degraded: bool,
}

impl AliveInstances {
    /// True if the registry couldn't be read; the instance set will be empty in that case
    pub fn degraded(&self) -> bool {
        self.degraded
    }
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
    /// The registry makes no ordering promises; this is the order used for display
    pub fn sorted(&self) -> Vec<InstanceId> {
        self.instances.iter().sorted().cloned().collect()
    }
}

/// List the live instances, never failing
///
/// The instance list is a nice-to-have, not something worth failing a page over: if the registry
/// can't be read, log it & report an empty, degraded set.
pub async fn alive_instances(registry: &(dyn Backend + Send + Sync)) -> AliveInstances {
    match registry.list_alive().await {
        Ok(instances) => AliveInstances {
            instances,
            degraded: false,
        },
        Err(err) => {
            error!("Failed to list live instances: {}", err);
            AliveInstances {
                instances: HashSet::new(),
                degraded: true,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Backend for Broken {
        async fn register(&self, _: &InstanceId) -> Result<()> {
            Err(Error::new(std::io::Error::other("down")))
        }
        async fn deregister(&self, _: &InstanceId) -> Result<bool> {
            Err(Error::new(std::io::Error::other("down")))
        }
        async fn list_alive(&self) -> Result<HashSet<InstanceId>> {
            Err(Error::new(std::io::Error::other("down")))
        }
    }

    struct Fixed(HashSet<InstanceId>);

    #[async_trait]
    impl Backend for Fixed {
        async fn register(&self, _: &InstanceId) -> Result<()> {
            Ok(())
        }
        async fn deregister(&self, _: &InstanceId) -> Result<bool> {
            Ok(false)
        }
        async fn list_alive(&self) -> Result<HashSet<InstanceId>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn degrades_on_failure() {
        let alive = alive_instances(&Broken).await;
        assert!(alive.degraded());
        assert!(alive.is_empty());
    }

    #[tokio::test]
    async fn sorts_for_display() {
        let ids: HashSet<InstanceId> = ["vm-3", "vm-1", "vm-2"]
            .iter()
            .map(|s| InstanceId::new(s).unwrap())
            .collect();
        let alive = alive_instances(&Fixed(ids)).await;
        assert!(!alive.degraded());
        assert_eq!(
            alive
                .sorted()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
            vec!["vm-1", "vm-2", "vm-3"]
        );
    }
}
