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

//! Lifecycle scenarios, run against real stores

use std::sync::Arc;

use libtest_mimic::Failed;

use guestbook::{
    entities::InstanceId,
    lifecycle::{Controller, State, StopTrigger, DEFAULT_DEREGISTER_TIMEOUT},
};

use crate::Backends;

/// Start, then a forced stop with no shutdown hook at all
pub async fn test_forced_stop(backends: Backends) -> Result<(), Failed> {
    let vm3 = InstanceId::new("vm-3")?;
    let controller = Controller::new(
        vm3.clone(),
        backends.storage.clone(),
        backends.registry.clone(),
        DEFAULT_DEREGISTER_TIMEOUT,
    );

    assert_eq!(controller.start().await?, State::Registered);
    // The schema is in place...
    assert!(backends.storage.list_recent(20).await?.is_empty());
    // & we're listed.
    assert!(backends.peer_registry.list_alive().await?.contains(&vm3));

    assert_eq!(
        controller.stop(StopTrigger::StopRequest).await,
        State::Deregistered
    );
    assert!(!backends.peer_registry.list_alive().await?.contains(&vm3));
    Ok(())
}

/// Both triggers, at once, from separate tasks
pub async fn test_both_triggers(backends: Backends) -> Result<(), Failed> {
    let vm4 = InstanceId::new("vm-4")?;
    let controller = Arc::new(Controller::new(
        vm4.clone(),
        backends.storage.clone(),
        backends.registry.clone(),
        DEFAULT_DEREGISTER_TIMEOUT,
    ));
    controller.start().await?;

    let hook = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.stop(StopTrigger::ShutdownHook).await })
    };
    let request = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.stop(StopTrigger::StopRequest).await })
    };
    assert_eq!(hook.await?, State::Deregistered);
    assert_eq!(request.await?, State::Deregistered);

    // A straggler changes nothing
    assert_eq!(
        controller.stop(StopTrigger::StopRequest).await,
        State::Deregistered
    );
    assert!(backends.registry.list_alive().await?.is_empty());
    // ...nor may we come back
    assert!(controller.start().await.is_err());
    assert!(backends.registry.list_alive().await?.is_empty());
    Ok(())
}

/// Two instances, each with its own handles on the shared stores
pub async fn test_two_instances(backends: Backends) -> Result<(), Failed> {
    let vm1 = InstanceId::new("vm-1")?;
    let vm2 = InstanceId::new("vm-2")?;
    let first = Controller::new(
        vm1.clone(),
        backends.storage.clone(),
        backends.registry.clone(),
        DEFAULT_DEREGISTER_TIMEOUT,
    );
    let second = Controller::new(
        vm2.clone(),
        backends.peer_storage.clone(),
        backends.peer_registry.clone(),
        DEFAULT_DEREGISTER_TIMEOUT,
    );

    first.start().await?;
    // Starting is once-only
    first.start().await?;
    backends.storage.append("alice", "from vm-1").await?;
    second.start().await?;
    backends.peer_storage.append("bob", "from vm-2").await?;

    // Neither start-up dropped the other's data
    assert_eq!(backends.storage.list_recent(0).await?.len(), 2);
    assert_eq!(backends.registry.list_alive().await?.len(), 2);

    second.stop(StopTrigger::ShutdownHook).await;
    let alive = backends.registry.list_alive().await?;
    assert!(alive.contains(&vm1));
    assert!(!alive.contains(&vm2));
    assert_eq!(first.state().await, State::Registered);
    Ok(())
}

/// A stale record from a previous incarnation is cleaned up by a stop, even before `start()`
pub async fn test_stop_before_start(backends: Backends) -> Result<(), Failed> {
    let vm5 = InstanceId::new("vm-5")?;
    backends.peer_registry.register(&vm5).await?;

    let controller = Controller::new(
        vm5.clone(),
        backends.storage.clone(),
        backends.registry.clone(),
        DEFAULT_DEREGISTER_TIMEOUT,
    );
    assert_eq!(controller.state().await, State::Unregistered);
    assert_eq!(
        controller.stop(StopTrigger::ShutdownHook).await,
        State::Deregistered
    );
    assert!(backends.registry.list_alive().await?.is_empty());
    Ok(())
}
