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

//! Instance registry scenarios

use std::collections::HashSet;

use libtest_mimic::Failed;

use guestbook::{entities::InstanceId, registry::alive_instances};

use crate::Backends;

fn ids(names: &[&str]) -> Result<HashSet<InstanceId>, Failed> {
    Ok(names
        .iter()
        .map(|name| InstanceId::new(name))
        .collect::<Result<HashSet<_>, _>>()?)
}

/// Two instances come up; one goes away
pub async fn test_register_list_deregister(backends: Backends) -> Result<(), Failed> {
    let registry = backends.registry;
    let vm1 = InstanceId::new("vm-1")?;
    let vm2 = InstanceId::new("vm-2")?;

    assert!(registry.list_alive().await?.is_empty());
    registry.register(&vm1).await?;
    assert_eq!(registry.list_alive().await?, ids(&["vm-1"])?);
    registry.register(&vm2).await?;
    assert_eq!(registry.list_alive().await?, ids(&["vm-1", "vm-2"])?);
    registry.deregister(&vm1).await?;
    assert_eq!(registry.list_alive().await?, ids(&["vm-2"])?);
    Ok(())
}

/// Registering twice leaves one record; deregistering twice is no error
pub async fn test_idempotence(backends: Backends) -> Result<(), Failed> {
    let registry = backends.registry;
    let vm1 = InstanceId::new("vm-1")?;

    registry.register(&vm1).await?;
    registry.register(&vm1).await?;
    assert_eq!(registry.list_alive().await?, ids(&["vm-1"])?);

    assert!(registry.deregister(&vm1).await?);
    assert!(!registry.deregister(&vm1).await?);
    assert!(registry.list_alive().await?.is_empty());

    // Deregistering an ID that was never registered is fine, too
    assert!(!registry.deregister(&InstanceId::new("vm-9")?).await?);
    Ok(())
}

/// Each instance sees the others' records
pub async fn test_instances_see_each_other(backends: Backends) -> Result<(), Failed> {
    let vm1 = InstanceId::new("vm-1")?;
    let vm2 = InstanceId::new("vm-2")?;

    backends.registry.register(&vm1).await?;
    backends.peer_registry.register(&vm2).await?;

    let alive = alive_instances(backends.registry.as_ref()).await;
    assert!(!alive.degraded());
    assert_eq!(alive.sorted(), vec![vm1.clone(), vm2.clone()]);
    assert_eq!(
        backends.peer_registry.list_alive().await?,
        ids(&["vm-1", "vm-2"])?
    );

    // An instance may deregister itself through its own handle without disturbing the other
    backends.peer_registry.deregister(&vm2).await?;
    assert_eq!(backends.registry.list_alive().await?, ids(&["vm-1"])?);
    Ok(())
}

/// Many instances registering at once
pub async fn test_concurrent_registration(backends: Backends) -> Result<(), Failed> {
    let handles = (0..16)
        .map(|i| {
            let registry = if i % 2 == 0 {
                backends.registry.clone()
            } else {
                backends.peer_registry.clone()
            };
            tokio::spawn(async move {
                let id = InstanceId::new(&format!("vm-{}", i))?;
                registry.register(&id).await?;
                Ok::<(), Failed>(())
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.await??;
    }
    assert_eq!(backends.registry.list_alive().await?.len(), 16);
    Ok(())
}
