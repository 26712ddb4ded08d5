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

//! Guestbook store scenarios

use libtest_mimic::Failed;

use guestbook::entities::{EntryId, GuestbookEntry};

use crate::Backends;

/// Two entries, one anonymous, read back newest first
pub async fn test_entries_newest_first(backends: Backends) -> Result<(), Failed> {
    let storage = backends.storage;
    storage.ensure_schema().await?;

    assert_eq!(storage.append("alice", "hello").await?, EntryId::from(1));
    assert_eq!(storage.append("", "hi").await?, EntryId::from(2));
    assert_eq!(
        storage.list_recent(20).await?,
        vec![
            GuestbookEntry::new(EntryId::from(2), "", "hi"),
            GuestbookEntry::new(EntryId::from(1), "alice", "hello"),
        ]
    );
    Ok(())
}

/// `list_recent(n)` returns the last `min(n, total)` entries; zero means all of them
pub async fn test_list_recent_limits(backends: Backends) -> Result<(), Failed> {
    let storage = backends.storage;
    storage.ensure_schema().await?;
    assert!(storage.list_recent(20).await?.is_empty());
    assert!(storage.list_recent(0).await?.is_empty());

    for i in 0..25 {
        storage.append("bob", &format!("entry {}", i)).await?;
    }

    let page = storage.list_recent(20).await?;
    assert_eq!(page.len(), 20);
    assert_eq!(page[0].content(), "entry 24");
    assert_eq!(page[19].content(), "entry 5");
    assert_eq!(storage.list_recent(100).await?.len(), 25);
    assert_eq!(storage.list_recent(0).await?.len(), 25);
    assert_eq!(storage.list_recent(1).await?[0].content(), "entry 24");
    Ok(())
}

/// Ids increase across writers, however appends & reads interleave
pub async fn test_ids_increase_across_instances(backends: Backends) -> Result<(), Failed> {
    backends.storage.ensure_schema().await?;
    backends.peer_storage.ensure_schema().await?;

    let mut last = EntryId::from(0);
    for i in 0..10 {
        let (writer, reader) = if i % 2 == 0 {
            (&backends.storage, &backends.peer_storage)
        } else {
            (&backends.peer_storage, &backends.storage)
        };
        let id = writer.append("", &format!("{}", i)).await?;
        assert!(id > last);
        last = id;
        // A write is visible to the other instance as soon as it's committed
        assert_eq!(reader.list_recent(1).await?[0].id(), id);
    }

    // Concurrent writers, too
    let handles = (0..8)
        .map(|i| {
            let storage = if i % 2 == 0 {
                backends.storage.clone()
            } else {
                backends.peer_storage.clone()
            };
            tokio::spawn(async move { storage.append("racer", &format!("{}", i)).await })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.await??;
    }

    let all = backends.storage.list_recent(0).await?;
    assert_eq!(all.len(), 18);
    assert!(all.windows(2).all(|pair| pair[0].id() > pair[1].id()));
    Ok(())
}

/// Ensuring the schema again (from any instance) keeps what's there
pub async fn test_ensure_schema_is_idempotent(backends: Backends) -> Result<(), Failed> {
    backends.storage.ensure_schema().await?;
    let id = backends.storage.append("carol", "still here").await?;
    for _ in 0..3 {
        backends.storage.ensure_schema().await?;
        backends.peer_storage.ensure_schema().await?;
    }
    assert_eq!(
        backends.peer_storage.list_recent(0).await?,
        vec![GuestbookEntry::new(id, "carol", "still here")]
    );
    Ok(())
}

/// Without a schema, reads fail rather than returning nothing
pub async fn test_no_schema_is_unavailable(backends: Backends) -> Result<(), Failed> {
    assert!(backends.storage.list_recent(20).await.is_err());
    assert!(backends.storage.append("dave", "lost").await.is_err());
    Ok(())
}
