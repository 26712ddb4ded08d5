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

//! # sqlite
//!
//! [Storage] & [registry] implementations on top of SQLite.
//!
//! [Storage]: crate::storage
//! [registry]: crate::registry
//!
//! # Connections
//!
//! Every operation opens its own connection & drops it before returning, on the error paths as
//! much as the happy one. That's more expensive than pooling, but the database file is shared with
//! other guestbook processes, and a short-lived connection never sits on a lock between requests.
//! rusqlite is a blocking API, so the work is done on Tokio's blocking thread pool.
//!
//! Writers from other processes are queued for up to [BUSY_TIMEOUT] before SQLite gives up with
//! `SQLITE_BUSY`; that's as much multi-writer coordination as the guestbook needs.

use std::{collections::HashSet, path::PathBuf, time::Duration};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::{
    entities::{EntryId, GuestbookEntry, InstanceId, RegistryRoot},
    registry, storage,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to append a guestbook entry: {source}"))]
    Append {
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to create table {table}: {source}"))]
    CreateTable {
        table: String,
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to remove presence record for {instance_id}: {source}"))]
    Deregister {
        instance_id: InstanceId,
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("A blocking database task failed: {source}"))]
    Join {
        source: tokio::task::JoinError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to list guestbook entries: {source}"))]
    ListEntries {
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to list presence records: {source}"))]
    ListPresence {
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to open {path:?}: {source}"))]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to write presence record for {instance_id}: {source}"))]
    Register {
        instance_id: InstanceId,
        source: rusqlite::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_GUESTBOOK_TABLE: &str = "CREATE TABLE IF NOT EXISTS guestbook \
     (id INTEGER PRIMARY KEY AUTOINCREMENT, author TEXT NOT NULL, content TEXT NOT NULL)";

const CREATE_PRESENCE_TABLE: &str = "CREATE TABLE IF NOT EXISTS presence \
     (root TEXT NOT NULL, instance_id TEXT NOT NULL, PRIMARY KEY (root, instance_id))";

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Database                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A SQLite database file, opened afresh for each operation
#[derive(Clone, Debug)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Nothing is opened (or created) until the first operation
    pub fn new(path: impl Into<PathBuf>) -> Database {
        Database { path: path.into() }
    }
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
    /// Run `f` against a freshly-opened connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            debug!("Opening {:?}.", path);
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .context(OpenSnafu { path: path.clone() })?;
            conn.busy_timeout(BUSY_TIMEOUT)
                .context(OpenSnafu { path: path.clone() })?;
            f(&conn)
            // `conn` is dropped (& closed) here
        })
        .await
        .context(JoinSnafu)?
    }
}

#[async_trait]
impl storage::Backend for Database {
    async fn ensure_schema(&self) -> storage::Result<()> {
        self.with_connection(|conn| {
            conn.execute(CREATE_GUESTBOOK_TABLE, [])
                .context(CreateTableSnafu { table: "guestbook" })?;
            Ok(())
        })
        .await
        .map_err(storage::Error::schema_init)
    }

    async fn append(&self, author: &str, content: &str) -> storage::Result<EntryId> {
        let author = author.to_owned();
        let content = content.to_owned();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO guestbook (author, content) VALUES (?1, ?2)",
                params![author, content],
            )
            .context(AppendSnafu)?;
            Ok(EntryId::from(conn.last_insert_rowid()))
        })
        .await
        .map_err(storage::Error::unavailable)
    }

    async fn list_recent(&self, limit: usize) -> storage::Result<Vec<GuestbookEntry>> {
        // SQLite reads a negative LIMIT as "no limit"
        let limit: i64 = if limit == 0 {
            -1
        } else {
            i64::try_from(limit).unwrap_or(i64::MAX)
        };
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, author, content FROM guestbook ORDER BY id DESC LIMIT ?1")
                .context(ListEntriesSnafu)?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok(GuestbookEntry::new(
                        EntryId::from(row.get::<_, i64>(0)?),
                        &row.get::<_, String>(1)?,
                        &row.get::<_, String>(2)?,
                    ))
                })
                .context(ListEntriesSnafu)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .context(ListEntriesSnafu)
        })
        .await
        .map_err(storage::Error::unavailable)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Registry                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An instance registry kept in a SQLite table
///
/// Presence records are rows keyed by `(root, instance_id)`; several registries (with distinct
/// roots) may share one table.
#[derive(Clone, Debug)]
pub struct Registry {
    db: Database,
    root: RegistryRoot,
}

impl Registry {
    /// Open the registry, creating its table if need be
    pub async fn new(db: Database, root: RegistryRoot) -> Result<Registry> {
        db.with_connection(|conn| {
            conn.execute(CREATE_PRESENCE_TABLE, [])
                .context(CreateTableSnafu { table: "presence" })?;
            Ok(())
        })
        .await?;
        Ok(Registry { db, root })
    }
}

#[async_trait]
impl registry::Backend for Registry {
    async fn register(&self, instance_id: &InstanceId) -> registry::Result<()> {
        let root = self.root.to_string();
        let instance_id = instance_id.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO presence (root, instance_id) VALUES (?1, ?2)",
                    params![root, instance_id.as_ref()],
                )
                .context(RegisterSnafu {
                    instance_id: instance_id.clone(),
                })?;
                Ok(())
            })
            .await
            .map_err(registry::Error::new)
    }

    async fn deregister(&self, instance_id: &InstanceId) -> registry::Result<bool> {
        let root = self.root.to_string();
        let instance_id = instance_id.clone();
        self.db
            .with_connection(move |conn| {
                let n = conn
                    .execute(
                        "DELETE FROM presence WHERE root = ?1 AND instance_id = ?2",
                        params![root, instance_id.as_ref()],
                    )
                    .context(DeregisterSnafu {
                        instance_id: instance_id.clone(),
                    })?;
                Ok(n > 0)
            })
            .await
            .map_err(registry::Error::new)
    }

    async fn list_alive(&self) -> registry::Result<HashSet<InstanceId>> {
        let root = self.root.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT instance_id FROM presence WHERE root = ?1")
                    .context(ListPresenceSnafu)?;
                let ids = stmt
                    .query_map(params![root], |row| row.get::<_, String>(0))
                    .context(ListPresenceSnafu)?
                    .collect::<std::result::Result<Vec<String>, _>>()
                    .context(ListPresenceSnafu)?;
                Ok(ids
                    .into_iter()
                    .filter_map(|id| {
                        InstanceId::try_from(id.clone())
                            .inspect_err(|err| warn!("Skipping {:?} in the registry: {}", id, err))
                            .ok()
                    })
                    .collect::<HashSet<InstanceId>>())
            })
            .await
            .map_err(registry::Error::new)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{registry::Backend as _, storage::Backend as _};

    #[tokio::test]
    async fn guestbook_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("guestbook.sqlite"));
        db.ensure_schema().await.unwrap();

        assert_eq!(db.append("alice", "hello").await.unwrap(), EntryId::from(1));
        assert_eq!(db.append("", "hi").await.unwrap(), EntryId::from(2));
        assert_eq!(
            db.list_recent(20).await.unwrap(),
            vec![
                GuestbookEntry::new(EntryId::from(2), "", "hi"),
                GuestbookEntry::new(EntryId::from(1), "alice", "hello"),
            ]
        );
        assert_eq!(db.list_recent(1).await.unwrap().len(), 1);
        assert_eq!(db.list_recent(0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ensure_schema_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("guestbook.sqlite"));
        db.ensure_schema().await.unwrap();
        db.append("bob", "first").await.unwrap();
        db.ensure_schema().await.unwrap();
        db.ensure_schema().await.unwrap();
        // A second handle on the same file sees the same data
        let other = Database::new(db.path());
        other.ensure_schema().await.unwrap();
        let entries = other.list_recent(20).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content(), "first");
    }

    #[tokio::test]
    async fn missing_schema_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("guestbook.sqlite"));
        assert!(matches!(
            db.list_recent(20).await,
            Err(storage::Error::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guestbook.sqlite");
        std::fs::write(&path, vec![0x5a; 4096]).unwrap();
        let db = Database::new(&path);
        assert!(db.append("mallory", "hi").await.is_err());
        assert!(db.list_recent(20).await.is_err());
    }

    #[tokio::test]
    async fn roots_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("registry.sqlite"));
        let blue = Registry::new(db.clone(), RegistryRoot::new("blue").unwrap())
            .await
            .unwrap();
        let green = Registry::new(db, RegistryRoot::new("green").unwrap())
            .await
            .unwrap();
        let vm1 = InstanceId::new("vm-1").unwrap();

        blue.register(&vm1).await.unwrap();
        blue.register(&vm1).await.unwrap();
        assert_eq!(blue.list_alive().await.unwrap().len(), 1);
        assert!(green.list_alive().await.unwrap().is_empty());
        assert!(!green.deregister(&vm1).await.unwrap());
        assert!(blue.list_alive().await.unwrap().contains(&vm1));
        assert!(blue.deregister(&vm1).await.unwrap());
        assert!(!blue.deregister(&vm1).await.unwrap());
        assert!(blue.list_alive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("registry.sqlite"));
        let registry = Registry::new(db.clone(), RegistryRoot::default())
            .await
            .unwrap();
        let vm1 = InstanceId::new("vm-1").unwrap();
        registry.register(&vm1).await.unwrap();

        // Written by something other than this crate
        let conn = Connection::open(db.path()).unwrap();
        for bad in ["", "../etc", ".hidden"] {
            conn.execute(
                "INSERT INTO presence (root, instance_id) VALUES (?1, ?2)",
                params![RegistryRoot::default().to_string(), bad],
            )
            .unwrap();
        }

        assert_eq!(
            registry.list_alive().await.unwrap(),
            HashSet::from([vm1.clone()])
        );
        assert!(registry.deregister(&vm1).await.unwrap());
        assert!(registry.list_alive().await.unwrap().is_empty());
    }
}
