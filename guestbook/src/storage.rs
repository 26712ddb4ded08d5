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

//! # storage
//!
//! Abstractions for the guestbook storage layer.
//!
//! The guestbook itself is an append-only log: entries go in, they come out most-recent-first,
//! and nothing is ever updated or deleted. Implementations are shared by every running instance,
//! so they must tolerate writers in other processes.

use crate::entities::{EntryId, GuestbookEntry};

use async_trait::async_trait;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Storage-layer error
///
/// Deliberately coarse: callers can't do much beyond "fail the request" or "refuse to start", so
/// that's all this type distinguishes. The backend-specific error is retained as the source.
#[derive(Debug)]
pub enum Error {
    /// The store couldn't be reached, or what we found there wasn't a usable database
    StorageUnavailable { source: BoxedError },
    /// The guestbook table couldn't be created
    SchemaInitFailure { source: BoxedError },
}

impl Error {
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::StorageUnavailable {
            source: Box::new(err),
        }
    }
    pub fn schema_init(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::SchemaInitFailure {
            source: Box::new(err),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::StorageUnavailable { source } => {
                write!(f, "guestbook storage unavailable: {}", source)
            }
            Error::SchemaInitFailure { source } => {
                write!(f, "failed to initialize the guestbook schema: {}", source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::StorageUnavailable { source } | Error::SchemaInitFailure { source } => {
                Some(source.as_ref())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait]
pub trait Backend {
    /// Create the guestbook's storage structure if it's not already there
    ///
    /// Must be safe to call on every process start-up: calling it against an initialized store is
    /// a no-op & never touches existing entries.
    async fn ensure_schema(&self) -> Result<()>;
    /// Record one entry & return its newly-assigned [EntryId]
    ///
    /// The write is atomic: readers will either see the complete entry or nothing. The returned
    /// [EntryId] is greater than that of every entry committed before it.
    async fn append(&self, author: &str, content: &str) -> Result<EntryId>;
    /// Retrieve up to `limit` entries, most recent first
    ///
    /// A `limit` of zero means "no limit".
    async fn list_recent(&self, limit: usize) -> Result<Vec<GuestbookEntry>>;
}
