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

//! # The guestbook Integration Tests, SQLite registry
//!
//! Every registered scenario, run with presence records kept in a SQLite table. As in the default
//! configuration, the registry table lives in the guestbook database itself.

use std::{path::PathBuf, sync::Arc};

use guestbook::{entities::RegistryRoot, sqlite};
use guestbook_test::Backends;
use libtest_mimic::Failed;

mod common;

async fn open(dir: PathBuf) -> Result<Backends, Failed> {
    let path = dir.join("guestbook.sqlite");
    let registry =
        sqlite::Registry::new(sqlite::Database::new(&path), RegistryRoot::default()).await?;
    let peer_registry =
        sqlite::Registry::new(sqlite::Database::new(&path), RegistryRoot::default()).await?;
    Ok(Backends {
        storage: Arc::new(sqlite::Database::new(&path)),
        peer_storage: Arc::new(sqlite::Database::new(&path)),
        registry: Arc::new(registry),
        peer_registry: Arc::new(peer_registry),
    })
}

fn main() {
    common::run(open)
}
