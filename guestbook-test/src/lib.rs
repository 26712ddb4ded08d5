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

//! # The guestbook Integration Tests
//!
//! # Introduction
//!
//! The stock test harness has no notion of fixtures, and every scenario here wants one: a fresh
//! guestbook database & a fresh instance registry, opened twice over so that a test can play the
//! part of two instances sharing the same stores. So, like the other integration test suites I've
//! written, these programs opt-out of `libharness` in Cargo.toml:
//!
//! ```toml
//! [[test]]
//!     name = "sqlite"
//!     harness = false
//! ```
//!
//! and supply their own `main()`, using [libtest-mimic] to honor the usual command-line
//! arguments. Each test program is one fixture: `sqlite` keeps presence records in a SQLite table,
//! `marker-files` keeps them as files in a directory. Both run the same scenarios.
//!
//! [libtest-mimic]: https://docs.rs/libtest-mimic/latest/libtest_mimic/index.html
//!
//! # Project Structure
//!
//! The scenarios themselves live in this library crate, one module per component. They're
//! written against the [Backends] struct, so they don't know which registry implementation
//! they're exercising. Code relating to the test framework itself (the `Test` struct, test
//! registration) belongs in `tests/common`. The test programs themselves go in `tests`.
use std::{future::Future, pin::Pin, sync::Arc};

use libtest_mimic::Failed;

use guestbook::{registry::Backend as RegistryBackend, storage::Backend as StorageBackend};

pub mod lifecycle;
pub mod pages;
pub mod registry;
pub mod store;

/// What every test function returns; test programs drive these on a Tokio runtime of their own
pub type TestFuture = Pin<Box<dyn Future<Output = Result<(), Failed>> + Send>>;

/// The stores under test
///
/// Each test gets its own, freshly created. The `peer_` handles refer to the very same stores as
/// their counterparts, but are opened independently, as another instance would open them.
///
/// The guestbook database is handed over *without* a schema; tests that need one must call
/// [ensure_schema](StorageBackend::ensure_schema) (or start a lifecycle controller).
pub struct Backends {
    pub storage: Arc<dyn StorageBackend + Send + Sync>,
    pub peer_storage: Arc<dyn StorageBackend + Send + Sync>,
    pub registry: Arc<dyn RegistryBackend + Send + Sync>,
    pub peer_registry: Arc<dyn RegistryBackend + Send + Sync>,
}
