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

//! # guestbook
//!
//! A multi-instance web guestbook. Visitors sign the guestbook; entries are kept in a shared,
//! file-backed [store](storage). Each running instance announces itself in an instance
//! [registry] for the lifetime of the process (see [lifecycle]) so that any instance can list
//! all the others.
//!
//! The daemon itself is `guestbookd`.
pub mod entities;
pub mod http;
pub mod lifecycle;
#[path = "marker-files.rs"]
pub mod marker_files;
pub mod navigation;
pub mod pages;
pub mod presentation;
pub mod registry;
pub mod sqlite;
pub mod storage;
