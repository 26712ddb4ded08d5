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

//! # guestbook entities
//!
//! The handful of types shared by the storage layer, the instance registry & the request
//! handlers.

use std::{fmt::Display, ops::Deref, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use snafu::{prelude::*, Backtrace};
use uuid::Uuid;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{text:?} is not a valid instance ID"))]
    BadInstanceId { text: String, backtrace: Backtrace },
    #[snafu(display("{text:?} is not a valid registry root"))]
    BadRegistryRoot { text: String, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

/// Instance IDs & registry roots double as file names (in the marker-file registry) and as SQL
/// keys, so they share one rule: non-empty, at most 255 bytes, no leading '.', and no path
/// separators or NULs.
fn check_key_component(text: &str) -> bool {
    !text.is_empty()
        && text.len() <= 255
        && !text.starts_with('.')
        && !text.chars().any(|c| c == '/' || c == '\\' || c == '\0')
}

fn mk_serde_de_err<'de, D: Deserializer<'de>>(err: impl std::error::Error) -> D::Error {
    <D::Error as serde::de::Error>::custom(format!("{:?}", err))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           InstanceId                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Opaque identifier for one running guestbook process
///
/// The hosting environment hands these out; guestbook never interprets them beyond checking that
/// they can safely be used as a storage key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(text: &str) -> Result<InstanceId> {
        check_key_component(text)
            .then(|| InstanceId(text.to_owned()))
            .context(BadInstanceIdSnafu { text })
    }
}

impl TryFrom<String> for InstanceId {
    type Error = Error;

    fn try_from(value: String) -> StdResult<Self, Self::Error> {
        if check_key_component(&value) {
            Ok(InstanceId(value))
        } else {
            BadInstanceIdSnafu { text: value }.fail()
        }
    }
}

impl FromStr for InstanceId {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        InstanceId::new(s)
    }
}

impl From<Uuid> for InstanceId {
    fn from(value: Uuid) -> Self {
        // A hyphenated UUID always satisfies `check_key_component`
        InstanceId(value.hyphenated().to_string())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for InstanceId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        InstanceId::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          RegistryRoot                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The fixed namespace under which all presence records are grouped
///
/// Every instance that should see every other instance must be configured with the same root.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RegistryRoot(String);

pub const DEFAULT_REGISTRY_ROOT: &str = "Root";

impl RegistryRoot {
    pub fn new(text: &str) -> Result<RegistryRoot> {
        check_key_component(text)
            .then(|| RegistryRoot(text.to_owned()))
            .context(BadRegistryRootSnafu { text })
    }
}

impl Default for RegistryRoot {
    fn default() -> Self {
        RegistryRoot(DEFAULT_REGISTRY_ROOT.to_owned())
    }
}

impl Deref for RegistryRoot {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RegistryRoot {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        RegistryRoot::new(&s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for RegistryRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         GuestbookEntry                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Store-assigned entry identifier; strictly increasing in insertion order
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl From<i64> for EntryId {
    fn from(value: i64) -> Self {
        EntryId(value)
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One signature in the guestbook
///
/// `content` is stored exactly as submitted; escaping is the presentation layer's business.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuestbookEntry {
    id: EntryId,
    author: String,
    content: String,
}

impl GuestbookEntry {
    pub fn new(id: EntryId, author: &str, content: &str) -> GuestbookEntry {
        GuestbookEntry {
            id,
            author: author.to_owned(),
            content: content.to_owned(),
        }
    }
    pub fn id(&self) -> EntryId {
        self.id
    }
    /// The empty string means the entry was posted anonymously
    pub fn author(&self) -> &str {
        &self.author
    }
    pub fn content(&self) -> &str {
        &self.content
    }
}
