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

//! # marker-files
//!
//! A [registry] implementation that keeps presence records as empty files.
//!
//! [registry]: crate::registry
//!
//! Each instance is one file named for its [InstanceId] in the directory `<directory>/<root>`.
//! Listing the root is a directory scan. Any filesystem visible to all instances (a shared volume,
//! an NFS mount) will do.
//!
//! Markers are written under a dot-prefixed temporary name & renamed into place, so a scan never
//! sees a half-written record. [InstanceId]s may not begin with a '.', so temporaries and
//! markers can't be confused.

use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    entities::{InstanceId, RegistryRoot},
    registry,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to create the registry directory {path:?}: {source}"))]
    CreateDir {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to remove the marker {path:?}: {source}"))]
    Remove {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to rename {from:?} to {to:?}: {source}"))]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to scan the registry directory {path:?}: {source}"))]
    Scan {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to write the marker {path:?}: {source}"))]
    Write {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// A directory of presence markers
#[derive(Clone, Debug)]
pub struct MarkerFiles {
    root_dir: PathBuf,
}

impl MarkerFiles {
    /// Open the registry rooted at `directory`/`root`, creating the directory if need be
    pub async fn new(directory: &Path, root: &RegistryRoot) -> Result<MarkerFiles> {
        let root_dir = directory.join(&**root);
        tokio::fs::create_dir_all(&root_dir)
            .await
            .context(CreateDirSnafu {
                path: root_dir.clone(),
            })?;
        Ok(MarkerFiles { root_dir })
    }
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
    async fn register1(&self, instance_id: &InstanceId) -> Result<()> {
        let marker = self.root_dir.join(&**instance_id);
        let tmp = self
            .root_dir
            .join(format!(".{}.{}", instance_id, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, b"")
            .await
            .context(WriteSnafu { path: tmp.clone() })?;
        // rename(2) replaces an existing marker atomically, which makes re-registration a no-op
        if let Err(err) = tokio::fs::rename(&tmp, &marker).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err).context(RenameSnafu {
                from: tmp,
                to: marker,
            });
        }
        Ok(())
    }
    async fn deregister1(&self, instance_id: &InstanceId) -> Result<bool> {
        let marker = self.root_dir.join(&**instance_id);
        match tokio::fs::remove_file(&marker).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).context(RemoveSnafu { path: marker }),
        }
    }
    async fn list_alive1(&self) -> Result<HashSet<InstanceId>> {
        let mut entries = tokio::fs::read_dir(&self.root_dir)
            .await
            .context(ScanSnafu {
                path: self.root_dir.clone(),
            })?;
        let mut alive = HashSet::new();
        while let Some(entry) = entries.next_entry().await.context(ScanSnafu {
            path: self.root_dir.clone(),
        })? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("Skipping non-UTF-8 entry {:?} in the registry.", name);
                continue;
            };
            if name.starts_with('.') {
                // An in-flight registration
                continue;
            }
            match InstanceId::new(name) {
                Ok(id) => {
                    alive.insert(id);
                }
                Err(err) => warn!("Skipping {:?} in the registry: {}", name, err),
            }
        }
        debug!("Found {} live instance(s).", alive.len());
        Ok(alive)
    }
}

#[async_trait]
impl registry::Backend for MarkerFiles {
    async fn register(&self, instance_id: &InstanceId) -> registry::Result<()> {
        self.register1(instance_id)
            .await
            .map_err(registry::Error::new)
    }
    async fn deregister(&self, instance_id: &InstanceId) -> registry::Result<bool> {
        self.deregister1(instance_id)
            .await
            .map_err(registry::Error::new)
    }
    async fn list_alive(&self) -> registry::Result<HashSet<InstanceId>> {
        self.list_alive1().await.map_err(registry::Error::new)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::registry::Backend as _;

    #[tokio::test]
    async fn presence_markers() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MarkerFiles::new(dir.path(), &RegistryRoot::default())
            .await
            .unwrap();
        assert!(registry.root_dir().ends_with("Root"));

        let vm1 = InstanceId::new("vm-1").unwrap();
        registry.register(&vm1).await.unwrap();
        registry.register(&vm1).await.unwrap();
        assert!(registry.root_dir().join("vm-1").is_file());
        assert_eq!(registry.list_alive().await.unwrap().len(), 1);

        // Leftover temporaries & junk names are ignored
        std::fs::write(registry.root_dir().join(".vm-2.deadbeef"), b"").unwrap();
        assert_eq!(
            registry.list_alive().await.unwrap(),
            HashSet::from([vm1.clone()])
        );

        assert!(registry.deregister(&vm1).await.unwrap());
        assert!(!registry.deregister(&vm1).await.unwrap());
        assert!(registry.list_alive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MarkerFiles::new(dir.path(), &RegistryRoot::default())
            .await
            .unwrap();
        std::fs::remove_dir(registry.root_dir()).unwrap();
        assert!(registry.list_alive().await.is_err());
        // ...but deregistration still succeeds: there's certainly no marker
        assert!(!registry
            .deregister(&InstanceId::new("vm-1").unwrap())
            .await
            .unwrap());
    }
}
