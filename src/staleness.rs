// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Per-request staleness checks for indexed and semantic results.
//!
//! A [`StalenessOracle`] answers "is what we computed for this file still
//! valid?" by comparing on-disk modification times and in-memory edits with
//! the timestamps recorded at index time. Every file-side lookup is memoized
//! for the lifetime of the oracle, so decisions made within one request are
//! consistent with each other even if the disk changes mid-request.
//!
//! Build a new oracle for every logical request and drop it afterwards. The
//! cache is never invalidated, which is only correct because it never lives
//! longer than one request.
//!
//! The two failure defaults point in opposite directions:
//! - an unreadable file while diffing against an open document counts as
//!   *edited* (stale);
//! - an I/O error while reading a modification time counts as *fresh*, so a
//!   flaky stat cannot trigger a re-index storm.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};

/// In-memory document contents held by the editor session.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Latest text of the open document at `path`, or `None` if it isn't open.
    async fn latest_snapshot(&self, path: &Path) -> Option<String>;
}

/// The persistent symbol index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// When the unit covering `path` was last recorded, if there is one.
    async fn last_unit_timestamp(&self, path: &Path) -> Option<SystemTime>;
}

/// A symbol occurrence as recorded by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLocation {
    /// Absolute path of the file containing the symbol.
    pub path: PathBuf,
    /// When the file was indexed.
    pub indexed_at: SystemTime,
}

/// Cached result of reading a file's modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModificationTime {
    /// The file no longer exists.
    Missing,
    /// The file was last modified at this time.
    At(SystemTime),
    /// The time could not be read for another reason.
    Unknown,
}

/// Memoized staleness checks scoped to one request.
pub struct StalenessOracle<'a> {
    documents: &'a dyn DocumentStore,
    modification_times: HashMap<PathBuf, ModificationTime>,
    unsaved_edits: HashMap<PathBuf, bool>,
}

impl<'a> StalenessOracle<'a> {
    /// Creates an oracle backed by `documents`, with an empty cache.
    #[must_use]
    pub fn new(documents: &'a dyn DocumentStore) -> Self {
        Self {
            documents,
            modification_times: HashMap::new(),
            unsaved_edits: HashMap::new(),
        }
    }

    /// Returns true if `path` is open with contents that differ from disk.
    ///
    /// An open document whose file cannot be read counts as edited.
    pub async fn has_unsaved_edits(&mut self, path: &Path) -> bool {
        if let Some(&cached) = self.unsaved_edits.get(path) {
            return cached;
        }

        let edited = match self.documents.latest_snapshot(path).await {
            None => false,
            Some(snapshot) => match tokio::fs::read(path).await {
                Ok(on_disk) => on_disk != snapshot.as_bytes(),
                Err(e) => {
                    debug!(
                        "Cannot read {} to compare with open document: {e}",
                        path.display()
                    );
                    true
                }
            },
        };

        trace!("Unsaved edits in {}: {edited}", path.display());
        self.unsaved_edits.insert(path.to_path_buf(), edited);
        edited
    }

    /// Returns true if `location` still reflects what is on disk.
    ///
    /// Unsaved edits always make a location stale. A deleted file is stale.
    /// If the modification time cannot be read, the location is assumed fresh.
    pub async fn is_fresh(&mut self, location: &SymbolLocation) -> bool {
        if self.has_unsaved_edits(&location.path).await {
            return false;
        }

        match self.modification_time(&location.path).await {
            ModificationTime::Missing => false,
            ModificationTime::Unknown => true,
            ModificationTime::At(modified) => modified <= location.indexed_at,
        }
    }

    /// Returns true if `index` holds a unit for `path` that is at least as new
    /// as the file on disk.
    ///
    /// Unsaved edits, a missing record and a deleted file all count as out of
    /// date; an unreadable modification time counts as up to date.
    ///
    /// The store is asked on every call, since callers may pass different
    /// stores; only the file-side inputs are memoized.
    pub async fn has_up_to_date_index_record(
        &mut self,
        path: &Path,
        index: &dyn IndexStore,
    ) -> bool {
        if self.has_unsaved_edits(path).await {
            return false;
        }

        let Some(recorded) = index.last_unit_timestamp(path).await else {
            return false;
        };
        match self.modification_time(path).await {
            ModificationTime::Missing => false,
            ModificationTime::Unknown => true,
            ModificationTime::At(modified) => modified <= recorded,
        }
    }

    async fn modification_time(&mut self, path: &Path) -> ModificationTime {
        if let Some(&cached) = self.modification_times.get(path) {
            return cached;
        }

        let time = match tokio::fs::metadata(path).await {
            Ok(metadata) => match metadata.modified() {
                Ok(modified) => ModificationTime::At(modified),
                Err(e) => {
                    debug!("No modification time for {}: {e}", path.display());
                    ModificationTime::Unknown
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => ModificationTime::Missing,
            Err(e) => {
                debug!("Cannot stat {}: {e}", path.display());
                ModificationTime::Unknown
            }
        };

        self.modification_times.insert(path.to_path_buf(), time);
        time
    }
}
