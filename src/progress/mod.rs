// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Client-visible progress reporting.

pub mod aggregator;
pub mod channel;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{
    BackgroundTaskCensus, IndexPhase, IndexProgressAggregator, IndexProgressSnapshot,
    ProgressReporter, TaskState, TaskTracker, TrackerId, TrackerSnapshot,
};
pub use channel::{ClientProgressChannel, ProgressChannel};
pub use lifecycle::{ActivitySnapshot, ActivityState, ProgressLifecycle};
