// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Merged indexing progress across all background task trackers.
//!
//! Every open workspace has a tracker for its preparation and indexing
//! work. The [`IndexProgressAggregator`] folds them into one progress
//! indicator: trackers signal through a [`ProgressReporter`] when tasks are
//! scheduled or their status changes, and on every signal the aggregator
//! rebuilds a [`BackgroundTaskCensus`] from scratch and drives its
//! [`ProgressLifecycle`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use super::channel::ProgressChannel;
use crate::config::ProgressConfig;
use super::lifecycle::{ActivitySnapshot, ProgressLifecycle};

/// State of one background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Scheduled but not started.
    Queued,
    /// Executing.
    Running,
}

/// What the background machinery is busy with, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexPhase {
    /// The file open in the editor is being prepared.
    PreparingEditorFile,
    /// The build graph is being (re)generated.
    GeneratingBuildGraph,
    /// Targets are being prepared or files indexed.
    Indexing,
    /// Nothing to do.
    UpToDate,
}

/// Point-in-time state of one task tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSnapshot {
    /// Whether the current editor file is being prepared.
    pub preparing_editor_file: bool,
    /// Whether the build graph is being generated.
    pub generating_build_graph: bool,
    /// In-flight target preparation tasks, by task id.
    pub preparation_tasks: HashMap<String, TaskState>,
    /// In-flight index tasks, by task id.
    pub index_tasks: HashMap<String, TaskState>,
}

impl TrackerSnapshot {
    /// The tracker's own phase.
    #[must_use]
    pub fn phase(&self) -> IndexPhase {
        if self.preparing_editor_file {
            IndexPhase::PreparingEditorFile
        } else if self.generating_build_graph {
            IndexPhase::GeneratingBuildGraph
        } else if !self.preparation_tasks.is_empty() || !self.index_tasks.is_empty() {
            IndexPhase::Indexing
        } else {
            IndexPhase::UpToDate
        }
    }
}

/// A source of background task status, typically one per workspace.
pub trait TaskTracker: Send + Sync {
    /// Current status. Called on the aggregator's queue, so it must not block.
    fn snapshot(&self) -> TrackerSnapshot;
}

/// Union of all trackers' status at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundTaskCensus {
    /// The most urgent phase of any tracker.
    pub phase: IndexPhase,
    /// Preparation tasks in flight.
    pub preparing: usize,
    /// Index tasks waiting to run.
    pub queued: usize,
    /// Index tasks running.
    pub running: usize,
}

impl Default for BackgroundTaskCensus {
    fn default() -> Self {
        Self {
            phase: IndexPhase::UpToDate,
            preparing: 0,
            queued: 0,
            running: 0,
        }
    }
}

impl BackgroundTaskCensus {
    /// Builds the census from the trackers' current snapshots.
    pub fn collect<'a>(trackers: impl IntoIterator<Item = &'a TrackerSnapshot>) -> Self {
        let mut census = Self::default();
        for snapshot in trackers {
            census.phase = census.phase.min(snapshot.phase());
            census.preparing += snapshot.preparation_tasks.len();
            for state in snapshot.index_tasks.values() {
                match state {
                    TaskState::Queued => census.queued += 1,
                    TaskState::Running => census.running += 1,
                }
            }
        }
        census
    }

    /// Index tasks scheduled but not yet finished.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.queued + self.running
    }
}

/// Identifies a tracker registered with the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackerId(u64);

/// Read-only view of the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgressSnapshot {
    /// Census from the most recent recompute.
    pub census: BackgroundTaskCensus,
    /// Index tasks scheduled since the last time everything was up to date.
    pub queued_target: usize,
    /// Number of registered trackers.
    pub tracker_count: usize,
    /// State of the owned activity.
    pub activity: Option<ActivitySnapshot>,
}

enum Event {
    TasksScheduled(usize),
    StatusChanged,
    AddTracker(TrackerId, Arc<dyn TaskTracker>),
    RemoveTracker(TrackerId),
    Snapshot(oneshot::Sender<IndexProgressSnapshot>),
}

/// Cloneable handle trackers use to signal the aggregator.
#[derive(Clone)]
pub struct ProgressReporter {
    events: mpsc::UnboundedSender<Event>,
}

impl ProgressReporter {
    /// Reports that `count` new index tasks were scheduled.
    pub fn tasks_scheduled(&self, count: usize) {
        self.send(Event::TasksScheduled(count));
    }

    /// Reports that some tracker's status changed.
    pub fn status_changed(&self) {
        self.send(Event::StatusChanged);
    }

    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Index progress aggregator is gone");
        }
    }
}

/// Merges all trackers into one indexing progress indicator.
pub struct IndexProgressAggregator {
    reporter: ProgressReporter,
    next_tracker: AtomicU64,
}

impl IndexProgressAggregator {
    /// Starts an aggregator reporting through `channel` under `title`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(title: impl Into<String>, channel: Arc<dyn ProgressChannel>) -> Self {
        let title = title.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = AggregatorState {
            trackers: BTreeMap::new(),
            queued_target: 0,
            census: BackgroundTaskCensus::default(),
            lifecycle: ProgressLifecycle::new(title.clone(), channel.clone()),
            title,
            channel,
            active: false,
        };
        tokio::spawn(state.run(rx));

        Self {
            reporter: ProgressReporter { events: tx },
            next_tracker: AtomicU64::new(1),
        }
    }

    /// Starts an aggregator titled from `config`.
    #[must_use]
    pub fn from_config(config: &ProgressConfig, channel: Arc<dyn ProgressChannel>) -> Self {
        Self::new(config.index_title.clone(), channel)
    }

    /// A handle for trackers to signal through.
    #[must_use]
    pub fn reporter(&self) -> ProgressReporter {
        self.reporter.clone()
    }

    /// Registers a tracker and recomputes.
    pub fn add_tracker(&self, tracker: Arc<dyn TaskTracker>) -> TrackerId {
        let id = TrackerId(self.next_tracker.fetch_add(1, Ordering::Relaxed));
        self.reporter.send(Event::AddTracker(id, tracker));
        id
    }

    /// Forgets a tracker and recomputes.
    pub fn remove_tracker(&self, id: TrackerId) {
        self.reporter.send(Event::RemoveTracker(id));
    }

    /// Shorthand for [`ProgressReporter::tasks_scheduled`].
    pub fn tasks_scheduled(&self, count: usize) {
        self.reporter.tasks_scheduled(count);
    }

    /// Shorthand for [`ProgressReporter::status_changed`].
    pub fn status_changed(&self) {
        self.reporter.status_changed();
    }

    /// Returns the aggregator's state after every previously queued event.
    pub async fn snapshot(&self) -> Option<IndexProgressSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.reporter.send(Event::Snapshot(tx));
        rx.await.ok()
    }
}

struct AggregatorState {
    trackers: BTreeMap<TrackerId, Arc<dyn TaskTracker>>,
    queued_target: usize,
    census: BackgroundTaskCensus,
    /// Activity of the current indexing session.
    lifecycle: ProgressLifecycle,
    title: String,
    channel: Arc<dyn ProgressChannel>,
    /// Whether this aggregator holds a `begin` on the lifecycle.
    active: bool,
}

impl AggregatorState {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            match event {
                Event::TasksScheduled(count) => {
                    self.queued_target = self.queued_target.saturating_add(count);
                    trace!("{count} index tasks scheduled (target {})", self.queued_target);
                    self.recompute();
                }
                Event::StatusChanged => self.recompute(),
                Event::AddTracker(id, tracker) => {
                    self.trackers.insert(id, tracker);
                    self.recompute();
                }
                Event::RemoveTracker(id) => {
                    if self.trackers.remove(&id).is_none() {
                        debug!("Removing unknown tracker {:?}", id);
                    }
                    self.recompute();
                }
                Event::Snapshot(reply) => {
                    let snapshot = IndexProgressSnapshot {
                        census: self.census,
                        queued_target: self.queued_target,
                        tracker_count: self.trackers.len(),
                        activity: self.lifecycle.snapshot().await,
                    };
                    let _ = reply.send(snapshot);
                }
            }
        }
    }

    fn recompute(&mut self) {
        let snapshots: Vec<TrackerSnapshot> =
            self.trackers.values().map(|tracker| tracker.snapshot()).collect();
        self.census = BackgroundTaskCensus::collect(&snapshots);

        if self.census.phase == IndexPhase::UpToDate {
            self.queued_target = 0;
            if self.active {
                self.active = false;
                self.lifecycle.end();
                // A client refusal only silences the session it happened in
                self.lifecycle = ProgressLifecycle::new(self.title.clone(), self.channel.clone());
            }
            return;
        }

        let (message, percentage) = self.status();
        self.lifecycle.update(Some(message), percentage);
        if !self.active {
            self.active = true;
            self.lifecycle.begin();
        }
    }

    fn status(&self) -> (String, Option<u32>) {
        match self.census.phase {
            IndexPhase::PreparingEditorFile => ("Preparing current file".to_string(), None),
            IndexPhase::GeneratingBuildGraph => ("Generating build graph".to_string(), None),
            IndexPhase::Indexing | IndexPhase::UpToDate => {
                let finished = self.finished();
                let percentage = if self.queued_target == 0 {
                    0
                } else {
                    let ratio = finished.saturating_mul(100) / self.queued_target;
                    u32::try_from(ratio).unwrap_or(100)
                };

                if self.census.outstanding() == 0 {
                    if self.census.preparing == 0 {
                        error!("Indexing reported with no preparation or index tasks");
                    }
                    ("Preparing targets".to_string(), Some(percentage))
                } else {
                    (format!("{finished} / {}", self.queued_target), Some(percentage))
                }
            }
        }
    }

    fn finished(&self) -> usize {
        let outstanding = self.census.outstanding();
        if outstanding > self.queued_target {
            debug!(
                "Trackers report {outstanding} index tasks but only {} were scheduled",
                self.queued_target
            );
        }
        self.queued_target.saturating_sub(outstanding)
    }
}
