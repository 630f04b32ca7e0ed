// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Generation-safe refresh of derived data sets.
//!
//! A [`RefreshController`] owns one or more [`DerivedSet`]s (discovered
//! tests, entry points, ...) and recomputes all of them together whenever
//! something they depend on changes. Each request starts a new generation
//! and cancels the previous one; a result is only published if its
//! generation is still the latest when it completes. This is
//! last-requested-wins: a superseded run that happens to finish first is
//! thrown away.
//!
//! Cancellation is cooperative. Sources receive a [`CancellationToken`] and
//! should poll it at natural suspension points; the controller never aborts a
//! computation, it only ignores its result.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::RefreshConfig;

/// Computes the current value of one derived data set.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// The computed value. Compared by equality to decide whether listeners
    /// need to hear about it.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Computes a new value, or returns `None` if the computation was
    /// abandoned (typically because `cancel` fired).
    async fn compute(&self, cancel: &CancellationToken) -> Option<Self::Value>;
}

/// Called with no payload when a set's published value changes.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest requested generation and the token that cancels it.
#[derive(Debug)]
struct RunState {
    generation: u64,
    cancel: CancellationToken,
}

/// Identifies one refresh run.
#[derive(Clone)]
struct RunTicket {
    generation: u64,
    cancel: CancellationToken,
    state: Arc<Mutex<RunState>>,
}

/// A derived data set: its source, its published value and its listener.
pub struct DerivedSet<S: DataSource> {
    source: S,
    published: Mutex<Option<S::Value>>,
    listener: Mutex<Option<ChangeListener>>,
}

impl<S: DataSource> DerivedSet<S> {
    /// Wraps `source` with nothing published and no listener.
    #[must_use]
    pub fn new(source: S) -> Arc<Self> {
        Arc::new(Self {
            source,
            published: Mutex::new(None),
            listener: Mutex::new(None),
        })
    }

    /// The currently published value, if any run has published one.
    #[must_use]
    pub fn value(&self) -> Option<S::Value> {
        lock(&self.published).clone()
    }

    /// Installs the listener, replacing any previous one.
    pub fn set_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        *lock(&self.listener) = Some(Arc::new(listener));
    }

    /// Removes the listener.
    pub fn clear_listener(&self) {
        *lock(&self.listener) = None;
    }

    /// The wrapped source.
    pub const fn source(&self) -> &S {
        &self.source
    }
}

/// Type-erased view of a [`DerivedSet`] used by the controller.
#[async_trait]
trait ManagedSet: Send + Sync {
    fn has_listener(&self) -> bool;
    async fn refresh(&self, ticket: RunTicket);
}

#[async_trait]
impl<S: DataSource> ManagedSet for DerivedSet<S> {
    fn has_listener(&self) -> bool {
        lock(&self.listener).is_some()
    }

    async fn refresh(&self, ticket: RunTicket) {
        let Some(value) = self.source.compute(&ticket.cancel).await else {
            debug!(
                "Refresh of {} abandoned (generation {})",
                self.source.name(),
                ticket.generation
            );
            return;
        };

        // Publishing happens under the run-state lock so a new request cannot
        // start between the generation check and the swap.
        let listener = {
            let state = lock(&ticket.state);
            if ticket.cancel.is_cancelled() || state.generation != ticket.generation {
                debug!(
                    "Discarding {} from superseded generation {} (latest {})",
                    self.source.name(),
                    ticket.generation,
                    state.generation
                );
                return;
            }

            let mut published = lock(&self.published);
            if published.as_ref() == Some(&value) {
                trace!("{} unchanged", self.source.name());
                return;
            }
            *published = Some(value);
            drop(published);
            lock(&self.listener).clone()
        };

        debug!(
            "{} changed (generation {})",
            self.source.name(),
            ticket.generation
        );
        if let Some(listener) = listener {
            listener();
        }
    }
}

/// Recomputes a group of derived sets in parallel, last request wins.
pub struct RefreshController {
    sets: Vec<Arc<dyn ManagedSet>>,
    state: Arc<Mutex<RunState>>,
    debounce: Duration,
}

impl RefreshController {
    /// Creates a controller with no sets.
    ///
    /// With a non-zero `debounce`, each run waits that long before computing
    /// and gives up early if it is superseded in the meantime.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            sets: Vec::new(),
            state: Arc::new(Mutex::new(RunState {
                generation: 0,
                cancel: CancellationToken::new(),
            })),
            debounce,
        }
    }

    /// Creates a controller with the configured debounce.
    #[must_use]
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self::new(config.debounce())
    }

    /// Adds a set to be refreshed by every run.
    #[must_use]
    pub fn with_set<S: DataSource>(mut self, set: Arc<DerivedSet<S>>) -> Self {
        self.sets.push(set);
        self
    }

    /// Generation of the most recent request (0 before the first).
    #[must_use]
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Starts a new refresh run, cancelling any run in flight.
    ///
    /// Does nothing and returns `None` if no set has a listener. Otherwise
    /// returns the handle of the spawned run; callers are free to drop it.
    /// Must be called from within a tokio runtime.
    pub fn request_refresh(&self) -> Option<JoinHandle<()>> {
        if !self.sets.iter().any(|set| set.has_listener()) {
            trace!("Refresh requested with no listeners; skipping");
            return None;
        }

        let ticket = {
            let mut state = lock(&self.state);
            state.cancel.cancel();
            state.generation += 1;
            state.cancel = CancellationToken::new();
            RunTicket {
                generation: state.generation,
                cancel: state.cancel.clone(),
                state: self.state.clone(),
            }
        };
        debug!("Starting refresh generation {}", ticket.generation);

        let sets = self.sets.clone();
        let debounce = self.debounce;
        Some(tokio::spawn(async move {
            if !debounce.is_zero() {
                tokio::select! {
                    () = ticket.cancel.cancelled() => {
                        trace!("Generation {} superseded while debouncing", ticket.generation);
                        return;
                    }
                    () = tokio::time::sleep(debounce) => {}
                }
            }

            let mut runs = JoinSet::new();
            for set in sets {
                let ticket = ticket.clone();
                runs.spawn(async move { set.refresh(ticket).await });
            }
            while let Some(result) = runs.join_next().await {
                if let Err(e) = result {
                    warn!("Refresh task failed: {e}");
                }
            }
        }))
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        lock(&self.state).cancel.cancel();
    }
}
