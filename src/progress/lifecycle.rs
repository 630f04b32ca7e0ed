// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Lifecycle of one client-visible progress indicator.
//!
//! A [`ProgressLifecycle`] counts nested `begin`/`end` calls for a named
//! activity and keeps exactly one work-done progress token alive on the
//! client while the count is non-zero. All state lives in an actor task;
//! the handle only queues commands, so calls never block and are applied in
//! the order they were made.
//!
//! Creating a token is a round trip to the client. Its answer comes back
//! through the same queue as every other command, which means a `begin`/`end`
//! pair that completes while the handshake is still in flight is seen in
//! order: when the client finally acknowledges the token, the actor notices
//! nobody needs it anymore and ends it straight away.
//!
//! ```text
//! NoProgress --begin--> Creating --ack, count > 0--> Created --count = 0--> NoProgress
//!                           |  \--ack, count = 0--> NoProgress (end sent)
//!                           \--nack--> CreationFailed (terminal)
//! ```

use lsp_types::{
    NumberOrString, ProgressToken, WorkDoneProgress, WorkDoneProgressBegin, WorkDoneProgressEnd,
    WorkDoneProgressReport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use super::channel::ProgressChannel;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Creation state of an activity's client-side indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// No indicator exists on the client.
    NoProgress,
    /// A create request is in flight.
    Creating,
    /// The indicator is visible.
    Created,
    /// The client refused to create an indicator; no further attempts are made.
    CreationFailed,
}

/// Read-only view of an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySnapshot {
    /// Display title.
    pub title: String,
    /// Current creation state.
    pub state: ActivityState,
    /// Number of unmatched `begin` calls.
    pub active_count: usize,
    /// Latest status message.
    pub message: Option<String>,
    /// Latest percentage.
    pub percentage: Option<u32>,
    /// Token of the current indicator, if one is being created or shown.
    pub token: Option<ProgressToken>,
}

enum Command {
    Begin,
    End,
    Update {
        message: Option<String>,
        percentage: Option<u32>,
    },
    CreationResolved {
        token: ProgressToken,
        succeeded: bool,
    },
    Snapshot(oneshot::Sender<ActivitySnapshot>),
}

/// Handle to a progress activity.
///
/// Dropping the handle stops the activity; a visible indicator is ended.
pub struct ProgressLifecycle {
    title: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl ProgressLifecycle {
    /// Starts an activity titled `title` reporting through `channel`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(title: impl Into<String>, channel: Arc<dyn ProgressChannel>) -> Self {
        let title = title.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let activity = Activity {
            title: title.clone(),
            token: None,
            active_count: 0,
            state: ActivityState::NoProgress,
            message: None,
            percentage: None,
            channel,
            commands: tx.downgrade(),
        };
        tokio::spawn(activity.run(rx));

        Self {
            title,
            commands: tx,
        }
    }

    /// The activity's title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Marks one more piece of work as in progress.
    pub fn begin(&self) {
        self.submit(Command::Begin);
    }

    /// Marks one piece of work as finished.
    ///
    /// Calling this more often than [`Self::begin`] is reported and ignored.
    pub fn end(&self) {
        self.submit(Command::End);
    }

    /// Replaces the status message and percentage shown with the indicator.
    pub fn update(&self, message: Option<String>, percentage: Option<u32>) {
        self.submit(Command::Update {
            message,
            percentage,
        });
    }

    /// Returns the activity's state after every previously queued command.
    pub async fn snapshot(&self) -> Option<ActivitySnapshot> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Snapshot(tx));
        rx.await.ok()
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Progress activity '{}' is no longer running", self.title);
        }
    }
}

/// Actor-owned state of one activity.
struct Activity {
    title: String,
    token: Option<ProgressToken>,
    active_count: usize,
    state: ActivityState,
    message: Option<String>,
    percentage: Option<u32>,
    channel: Arc<dyn ProgressChannel>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Activity {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Begin => self.begin(),
                Command::End => self.end(),
                Command::Update {
                    message,
                    percentage,
                } => self.update(message, percentage),
                Command::CreationResolved { token, succeeded } => {
                    self.creation_resolved(&token, succeeded);
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        if self.state == ActivityState::Created {
            debug!("Ending progress '{}' on shutdown", self.title);
            self.send_end();
        }
    }

    fn begin(&mut self) {
        self.active_count += 1;
        trace!("'{}' begin (count {})", self.title, self.active_count);

        if self.channel.supports_progress() && self.state == ActivityState::NoProgress {
            self.start_creation();
        }
    }

    fn end(&mut self) {
        if self.active_count == 0 {
            error!("Unbalanced end() for progress '{}'; ignoring", self.title);
            return;
        }
        self.active_count -= 1;
        trace!("'{}' end (count {})", self.title, self.active_count);

        if !self.channel.supports_progress() || self.state != ActivityState::Created {
            return;
        }
        if self.active_count == 0 {
            self.send_end();
        } else {
            self.send_report();
        }
    }

    fn update(&mut self, message: Option<String>, percentage: Option<u32>) {
        if self.message == message && self.percentage == percentage {
            return;
        }
        self.message = message;
        self.percentage = percentage;

        if self.channel.supports_progress() && self.state == ActivityState::Created {
            self.send_report();
        }
    }

    fn start_creation(&mut self) {
        let token = mint_token(&self.title);
        self.token = Some(token.clone());
        self.state = ActivityState::Creating;

        let channel = self.channel.clone();
        let commands = self.commands.clone();
        let title = self.title.clone();
        tokio::spawn(async move {
            let succeeded = match channel.create_progress(&token).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Client could not create progress for '{title}': {e}");
                    false
                }
            };
            let resolved = Command::CreationResolved { token, succeeded };
            let undelivered = match commands.upgrade() {
                Some(commands) => commands.send(resolved).err().map(|e| e.0),
                None => Some(resolved),
            };
            // The activity is gone, but the client now holds a live token
            if let Some(Command::CreationResolved {
                token,
                succeeded: true,
            }) = undelivered
            {
                debug!("Ending progress '{title}' acknowledged after shutdown");
                channel.send_progress(
                    &token,
                    WorkDoneProgress::End(WorkDoneProgressEnd { message: None }),
                );
            }
        });
    }

    fn creation_resolved(&mut self, token: &ProgressToken, succeeded: bool) {
        if self.state != ActivityState::Creating || self.token.as_ref() != Some(token) {
            debug!("Ignoring stale creation result for '{}'", self.title);
            return;
        }

        if !succeeded {
            self.state = ActivityState::CreationFailed;
            self.token = None;
            return;
        }

        if self.active_count > 0 {
            self.state = ActivityState::Created;
            self.channel.send_progress(
                token,
                WorkDoneProgress::Begin(WorkDoneProgressBegin {
                    title: self.title.clone(),
                    cancellable: Some(false),
                    message: self.message.clone(),
                    percentage: self.percentage,
                }),
            );
        } else {
            // The client now holds a token nobody needs; close it.
            debug!("'{}' finished before the client acknowledged it", self.title);
            self.send_end();
        }
    }

    fn send_report(&self) {
        if let Some(token) = &self.token {
            self.channel.send_progress(
                token,
                WorkDoneProgress::Report(WorkDoneProgressReport {
                    cancellable: Some(false),
                    message: self.message.clone(),
                    percentage: self.percentage,
                }),
            );
        }
    }

    fn send_end(&mut self) {
        if let Some(token) = self.token.take() {
            self.channel.send_progress(
                &token,
                WorkDoneProgress::End(WorkDoneProgressEnd { message: None }),
            );
        }
        self.state = ActivityState::NoProgress;
    }

    fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            title: self.title.clone(),
            state: self.state,
            active_count: self.active_count,
            message: self.message.clone(),
            percentage: self.percentage,
            token: self.token.clone(),
        }
    }
}

/// Creates a token that has never been sent to the client.
fn mint_token(title: &str) -> ProgressToken {
    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let n = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    NumberOrString::String(format!("switchyard-{slug}-{n}"))
}
