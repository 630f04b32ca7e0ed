// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Test doubles shared by the progress tests.

use anyhow::{Result, bail};
use async_trait::async_trait;
use lsp_types::{NumberOrString, ProgressToken, WorkDoneProgress};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use super::channel::ProgressChannel;
use super::lifecycle::{ActivitySnapshot, ActivityState, ProgressLifecycle};
use crate::error::ChannelError;

/// How a [`RecordingChannel`] answers create requests.
#[derive(Debug, Clone, Copy)]
pub enum Creation {
    Succeed,
    Fail,
    /// Each create waits until the test calls [`RecordingChannel::resolve_next`].
    Gated,
}

/// What a [`RecordingChannel`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Create(String),
    Begin {
        token: String,
        title: String,
        message: Option<String>,
        percentage: Option<u32>,
    },
    Report {
        token: String,
        message: Option<String>,
        percentage: Option<u32>,
    },
    End(String),
}

pub struct RecordingChannel {
    supported: bool,
    creation: Creation,
    sent: Mutex<Vec<Sent>>,
    gates: Mutex<VecDeque<oneshot::Sender<bool>>>,
}

impl RecordingChannel {
    pub fn new(supported: bool, creation: Creation) -> Arc<Self> {
        Arc::new(Self {
            supported,
            creation,
            sent: Mutex::new(Vec::new()),
            gates: Mutex::new(VecDeque::new()),
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn created_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Create(_)))
            .count()
    }

    pub fn begin_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Begin { .. }))
            .count()
    }

    /// Answers the oldest gated create request.
    pub async fn resolve_next(&self, succeeded: bool) -> Result<()> {
        for _ in 0..400 {
            let gate = self
                .gates
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(gate) = gate {
                let _ = gate.send(succeeded);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bail!("no create request arrived")
    }

    fn record(&self, sent: Sent) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sent);
    }
}

fn token_text(token: &ProgressToken) -> String {
    match token {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s.clone(),
    }
}

#[async_trait]
impl ProgressChannel for RecordingChannel {
    fn supports_progress(&self) -> bool {
        self.supported
    }

    async fn create_progress(&self, token: &ProgressToken) -> Result<(), ChannelError> {
        self.record(Sent::Create(token_text(token)));
        let succeeded = match self.creation {
            Creation::Succeed => true,
            Creation::Fail => false,
            Creation::Gated => {
                let (tx, rx) = oneshot::channel();
                self.gates
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(tx);
                rx.await.map_err(|_| ChannelError::Closed)?
            }
        };
        if succeeded {
            Ok(())
        } else {
            Err(ChannelError::Rejected {
                code: -32603,
                message: "declined".to_string(),
            })
        }
    }

    fn send_progress(&self, token: &ProgressToken, progress: WorkDoneProgress) {
        let token = token_text(token);
        self.record(match progress {
            WorkDoneProgress::Begin(begin) => Sent::Begin {
                token,
                title: begin.title,
                message: begin.message,
                percentage: begin.percentage,
            },
            WorkDoneProgress::Report(report) => Sent::Report {
                token,
                message: report.message,
                percentage: report.percentage,
            },
            WorkDoneProgress::End(_) => Sent::End(token),
        });
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> Result<()> {
    for _ in 0..400 {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("condition not reached in time")
}

/// Polls `lifecycle` until it reaches `state`.
pub async fn wait_for_state(
    lifecycle: &ProgressLifecycle,
    state: ActivityState,
) -> Result<ActivitySnapshot> {
    for _ in 0..400 {
        if let Some(snapshot) = lifecycle.snapshot().await
            && snapshot.state == state
        {
            return Ok(snapshot);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("activity never reached {state:?}")
}
