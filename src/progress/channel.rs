// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The client side of work-done progress.
//!
//! [`ProgressChannel`] is everything the progress machinery needs from the
//! editor: whether it supports progress at all, an asynchronous handshake to
//! create a token, and fire-and-forget begin/report/end notifications.
//! [`ClientProgressChannel`] implements it on top of LSP messages queued for
//! the transport.

use async_trait::async_trait;
use lsp_types::{
    ClientCapabilities, ProgressParams, ProgressParamsValue, ProgressToken, WorkDoneProgress,
    WorkDoneProgressCreateParams,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::config::ProgressConfig;
use crate::error::ChannelError;
use crate::lsp::{
    NotificationMessage, OutgoingMessage, RequestId, RequestMessage, ResponseMessage,
};

/// Where progress for an activity is reported.
#[async_trait]
pub trait ProgressChannel: Send + Sync + 'static {
    /// Whether the client declared support for server-initiated progress.
    fn supports_progress(&self) -> bool;

    /// Asks the client to create `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client rejects the request, never answers, or
    /// the channel is gone.
    async fn create_progress(&self, token: &ProgressToken) -> Result<(), ChannelError>;

    /// Sends a begin/report/end notification for `token`.
    fn send_progress(&self, token: &ProgressToken, progress: WorkDoneProgress);
}

/// Pending requests awaiting a response, keyed by request id.
type PendingRequests = Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>;

/// Progress channel backed by LSP messages.
///
/// Outgoing messages are pushed onto a queue drained by the transport;
/// responses read by the transport are handed back through
/// [`ClientProgressChannel::handle_response`].
pub struct ClientProgressChannel {
    supports_progress: bool,
    outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    pending: PendingRequests,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl ClientProgressChannel {
    /// Creates a channel for a client with `capabilities`.
    #[must_use]
    pub fn new(
        capabilities: &ClientCapabilities,
        outgoing: mpsc::UnboundedSender<OutgoingMessage>,
        request_timeout: Duration,
    ) -> Self {
        let supports_progress = capabilities
            .window
            .as_ref()
            .and_then(|window| window.work_done_progress)
            .unwrap_or(false);
        debug!("Client work-done progress support: {}", supports_progress);

        Self {
            supports_progress,
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            request_timeout,
        }
    }

    /// Creates a channel using the configured creation timeout.
    #[must_use]
    pub fn from_config(
        capabilities: &ClientCapabilities,
        outgoing: mpsc::UnboundedSender<OutgoingMessage>,
        config: &ProgressConfig,
    ) -> Self {
        Self::new(capabilities, outgoing, config.create_timeout())
    }

    /// Routes a response from the client to the request waiting for it.
    ///
    /// Returns false if no request with that id is pending.
    pub async fn handle_response(&self, response: ResponseMessage) -> bool {
        let Some(id) = response.id.clone() else {
            warn!("Received response without id");
            return false;
        };

        let sender = self.pending.lock().await.remove(&id);
        if let Some(sender) = sender {
            let _ = sender.send(response);
            true
        } else {
            warn!("Received response for unknown request id: {:?}", id);
            false
        }
    }

    /// Sends a request and waits for the response with timeout.
    async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ChannelError> {
        let id = RequestId::String(format!(
            "switchyard-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));

        let request = RequestMessage {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        trace!("Sending request {} ({:?})", method, id);
        if self.outgoing.send(OutgoingMessage::Request(request)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ChannelError::Closed);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ChannelError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ChannelError::TimedOut {
                    method: method.to_string(),
                    secs: self.request_timeout.as_secs(),
                });
            }
        };

        if let Some(error) = response.error {
            return Err(ChannelError::Rejected {
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    /// Queues a notification (no response expected).
    fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), ChannelError> {
        let notification = NotificationMessage {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        self.outgoing
            .send(OutgoingMessage::Notification(notification))
            .map_err(|_| ChannelError::Closed)
    }
}

#[async_trait]
impl ProgressChannel for ClientProgressChannel {
    fn supports_progress(&self) -> bool {
        self.supports_progress
    }

    async fn create_progress(&self, token: &ProgressToken) -> Result<(), ChannelError> {
        let _: serde_json::Value = self
            .request(
                "window/workDoneProgress/create",
                WorkDoneProgressCreateParams {
                    token: token.clone(),
                },
            )
            .await?;
        Ok(())
    }

    fn send_progress(&self, token: &ProgressToken, progress: WorkDoneProgress) {
        let params = ProgressParams {
            token: token.clone(),
            value: ProgressParamsValue::WorkDone(progress),
        };
        if let Err(e) = self.notify("$/progress", params) {
            debug!("Dropping progress notification for {:?}: {e}", token);
        }
    }
}
