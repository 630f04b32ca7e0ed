// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Typed errors raised by collaborators at the edge of the coordination layer.
//!
//! None of these escape to the client: the owning component turns them into
//! a state transition (creation failed, next build-system kind) and a log line.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a request sent over the client progress channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The outgoing queue or the pending response slot was dropped.
    #[error("progress channel closed")]
    Closed,
    /// The client did not answer within the configured timeout.
    #[error("request '{method}' timed out after {secs}s")]
    TimedOut {
        /// Method of the request that timed out.
        method: String,
        /// Timeout that elapsed, in seconds.
        secs: u64,
    },
    /// The client answered with a JSON-RPC error.
    #[error("client rejected request ({code}): {message}")]
    Rejected {
        /// JSON-RPC error code.
        code: i64,
        /// Error message supplied by the client.
        message: String,
    },
    /// A payload could not be encoded or decoded.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure to construct a build system for a workspace root.
#[derive(Debug, Error)]
pub enum BuildSystemError {
    /// The root does not exist or is not a local directory.
    #[error("{} is not a local directory", .0.display())]
    NotADirectory(PathBuf),
    /// No description file of this kind exists under the root.
    #[error("no {kind} description under {}", root.display())]
    MissingDescription {
        /// Human-readable kind name.
        kind: &'static str,
        /// Root that was searched.
        root: PathBuf,
    },
    /// A description file exists but could not be understood.
    #[error("malformed build description {}: {reason}", path.display())]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Reading a description file failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
