// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// JSON-RPC message envelopes.
pub mod protocol;

pub use protocol::{
    NotificationMessage, OutgoingMessage, RequestId, RequestMessage, ResponseError,
    ResponseMessage,
};
