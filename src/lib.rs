// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Switchyard is the coordination layer of a language server that fronts
//! several backends at once.
//!
//! It decides which backend owns a document and which build system describes
//! a workspace, whether previously computed results are still valid, when
//! derived data must be recomputed, and what the editor is told about
//! background progress. The analysis engines, the index store and the wire
//! transport are collaborators behind traits.

/// Layered configuration.
pub mod config;
/// Typed errors for collaborator failures.
pub mod error;
/// LSP message envelopes.
pub mod lsp;
/// Work-done progress reporting.
pub mod progress;
/// Cancellable, debounced recomputation of derived data.
pub mod refresh;
/// Language-service and build-system selection.
pub mod registry;
/// Per-request staleness checks.
pub mod staleness;
/// Workspace roots and their build systems.
pub mod workspace;
