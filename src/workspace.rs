// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A workspace root and what the server learned about it when it opened.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::registry::{BuildSystem, BuildSystemKind, BuildSystemSelector};

/// An open workspace.
///
/// The build system is chosen once, when the workspace is opened, and stays
/// fixed for the session. A workspace without one still serves requests,
/// just without build intelligence.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    build_system: Option<Arc<dyn BuildSystem>>,
}

impl Workspace {
    /// Opens the workspace at `root`, selecting its build system.
    pub async fn open(
        root: impl Into<PathBuf>,
        selector: &BuildSystemSelector,
        preference: Option<BuildSystemKind>,
    ) -> Self {
        let root = root.into();
        let root = match tokio::fs::canonicalize(&root).await {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("Could not canonicalize {}: {e}", root.display());
                root
            }
        };

        let build_system = selector.select(&root, preference).await;
        info!(
            "Opened workspace {} ({})",
            root.display(),
            build_system
                .as_ref()
                .map_or("no build system", |bs| bs.kind().display_name())
        );

        Self { root, build_system }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The selected build system, if any kind could be opened.
    #[must_use]
    pub fn build_system(&self) -> Option<&Arc<dyn BuildSystem>> {
        self.build_system.as_ref()
    }

    /// Whether `path` lies under this workspace's root.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}
