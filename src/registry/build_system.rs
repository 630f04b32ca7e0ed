// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Build-system selection for a workspace root.
//!
//! Every kind of build description has an asynchronous factory that either
//! produces a [`BuildSystem`] for a root or fails. Selection tries the
//! configured preference first and then a fixed fallback order; a failing
//! kind is logged and skipped. If nothing works the workspace runs without
//! build intelligence rather than refusing to start.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BuildSystemConfig;
use crate::error::BuildSystemError;

/// The kinds of build description the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystemKind {
    /// An external build server described by `buildServer.json` or `.bsp/*.json`.
    BuildServer,
    /// `compile_commands.json` or `compile_flags.txt`.
    CompilationDatabase,
    /// A package manifest (`Package.swift`) at the root.
    PackageManifest,
}

impl BuildSystemKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 3] = [
        Self::BuildServer,
        Self::CompilationDatabase,
        Self::PackageManifest,
    ];

    /// Config/CLI spelling of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildServer => "build_server",
            Self::CompilationDatabase => "compilation_database",
            Self::PackageManifest => "package_manifest",
        }
    }

    /// Human-readable name used in logs and errors.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::BuildServer => "build server",
            Self::CompilationDatabase => "compilation database",
            Self::PackageManifest => "package manifest",
        }
    }
}

impl fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildSystemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown build system kind '{s}' (expected one of: build_server, compilation_database, package_manifest)"
                )
            })
    }
}

/// A usable build system for one workspace root.
pub trait BuildSystem: Send + Sync + fmt::Debug {
    /// Which kind of description this build system was constructed from.
    fn kind(&self) -> BuildSystemKind;
    /// The workspace root it serves.
    fn project_root(&self) -> &Path;
    /// The description file that was found.
    fn description_path(&self) -> &Path;
    /// Short summary for logs and CLI output.
    fn label(&self) -> &str;
}

/// Asynchronous constructor for one build-system kind.
#[async_trait]
pub trait BuildSystemFactory: Send + Sync {
    /// The kind this factory constructs.
    fn kind(&self) -> BuildSystemKind;

    /// Attempts to construct a build system for `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if no description of this kind exists under `root`
    /// or if the description cannot be read or understood.
    async fn construct(&self, root: &Path) -> Result<Arc<dyn BuildSystem>, BuildSystemError>;
}

/// A build system found by one of the built-in factories.
#[derive(Debug, Clone)]
pub struct DetectedBuildSystem {
    kind: BuildSystemKind,
    root: PathBuf,
    description: PathBuf,
    label: String,
}

impl BuildSystem for DetectedBuildSystem {
    fn kind(&self) -> BuildSystemKind {
        self.kind
    }

    fn project_root(&self) -> &Path {
        &self.root
    }

    fn description_path(&self) -> &Path {
        &self.description
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Reads a description file, mapping "not found" to `None`.
async fn read_description(path: &Path) -> Result<Option<String>, BuildSystemError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(BuildSystemError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn detected(
    kind: BuildSystemKind,
    root: &Path,
    description: PathBuf,
    label: String,
) -> Arc<dyn BuildSystem> {
    Arc::new(DetectedBuildSystem {
        kind,
        root: root.to_path_buf(),
        description,
        label,
    })
}

/// Connection details of an external build server.
#[derive(Debug, Deserialize)]
struct BuildServerConnection {
    name: String,
    argv: Vec<String>,
}

/// Finds `buildServer.json` at the root or a connection file in `.bsp/`.
pub struct BuildServerFactory;

impl BuildServerFactory {
    async fn candidates(root: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![root.join("buildServer.json")];

        let mut bsp_files = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(root.join(".bsp")).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    bsp_files.push(path);
                }
            }
        }
        bsp_files.sort();
        candidates.extend(bsp_files);
        candidates
    }
}

#[async_trait]
impl BuildSystemFactory for BuildServerFactory {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::BuildServer
    }

    async fn construct(&self, root: &Path) -> Result<Arc<dyn BuildSystem>, BuildSystemError> {
        // A broken candidate must not hide a usable one further down the list
        let mut first_malformed = None;
        for path in Self::candidates(root).await {
            let Some(contents) = read_description(&path).await? else {
                continue;
            };
            let reason = match serde_json::from_str::<BuildServerConnection>(&contents) {
                Ok(connection) if !connection.argv.is_empty() => {
                    debug!(
                        "Build server '{}' launches {}",
                        connection.name,
                        connection.argv.join(" ")
                    );
                    return Ok(detected(self.kind(), root, path, connection.name));
                }
                Ok(_) => "argv is empty".to_string(),
                Err(e) => e.to_string(),
            };
            warn!("Skipping build server description {}: {reason}", path.display());
            if first_malformed.is_none() {
                first_malformed = Some(BuildSystemError::Malformed { path, reason });
            }
        }

        if let Some(malformed) = first_malformed {
            return Err(malformed);
        }
        Err(BuildSystemError::MissingDescription {
            kind: self.kind().display_name(),
            root: root.to_path_buf(),
        })
    }
}

/// One entry of `compile_commands.json`; other fields are ignored.
#[derive(Debug, Deserialize)]
struct CompileCommand {
    #[serde(rename = "directory")]
    _directory: String,
    #[serde(rename = "file")]
    _file: String,
}

/// Finds `compile_commands.json` or `compile_flags.txt` at the root.
pub struct CompilationDatabaseFactory;

#[async_trait]
impl BuildSystemFactory for CompilationDatabaseFactory {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::CompilationDatabase
    }

    async fn construct(&self, root: &Path) -> Result<Arc<dyn BuildSystem>, BuildSystemError> {
        let json_path = root.join("compile_commands.json");
        if let Some(contents) = read_description(&json_path).await? {
            let commands: Vec<CompileCommand> =
                serde_json::from_str(&contents).map_err(|e| BuildSystemError::Malformed {
                    path: json_path.clone(),
                    reason: e.to_string(),
                })?;
            let label = format!("{} compile commands", commands.len());
            return Ok(detected(self.kind(), root, json_path, label));
        }

        let flags_path = root.join("compile_flags.txt");
        if let Some(contents) = read_description(&flags_path).await? {
            let flags = contents.lines().filter(|l| !l.trim().is_empty()).count();
            let label = format!("{flags} fixed flags");
            return Ok(detected(self.kind(), root, flags_path, label));
        }

        Err(BuildSystemError::MissingDescription {
            kind: self.kind().display_name(),
            root: root.to_path_buf(),
        })
    }
}

/// Finds a `Package.swift` manifest at the root.
pub struct PackageManifestFactory;

#[async_trait]
impl BuildSystemFactory for PackageManifestFactory {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::PackageManifest
    }

    async fn construct(&self, root: &Path) -> Result<Arc<dyn BuildSystem>, BuildSystemError> {
        let manifest = root.join("Package.swift");
        let Some(contents) = read_description(&manifest).await? else {
            return Err(BuildSystemError::MissingDescription {
                kind: self.kind().display_name(),
                root: root.to_path_buf(),
            });
        };
        if contents.trim().is_empty() {
            return Err(BuildSystemError::Malformed {
                path: manifest,
                reason: "manifest is empty".to_string(),
            });
        }
        Ok(detected(
            self.kind(),
            root,
            manifest,
            "Package.swift".to_string(),
        ))
    }
}

/// Chooses a build system for a root by prioritized construction and fallback.
pub struct BuildSystemSelector {
    factories: HashMap<BuildSystemKind, Arc<dyn BuildSystemFactory>>,
    fallback_order: Vec<BuildSystemKind>,
}

impl BuildSystemSelector {
    /// Creates a selector over `factories`, trying kinds in `fallback_order`
    /// when there is no preference or the preference fails.
    ///
    /// A later factory for the same kind replaces an earlier one.
    #[must_use]
    pub fn new(
        factories: Vec<Arc<dyn BuildSystemFactory>>,
        fallback_order: Vec<BuildSystemKind>,
    ) -> Self {
        let factories = factories
            .into_iter()
            .map(|factory| (factory.kind(), factory))
            .collect();
        Self {
            factories,
            fallback_order,
        }
    }

    /// Creates a selector over the built-in factories.
    #[must_use]
    pub fn builtin(fallback_order: Vec<BuildSystemKind>) -> Self {
        Self::new(
            vec![
                Arc::new(BuildServerFactory),
                Arc::new(CompilationDatabaseFactory),
                Arc::new(PackageManifestFactory),
            ],
            fallback_order,
        )
    }

    /// Creates a selector over the built-in factories using the configured order.
    #[must_use]
    pub fn from_config(config: &BuildSystemConfig) -> Self {
        Self::builtin(config.fallback_order.clone())
    }

    /// The kinds tried after the preference, in order.
    #[must_use]
    pub fn fallback_order(&self) -> &[BuildSystemKind] {
        &self.fallback_order
    }

    /// Selects a build system for `root`.
    ///
    /// Tries `preference` first, then every kind in the fallback order that
    /// has not been tried yet. Returns `None` if `root` is not a local
    /// directory or every kind fails.
    pub async fn select(
        &self,
        root: &Path,
        preference: Option<BuildSystemKind>,
    ) -> Option<Arc<dyn BuildSystem>> {
        match tokio::fs::metadata(root).await {
            Ok(metadata) if metadata.is_dir() => {}
            _ => {
                warn!(
                    "{}; running without build intelligence",
                    BuildSystemError::NotADirectory(root.to_path_buf())
                );
                return None;
            }
        }

        let mut attempted = Vec::with_capacity(self.fallback_order.len() + 1);
        let order = preference.into_iter().chain(self.fallback_order.iter().copied());

        for kind in order {
            if attempted.contains(&kind) {
                continue;
            }
            attempted.push(kind);

            let Some(factory) = self.factories.get(&kind) else {
                debug!("No factory registered for {} build systems", kind);
                continue;
            };

            match factory.construct(root).await {
                Ok(build_system) => {
                    info!(
                        "Using {} for {} ({})",
                        kind.display_name(),
                        root.display(),
                        build_system.label()
                    );
                    return Some(build_system);
                }
                Err(e @ BuildSystemError::MissingDescription { .. }) => {
                    debug!("{e}");
                }
                Err(e) => {
                    warn!(
                        "Could not open {} for {}: {e}",
                        kind.display_name(),
                        root.display()
                    );
                }
            }
        }

        warn!(
            "No build system found for {}; running without build intelligence",
            root.display()
        );
        None
    }
}
