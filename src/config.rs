/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::BuildSystemKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Build-system selection settings.
    #[serde(default)]
    pub build_system: BuildSystemConfig,

    /// Derived-data refresh settings.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Client progress settings.
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildSystemConfig {
    /// Kind to try before the fallback order (e.g. "compilation_database")
    #[serde(default)]
    pub preference: Option<BuildSystemKind>,

    /// Kinds tried in order when there is no preference or it fails
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<BuildSystemKind>,
}

impl Default for BuildSystemConfig {
    fn default() -> Self {
        Self {
            preference: None,
            fallback_order: default_fallback_order(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RefreshConfig {
    /// Delay before each refresh run starts computing, in milliseconds (0 disables)
    #[serde(default)]
    pub debounce_ms: u64,
}

impl RefreshConfig {
    /// Debounce interval as a `Duration`.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProgressConfig {
    /// Title of the merged indexing indicator
    #[serde(default = "default_index_title")]
    pub index_title: String,

    /// Seconds to wait for the client to acknowledge a progress token
    #[serde(default = "default_create_timeout")]
    pub create_timeout_secs: u64,
}

impl ProgressConfig {
    /// Creation handshake timeout as a `Duration`.
    #[must_use]
    pub const fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            index_title: default_index_title(),
            create_timeout_secs: default_create_timeout(),
        }
    }
}

fn default_fallback_order() -> Vec<BuildSystemKind> {
    vec![
        BuildSystemKind::BuildServer,
        BuildSystemKind::PackageManifest,
        BuildSystemKind::CompilationDatabase,
    ]
}

fn default_index_title() -> String {
    "Indexing".to_string()
}

const fn default_create_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the merged values do
    /// not deserialize.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("refresh.debounce_ms", 0)?
            .set_default("progress.index_title", default_index_title())?
            .set_default("progress.create_timeout_secs", default_create_timeout())?;

        // 2. Load from user config directory (~/.config/switchyard/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("switchyard").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (SWITCHYARD_REFRESH__DEBOUNCE_MS, etc.)
        builder = builder.add_source(
            config::Environment::with_prefix("SWITCHYARD")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
