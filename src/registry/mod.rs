// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Build-system kinds, construction and prioritized selection.
pub mod build_system;
/// Per-language provider lists and document ownership.
pub mod language;

pub use build_system::{
    BuildServerFactory, BuildSystem, BuildSystemFactory, BuildSystemKind, BuildSystemSelector,
    CompilationDatabaseFactory, DetectedBuildSystem, PackageManifestFactory,
};
pub use language::{LanguageService, LanguageServiceRegistry, first_non_empty, merge_all};
