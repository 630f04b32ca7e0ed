// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for configuration loading and merging.
//!
//! Verifies that Switchyard layers the user config directory, an explicit
//! `--config` file, environment variables and CLI flags in priority order.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;

/// A project that every build-system kind can open.
fn project_with_every_kind() -> Result<tempfile::TempDir> {
    let project = tempfile::tempdir()?;
    fs::write(
        project.path().join("buildServer.json"),
        r#"{"name": "bsp", "argv": ["bsp-server"]}"#,
    )?;
    fs::write(project.path().join("Package.swift"), "import PackageDescription\n")?;
    fs::write(project.path().join("compile_flags.txt"), "-Wall\n")?;
    Ok(project)
}

fn switchyard(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_switchyard"));
    // Isolate from user-level config
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd.env_remove("SWITCHYARD_BUILD_SYSTEM__PREFERENCE");
    cmd
}

/// Runs `detect` and returns the selected kind for the single root.
fn selected_kind(cmd: &mut Command, root: &Path) -> Result<String> {
    let output = cmd
        .arg("detect")
        .arg("--root")
        .arg(root)
        .output()
        .context("Failed to run switchyard")?;
    assert!(output.status.success(), "detect failed: {output:?}");

    let stdout = String::from_utf8(output.stdout).context("stdout is not UTF-8")?;
    let line = stdout.lines().next().context("no output")?;
    let kind = line.split('\t').nth(1).context("missing kind column")?;
    Ok(kind.to_string())
}

#[test]
fn test_defaults_without_config() -> Result<()> {
    let project = project_with_every_kind()?;
    let home = tempfile::tempdir()?;

    let kind = selected_kind(&mut switchyard(home.path()), project.path())?;
    assert_eq!(kind, "build_server");
    Ok(())
}

#[test]
fn test_user_config_directory() -> Result<()> {
    let project = project_with_every_kind()?;
    let home = tempfile::tempdir()?;
    fs::create_dir(home.path().join("switchyard"))?;
    fs::write(
        home.path().join("switchyard").join("config.toml"),
        "[build_system]\nfallback_order = [\"compilation_database\"]\n",
    )?;

    let kind = selected_kind(&mut switchyard(home.path()), project.path())?;
    assert_eq!(kind, "compilation_database");
    Ok(())
}

#[test]
fn test_explicit_file_overrides_user_config() -> Result<()> {
    let project = project_with_every_kind()?;
    let home = tempfile::tempdir()?;
    fs::create_dir(home.path().join("switchyard"))?;
    fs::write(
        home.path().join("switchyard").join("config.toml"),
        "[build_system]\npreference = \"compilation_database\"\n",
    )?;
    let explicit = home.path().join("explicit.toml");
    fs::write(&explicit, "[build_system]\npreference = \"package_manifest\"\n")?;

    let mut cmd = switchyard(home.path());
    cmd.arg("--config").arg(&explicit);
    let kind = selected_kind(&mut cmd, project.path())?;
    assert_eq!(kind, "package_manifest");
    Ok(())
}

#[test]
fn test_environment_overrides_file_and_cli_overrides_environment() -> Result<()> {
    let project = project_with_every_kind()?;
    let home = tempfile::tempdir()?;
    let explicit = home.path().join("explicit.toml");
    fs::write(&explicit, "[build_system]\npreference = \"package_manifest\"\n")?;

    let mut cmd = switchyard(home.path());
    cmd.arg("--config").arg(&explicit);
    cmd.env("SWITCHYARD_BUILD_SYSTEM__PREFERENCE", "compilation_database");
    let kind = selected_kind(&mut cmd, project.path())?;
    assert_eq!(kind, "compilation_database");

    let mut cmd = switchyard(home.path());
    cmd.env("SWITCHYARD_BUILD_SYSTEM__PREFERENCE", "compilation_database");
    cmd.args(["detect", "--prefer", "build_server", "--root"]);
    cmd.arg(project.path());
    let output = cmd.output().context("Failed to run switchyard")?;
    let stdout = String::from_utf8(output.stdout).context("stdout is not UTF-8")?;
    assert!(stdout.contains("\tbuild_server\t"), "got: {stdout}");
    Ok(())
}

#[test]
fn test_invalid_config_fails() -> Result<()> {
    let project = tempfile::tempdir()?;
    let home = tempfile::tempdir()?;
    let explicit = home.path().join("broken.toml");
    fs::write(&explicit, "[build_system]\npreference = \"makefile\"\n")?;

    let output = switchyard(home.path())
        .arg("--config")
        .arg(&explicit)
        .arg("detect")
        .arg("--root")
        .arg(project.path())
        .output()
        .context("Failed to run switchyard")?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to load configuration"),
        "got: {stderr}"
    );
    Ok(())
}
