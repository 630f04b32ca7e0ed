// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Switchyard command-line tool.
//!
//! Exercises the coordination layer from a shell: `detect` runs build-system
//! selection for one or more roots with the effective configuration.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use switchyard::config::Config;
use switchyard::registry::{BuildSystemKind, BuildSystemSelector};
use switchyard::workspace::Workspace;

/// Command-line arguments for Switchyard.
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Coordination layer for multi-backend language servers")]
#[command(version = env!("SWITCHYARD_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Subcommands supported by Switchyard.
#[derive(Subcommand, Debug)]
enum Command {
    /// Select a build system for each workspace root and print the result.
    Detect {
        /// Workspace root directories. Can be specified multiple times.
        /// Defaults to the current directory.
        #[arg(short, long)]
        root: Vec<PathBuf>,

        /// Build-system kind to try first (overrides the config file).
        #[arg(long)]
        prefer: Option<BuildSystemKind>,
    },
}

/// Entry point for the Switchyard binary.
///
/// # Errors
///
/// Returns an error if logging or configuration cannot be set up.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("switchyard=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config).context("Failed to load configuration")?;
    debug!("Effective configuration: {:?}", config);

    match args.command {
        Command::Detect { root, prefer } => run_detect(&config, root, prefer).await,
    }
}

async fn run_detect(
    config: &Config,
    roots: Vec<PathBuf>,
    prefer: Option<BuildSystemKind>,
) -> Result<()> {
    let roots = if roots.is_empty() {
        vec![std::env::current_dir().context("Failed to read current directory")?]
    } else {
        roots
    };
    let preference = prefer.or(config.build_system.preference);
    let selector = BuildSystemSelector::from_config(&config.build_system);

    for root in roots {
        let workspace = Workspace::open(root, &selector, preference).await;
        match workspace.build_system() {
            Some(build_system) => println!(
                "{}\t{}\t{}",
                workspace.root().display(),
                build_system.kind(),
                build_system.label()
            ),
            None => println!("{}\tnone", workspace.root().display()),
        }
    }

    Ok(())
}
