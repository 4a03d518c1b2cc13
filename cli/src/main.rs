//! `ci-units` - keeps CI unit registry files in sync with their configs.
//!
//! ## Commands
//!
//! - `check`: verify registry files, orphans and the root units regex
//! - `pipelines`: print the resolved root pipeline and every triggered pipeline

mod telemetry;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ci_units::check::FIX_HINT;
use ci_units::layout::{Layout, PROJECT_ROOT_ENV};
use ci_units::yaml::to_yaml_string;
use ci_units::{Checker, PipelineLoader};

#[derive(Parser)]
#[command(name = "ci-units")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI unit registry checker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that generated registry files and the root regex are up to date
    Check {
        /// Rewrite out of date files instead of reporting them
        #[arg(long)]
        fix: bool,
    },

    /// Print the resolved root pipeline and every pipeline it triggers
    Pipelines {
        /// Only list pipeline ids
        #[arg(long)]
        list: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_tracing();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let layout = Layout::new(project_root()?);
    log::debug!("Project root: {}", layout.project_root().display());

    match cli.command {
        Commands::Check { fix } => Ok(cmd_check(layout, fix)),
        Commands::Pipelines { list } => cmd_pipelines(&layout, list),
    }
}

fn project_root() -> Result<PathBuf> {
    match env::var_os(PROJECT_ROOT_ENV) {
        Some(root) if !root.is_empty() => Ok(PathBuf::from(root)),
        _ => env::current_dir().context("Failed to determine the current directory"),
    }
}

fn cmd_check(layout: Layout, fix: bool) -> ExitCode {
    let report = Checker::new(layout, fix).run();

    for finding in &report.findings {
        eprintln!("{}", finding);
    }
    if report.needs_fix_hint() {
        eprintln!("{}", FIX_HINT);
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn cmd_pipelines(layout: &Layout, list: bool) -> Result<ExitCode> {
    let loader = PipelineLoader::new(layout.project_root());
    let root = layout.root_pipeline();
    let pipelines = loader
        .load_all(&root)
        .with_context(|| format!("Failed to load {}", root.display()))?;

    for (id, config) in &pipelines.configs {
        if list {
            println!("{}", id);
        } else {
            print!("{}", to_yaml_string(config, Some(id.as_str()))?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
