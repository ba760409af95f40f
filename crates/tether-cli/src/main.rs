//! Tether - keeps an installation root in line with its config bundle
//!
//! Usage:
//!   tether status     # Compare the installed config against tether.toml
//!   tether update     # Install the configured bundle and core
//!   tether inspect    # Show what the installation root holds
//!   tether launchers  # List launchers shipped by the installed config
//!   tether launch ... # Launch software against the installation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_core::config::ConfigStore;
use tether_core::context::AppContext;
use tether_core::engine::{Inspection, UpdateOutcome};
use tether_core::launcher::{LauncherRegistry, SoftwareLauncher};
use tether_core::layout::InstallLayout;
use tether_core::types::ConfigStatus;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Versioned config bundle deployment", long_about = None)]
struct Cli {
    /// Path to tether.toml (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the installed config matches tether.toml
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Install the configured bundle and core if they are out of date
    Update {
        /// Update even when the installation is up to date
        #[arg(long)]
        force: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show metadata, marker, hashes and backups of the installation root
    Inspect {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List launchers shipped by the installed config
    Launchers {
        /// Also scan for installed software versions
        #[arg(long)]
        scan: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Launch software through one of the installed launchers
    Launch {
        /// Launcher name
        target: String,

        /// Software version (defaults to the first one found)
        #[arg(long)]
        version: Option<String>,

        /// File to open once the software is up
        #[arg(long)]
        file: Option<PathBuf>,

        /// Installation root (skips loading tether.toml)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Arguments passed to the software
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only report problems (non-zero exit if any)
    Quiet,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=info,tether_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_file = cli.config_file;

    match cli.command {
        Commands::Status { format } => run_status(config_file, format),
        Commands::Update { force, format } => run_update(config_file, force, format),
        Commands::Inspect { format } => run_inspect(config_file, format),
        Commands::Launchers { scan, format } => run_launchers(config_file, scan, format),
        Commands::Launch {
            target,
            version,
            file,
            root,
            args,
        } => run_launch(config_file, root, &target, version, file, &args),
    }
}

fn load_context(config_file: Option<PathBuf>) -> Result<AppContext> {
    let store = match config_file {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default()?,
    };
    AppContext::from_store(&store)
}

fn styled_status(status: ConfigStatus) -> String {
    let label = status.to_string();
    match status {
        ConfigStatus::UpToDate => style(label).green().to_string(),
        ConfigStatus::Missing | ConfigStatus::Different => style(label).yellow().to_string(),
        ConfigStatus::Invalid => style(label).red().to_string(),
    }
}

fn run_status(config_file: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let ctx = load_context(config_file)?;
    let engine = ctx.engine()?;
    let status = engine.status();

    match format {
        OutputFormat::Table => {
            println!("Root:   {}", ctx.root().display());
            println!("Config: {}", engine.spec().config().uri());
            println!("Status: {}", styled_status(status));
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "root": ctx.root(),
                "config": engine.spec().config().uri(),
                "status": status,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {
            if status.needs_update() {
                eprintln!("{}: {}", ctx.root().display(), status);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn run_update(config_file: Option<PathBuf>, force: bool, format: OutputFormat) -> Result<()> {
    let ctx = load_context(config_file)?;
    let mut engine = ctx.engine()?;

    let status = engine.status();
    if !force && !status.needs_update() {
        match format {
            OutputFormat::Table => {
                println!("{} is {}", ctx.root().display(), styled_status(status))
            }
            OutputFormat::Json => {
                let output = serde_json::json!({ "outcome": "up_to_date" });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Quiet => {}
        }
        return Ok(());
    }

    let outcome = engine.update();
    match format {
        OutputFormat::Table => print_outcome(&outcome),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?)
        }
        OutputFormat::Quiet => {
            if !outcome.is_updated() {
                eprintln!("{}", outcome);
            }
        }
    }

    outcome.into_result(ctx.root())?;
    Ok(())
}

fn print_outcome(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Updated(report) => {
            println!("{} {}", style("Updated").green().bold(), report.config_uri);
            println!("  core: {} ({})", report.core_uri, report.core_source);
        }
        UpdateOutcome::RecoveredToPrevious {
            error,
            stowed,
            backup,
        } => {
            println!(
                "{} previous installation restored",
                style("Update failed:").yellow().bold()
            );
            println!("  error:  {:#}", error);
            println!("  backup: {}", backup);
            println!("  failed install kept at: {}", stowed);
        }
        UpdateOutcome::Unrecoverable { stowed, backup, .. } => {
            println!("{}", style("Update failed, installation left unusable").red().bold());
            if let Some(stowed) = stowed {
                println!("  failed install kept at: {}", stowed);
            }
            if let Some(backup) = backup {
                println!("  previous install: {}", backup);
            }
        }
        UpdateOutcome::BackupFailed { .. } => {
            println!("{}", style("Backup failed, nothing was changed").red().bold());
        }
    }
}

fn outcome_json(outcome: &UpdateOutcome) -> serde_json::Value {
    let paths = |p: &tether_core::writer::BackupPaths| {
        serde_json::json!({ "config": p.config, "core": p.core })
    };
    match outcome {
        UpdateOutcome::Updated(report) => serde_json::json!({
            "outcome": "updated",
            "report": report,
        }),
        UpdateOutcome::RecoveredToPrevious {
            error,
            stowed,
            backup,
        } => serde_json::json!({
            "outcome": "recovered_to_previous",
            "error": format!("{:#}", error),
            "stowed": paths(stowed),
            "backup": paths(backup),
        }),
        UpdateOutcome::Unrecoverable {
            error,
            stowed,
            backup,
        } => serde_json::json!({
            "outcome": "unrecoverable",
            "error": format!("{:#}", error),
            "stowed": stowed.as_ref().map(paths),
            "backup": backup.as_ref().map(paths),
        }),
        UpdateOutcome::BackupFailed { error } => serde_json::json!({
            "outcome": "backup_failed",
            "error": format!("{:#}", error),
        }),
    }
}

fn run_inspect(config_file: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let ctx = load_context(config_file)?;
    let inspection = ctx.engine()?.inspect();

    match format {
        OutputFormat::Table => print_inspection(&inspection),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inspection)?),
        OutputFormat::Quiet => {
            if inspection.status.needs_update() || inspection.marker.is_some() {
                eprintln!("{}: {}", inspection.root.display(), inspection.status);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn print_inspection(inspection: &Inspection) {
    println!("Root:    {}", inspection.root.display());
    println!("Status:  {}", styled_status(inspection.status));
    match &inspection.metadata {
        Some(metadata) => {
            println!("Config:  {}", metadata.config_descriptor);
            if let Some(core) = &metadata.core_descriptor {
                println!("Core:    {}", core);
            }
            println!("Generation: {}", metadata.deploy_generation);
        }
        None => println!("Config:  -"),
    }
    if let Some(marker) = &inspection.marker {
        println!(
            "{} update of {} by pid {} started {}",
            style("Interrupted:").red(),
            marker.config_uri,
            marker.pid,
            marker.started_at
        );
    }
    let hash = |h: &Option<String>| h.clone().unwrap_or_else(|| "-".to_string());
    println!("Config hash: {}", hash(&inspection.config_hash));
    println!("Core hash:   {}", hash(&inspection.core_hash));
    if !inspection.backups.is_empty() {
        println!();
        println!("Backups ({}):", inspection.backups.len());
        for backup in &inspection.backups {
            println!("  {}", backup.display());
        }
    }
}

fn run_launchers(config_file: Option<PathBuf>, scan: bool, format: OutputFormat) -> Result<()> {
    let ctx = load_context(config_file)?;
    let registry = ctx.launcher_registry()?;

    let mut entries = Vec::new();
    for launcher in registry.all() {
        let versions = if scan {
            launcher.scan_software(None)?
        } else {
            Vec::new()
        };
        entries.push((launcher.as_ref(), versions));
    }

    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No launchers in {}", ctx.layout().launchers_dir().display());
            }
            for (launcher, versions) in &entries {
                println!("{} ({})", style(launcher.display_name()).bold(), launcher.name());
                for version in versions {
                    println!("  {:<10} {}", version.version, version.path.display());
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = entries
                .iter()
                .map(|(launcher, versions)| {
                    serde_json::json!({
                        "name": launcher.name(),
                        "display_name": launcher.display_name(),
                        "versions": versions,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

fn run_launch(
    config_file: Option<PathBuf>,
    root: Option<PathBuf>,
    target: &str,
    version: Option<String>,
    file: Option<PathBuf>,
    args: &[String],
) -> Result<()> {
    let root = match root {
        Some(root) => root,
        None => load_context(config_file)?.root().to_path_buf(),
    };
    let launchers_dir = InstallLayout::new(root.clone()).launchers_dir();
    let registry = LauncherRegistry::discover(&launchers_dir, &root)?;
    let launcher = registry.get(target).ok_or_else(|| {
        anyhow::anyhow!(
            "No launcher named '{}' (available: {})",
            target,
            registry.names().join(", ")
        )
    })?;

    let versions = version.map(|v| vec![v]);
    let software = launcher
        .scan_software(versions.as_deref())?
        .into_iter()
        .next()
        .ok_or_else(|| {
            anyhow::anyhow!("No installed version of {} found", launcher.display_name())
        })?;

    spawn(launcher, &software.path, args, file.as_deref())
}

fn spawn(
    launcher: &dyn SoftwareLauncher,
    exec_path: &Path,
    args: &[String],
    file: Option<&Path>,
) -> Result<()> {
    let info = launcher.prepare_launch(exec_path, args, file)?;
    tracing::info!(path = %info.path.display(), launcher = launcher.name(), "launching");

    let status = std::process::Command::new(&info.path)
        .args(&info.args)
        .envs(&info.environment)
        .status()
        .with_context(|| format!("Failed to launch {}", info.path.display()))?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", info.path.display(), status);
    }
    Ok(())
}
