//! upgrade-impact: schema upgrade diff and custom-code impact audit.
//!
//! ```bash
//! # Provision empty catalogs
//! upgrade-impact init --catalog new.db --legacy old.db
//!
//! # Full report against a populated catalog
//! upgrade-impact run --mode 4 --catalog new.db --legacy old.db --scripts /psft/sqr
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use upgrade_impact::config::{AuditConfig, ConfigOverrides};
use upgrade_impact::models::RunMode;
use upgrade_impact::pipeline::run_audit;
use upgrade_impact::report::RunLog;
use upgrade_impact::store::database::AuditDatabase;

#[derive(Parser)]
#[command(name = "upgrade-impact")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Schema upgrade diff and custom-code impact audit", long_about = None)]
#[command(after_help = "MODES:
    1  List structure changes only
    2  Run audit only for SQRs
    3  Run audit only for online objects
    4  Run full report")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff the snapshots and cross-reference custom code
    Run {
        /// Report option 1-4; prompted for when absent
        #[arg(short, long)]
        mode: Option<i64>,
        /// JSON config file
        #[arg(short, long, env = "UPGRADE_IMPACT_CONFIG")]
        config: Option<PathBuf>,
        /// New snapshot and custom-object catalog
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Old snapshot
        #[arg(long)]
        legacy: Option<PathBuf>,
        /// Custom-object project name
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        report_id: Option<String>,
        /// Root of the script tree
        #[arg(long)]
        scripts: Option<PathBuf>,
        /// Script file glob
        #[arg(long)]
        pattern: Option<String>,
        /// Run log path (truncated each run)
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        /// Write totals and the run summary as JSON
        #[arg(long)]
        json_out: Option<PathBuf>,
    },
    /// Create empty catalogs with every table a run needs
    Init {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        legacy: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn prompt_mode() -> Result<RunMode> {
    let mut stdout = io::stdout();
    writeln!(stdout, "Select the report option:")?;
    for mode in [
        RunMode::DiffOnly,
        RunMode::Scripts,
        RunMode::Structured,
        RunMode::Full,
    ] {
        writeln!(stdout, "  {} - {}", mode.code(), mode.description())?;
    }
    write!(stdout, "Option: ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read report option")?;
    let code: i64 = match answer.trim().parse() {
        Ok(code) => code,
        Err(_) => bail!("invalid report option {:?}; expected 1, 2, 3 or 4", answer.trim()),
    };
    Ok(RunMode::from_code(code)?)
}

fn run(mode: Option<i64>, config_file: Option<PathBuf>, overrides: ConfigOverrides) -> Result<()> {
    let mut config = AuditConfig::load(config_file.as_deref(), &overrides)
        .context("failed to load configuration")?;
    config.resolve_paths()?;

    let mode = match mode {
        Some(code) => RunMode::from_code(code)?,
        None => prompt_mode()?,
    };

    let log = RunLog::open(&config.run_log_path)
        .with_context(|| format!("failed to open run log {}", config.run_log_path.display()))?;
    let db = AuditDatabase::open(&config.catalog_path, &config.legacy_path)
        .context("failed to open catalogs")?;
    info!(catalog = %db.describe(), "catalogs opened");

    let summary = run_audit(&db, &config, mode, &log)?;

    if let Some(path) = &config.json_out {
        summary
            .write_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "totals exported");
    }
    Ok(())
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            mode,
            config,
            catalog,
            legacy,
            project,
            report_id,
            scripts,
            pattern,
            log,
            workers,
            json_out,
        } => run(
            mode,
            config,
            ConfigOverrides {
                catalog_path: catalog,
                legacy_path: legacy,
                custom_project: project,
                report_id,
                script_root: scripts,
                script_pattern: pattern,
                run_log_path: log,
                script_workers: workers,
                json_out,
            },
        ),
        Commands::Init { catalog, legacy } => {
            let db = AuditDatabase::provision(&catalog, &legacy)
                .context("failed to provision catalogs")?;
            info!(catalog = %db.describe(), "catalogs provisioned");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(1)
        }
    }
}
