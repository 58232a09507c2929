//! Command-line front end: runs procedures, edits settings, and captures
//! region snapshots for authoring template assets.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pixelpilot::{
    save_region_snapshot, ConfigStore, EngineOptions, LogLevel, Orchestrator, Procedure, Region,
    SettlePolicy, Targets, WorkflowOutcome, XcapScreen,
};

#[derive(Parser)]
#[command(name = "pixelpilot", version, about = "Pixel-driven desktop automation for account maintenance")]
struct Cli {
    /// Root directory of the template image assets.
    #[arg(long, global = true, default_value = "resources/images")]
    assets: PathBuf,

    /// Settings file.
    #[arg(long, global = true, default_value = "config/settings.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a procedure to completion; Ctrl-C cancels at the next step
    /// checkpoint.
    Run {
        procedure: ProcedureArg,

        /// Application state store holding the identity keys. Defaults to
        /// the stock install location under %APPDATA%.
        #[arg(long)]
        storage: Option<PathBuf>,

        /// Directory for identity-reset backups.
        #[arg(long, default_value = "backups")]
        backups: PathBuf,

        /// Updater directory to neutralize when auto-update is disabled.
        /// Defaults to the stock location under %LOCALAPPDATA%.
        #[arg(long)]
        updater: Option<PathBuf>,
    },
    /// Show or edit the stored settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Save a screenshot of a screen region, for authoring new templates.
    Snapshot {
        left: i32,
        top: i32,
        width: u32,
        height: u32,

        #[arg(long, default_value = "snapshots")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        /// Account identity prefix.
        #[arg(long)]
        prefix: Option<String>,
        /// Account identity mail domain.
        #[arg(long)]
        suffix: Option<String>,
        /// Account identity index.
        #[arg(long)]
        index: Option<u32>,
        /// Path to the target application's executable.
        #[arg(long)]
        exe: Option<PathBuf>,
        /// Whether identity resets should also block auto-update.
        #[arg(long)]
        disable_auto_update: Option<bool>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProcedureArg {
    SignIn,
    DeleteAccount,
    ResetIdentity,
    FullCycle,
}

impl From<ProcedureArg> for Procedure {
    fn from(arg: ProcedureArg) -> Self {
        match arg {
            ProcedureArg::SignIn => Procedure::SignIn,
            ProcedureArg::DeleteAccount => Procedure::DeleteAccount,
            ProcedureArg::ResetIdentity => Procedure::ResetIdentity,
            ProcedureArg::FullCycle => Procedure::FullCycle,
        }
    }
}

fn default_storage_path() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(|base| {
        PathBuf::from(base)
            .join("Cursor")
            .join("User")
            .join("globalStorage")
            .join("storage.json")
    })
}

fn default_updater_path() -> Option<PathBuf> {
    std::env::var_os("LOCALAPPDATA").map(|base| PathBuf::from(base).join("cursor-updater"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            procedure,
            storage,
            backups,
            updater,
        } => {
            let storage = storage
                .or_else(default_storage_path)
                .context("no --storage given and APPDATA is not set")?;
            let options = EngineOptions {
                asset_root: cli.assets,
                config_path: cli.config,
                storage_path: storage,
                backup_dir: backups,
                updater_path: updater.or_else(default_updater_path),
                settle: SettlePolicy::default(),
                targets: Targets::default(),
            };
            run_procedure(procedure.into(), options).await
        }
        Commands::Config { action } => configure(&ConfigStore::new(cli.config), action),
        Commands::Snapshot {
            left,
            top,
            width,
            height,
            out,
        } => {
            let region = Region::new(left, top, width, height)?;
            let path = save_region_snapshot(&XcapScreen::new(), &region, &out)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

async fn run_procedure(procedure: Procedure, options: EngineOptions) -> Result<()> {
    let mut orchestrator = Orchestrator::with_system_backends(options)?;
    orchestrator.set_log_sink(Arc::new(|level, message| match level {
        LogLevel::Info => println!("{message}"),
        _ => eprintln!("{message}"),
    }));
    let orchestrator = Arc::new(orchestrator);

    let canceller = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling at the next step checkpoint...");
            canceller.cancel();
        }
    });

    match orchestrator.run(procedure).await {
        WorkflowOutcome::Completed => Ok(()),
        WorkflowOutcome::Cancelled => bail!("cancelled"),
        WorkflowOutcome::TimedOut { step } => bail!("step '{step}' exhausted its attempts"),
        WorkflowOutcome::Busy => bail!("another procedure is already running"),
        WorkflowOutcome::Fatal { reason } => bail!(reason),
    }
}

fn configure(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = store.load()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            match settings.identity() {
                Some(identity) => println!("composed identity: {identity}"),
                None => println!("composed identity: (identity prefix not set)"),
            }
        }
        ConfigAction::Set {
            prefix,
            suffix,
            index,
            exe,
            disable_auto_update,
        } => {
            let mut settings = store.load()?;
            if let Some(prefix) = prefix {
                settings.identity_prefix = prefix;
            }
            if let Some(suffix) = suffix {
                settings.identity_suffix = suffix;
            }
            if let Some(index) = index {
                settings.identity_index = index;
            }
            if let Some(exe) = exe {
                settings.app_exe_path = Some(exe);
            }
            if let Some(disable) = disable_auto_update {
                settings.disable_auto_update = disable;
            }
            store.save(&settings)?;
            println!("saved to {}", store.path().display());
        }
    }
    Ok(())
}
