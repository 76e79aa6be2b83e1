//! Command line entry point, run by the launcher script on the device.

use clap::{Parser, Subcommand};
use nickelsync_config::Config;
use nickelsync_engine::{ReturnCode, Session, SessionEnd, apply_deferred};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Append logs to this file instead of writing them to stderr.
    #[arg(long, global = true, env = "NICKELSYNC_LOG_FILE")]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile Calibre's cache with Nickel's catalog and write pending
    /// metadata.
    Sync {
        /// Mount point of internal storage.
        #[arg(long, default_value = "/mnt/onboard")]
        root: PathBuf,
        /// Mount point of the SD card, when one is inserted.
        #[arg(long)]
        sd: Option<PathBuf>,
    },
    /// Replay metadata updates deferred by an earlier sync.
    Apply {
        #[arg(long, default_value = "/mnt/onboard")]
        root: PathBuf,
    },
}

impl Command {
    fn root(&self) -> &Path {
        match self {
            Self::Sync { root, .. } | Self::Apply { root } => root,
        }
    }
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let default = match debug {
        true => "debug",
        false => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        },
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

async fn sync(root: &Path, sd: Option<&Path>, config: Config) -> ReturnCode {
    let session = match Session::open(root, sd, config).await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("could not start session: {err:?}");
            return ReturnCode::Error;
        },
    };
    match session.finish(SessionEnd::Completed).await {
        Ok(summary) => {
            println!("{}", summary.status());
            summary.return_code()
        },
        Err(err) => {
            tracing::error!(retryable = err.is_retryable(), "sync failed: {err:?}");
            ReturnCode::Error
        },
    }
}

async fn apply(root: &Path) -> ReturnCode {
    match apply_deferred(root).await {
        Ok(true) => {
            println!("Metadata Updated!\n\nReturning to Home screen");
            ReturnCode::Success
        },
        Ok(false) => {
            tracing::info!("no deferred updates to apply");
            ReturnCode::Success
        },
        Err(err) => {
            tracing::error!(retryable = err.is_retryable(), "could not apply deferred updates: {err:?}");
            ReturnCode::Error
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load(cli.command.root());
    let debug = config.as_ref().is_ok_and(|config| config.enable_debug);
    if let Err(err) = init_logging(debug, cli.log_file.as_deref()) {
        eprintln!("could not open log file: {err}");
        return ExitCode::from(ReturnCode::Error.code());
    }
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("could not load configuration: {err:?}");
            return ExitCode::from(ReturnCode::Error.code());
        },
    };

    let code = match &cli.command {
        Command::Sync { root, sd } => sync(root, sd.as_deref(), config).await,
        Command::Apply { root } => apply(root).await,
    };
    tracing::debug!(%code, "exiting");
    ExitCode::from(code.code())
}
