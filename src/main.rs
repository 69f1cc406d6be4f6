//! # fcup
//!
//! **fcup** keeps a FreeCAD installation on the latest weekly build.
//!
//! Features:
//! - `fcup check` downloads, extracts and merges the newest weekly build
//! - `fcup detect` shows which version is installed
//! - `fcup set-dir` remembers the installation folder
//! - `fcup home` prints the fcup home directory
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use clap::{Parser, Subcommand};
use fcup::{cmd_check, cmd_detect, cmd_set_dir, fcup_home};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "fcup",
    version,
    about = "fcup - keep FreeCAD on the latest weekly build",
    arg_required_else_help = true
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check for a newer weekly build and install it
    Check {
        /// Install without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// FreeCAD installation folder (remembered for next time)
        #[arg(long)]
        install_dir: Option<PathBuf>,
    },
    /// Show the installed FreeCAD version
    Detect {
        #[arg(long)]
        install_dir: Option<PathBuf>,
    },
    /// Remember the FreeCAD installation folder
    SetDir { dir: PathBuf },
    /// Print the fcup home directory
    Home,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "fcup=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// CLI entry point.
fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Cmd::Check { yes, install_dir } => {
            let ok = cmd_check(install_dir.as_deref(), yes)?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Cmd::Detect { install_dir } => {
            cmd_detect(install_dir.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::SetDir { dir } => {
            cmd_set_dir(&dir)?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Home => {
            println!("{}", fcup_home()?.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
