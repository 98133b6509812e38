//! Remit CLI - atomic account transfers from your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, config, logs, transfer};

/// Remit - move money between accounts, atomically
#[derive(Parser)]
#[command(name = "rmt", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Transfer an amount from one account to another
    Transfer {
        /// Sending account
        from: String,
        /// Receiving account
        to: String,
        /// Amount to move (up to 4 decimal places)
        amount: String,
        /// Sender's password (falls back to REMIT_PASSWORD, then a prompt)
        #[arg(short, long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr; RUST_LOG wins over the configured level
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = commands::get_remit_dir()
        .ok()
        .and_then(|dir| remit_core::config::Config::load(&dir).ok())
        .map(|config| config.log_level)
        .unwrap_or_else(|| "warn".to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("warn,remit_core={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Account { command } => account::run(command).map(|()| ExitCode::SUCCESS),
        Commands::Transfer {
            from,
            to,
            amount,
            password,
            json,
        } => transfer::run(&from, &to, &amount, password, json),
        Commands::Config { command } => config::run(command).map(|()| ExitCode::SUCCESS),
        Commands::Logs { command } => logs::run(command).map(|()| ExitCode::SUCCESS),
    }
}
