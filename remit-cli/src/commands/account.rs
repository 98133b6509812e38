//! Account commands - create and inspect accounts

use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;

use remit_core::services::LogEvent;
use remit_core::Account;

use super::{get_context, get_logger, get_password_with_confirm, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Add {
        /// Account reference (e.g. an account number)
        reference: String,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: String,
        /// Account password (falls back to REMIT_PASSWORD, then a prompt)
        #[arg(short, long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single account
    Show {
        reference: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    let logger = get_logger();

    match command {
        AccountCommands::Add {
            reference,
            balance,
            password,
            json,
        } => {
            log_event(&logger, LogEvent::new("command_executed").with_command("account add"));
            let balance = Decimal::from_str(balance.trim())
                .map_err(|_| anyhow!("Invalid balance: {}", balance))?;
            let password = get_password_with_confirm(password)?;

            let ctx = get_context(None)?;
            let account = ctx
                .account_service
                .create_account(&reference, balance, &password)?;
            log_event(&logger, LogEvent::new("account_created"));

            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                output::success(&format!(
                    "Created account {} with balance {}",
                    account.account_ref,
                    output::format_amount(account.balance)
                ));
            }
        }
        AccountCommands::List { json } => {
            log_event(&logger, LogEvent::new("command_executed").with_command("account list"));
            let ctx = get_context(None)?;
            let accounts = ctx.account_service.list_accounts()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
                return Ok(());
            }

            if accounts.is_empty() {
                println!("No accounts yet. Create one with 'rmt account add'.");
                return Ok(());
            }

            print_accounts(&accounts);
            let total: Decimal = accounts.iter().map(|a| a.balance).sum();
            println!(
                "{} accounts, total balance {}",
                accounts.len(),
                output::format_amount(total).bold()
            );
        }
        AccountCommands::Show { reference, json } => {
            log_event(&logger, LogEvent::new("command_executed").with_command("account show"));
            let ctx = get_context(None)?;
            let account = ctx
                .account_service
                .get_account(&reference)?
                .ok_or_else(|| anyhow!("Account not found: {}", reference))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                print_accounts(std::slice::from_ref(&account));
            }
        }
    }

    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    let mut table = output::create_table();
    table.set_header(vec!["Account", "Balance", "Created", "Updated"]);
    for account in accounts {
        table.add_row(vec![
            account.account_ref.to_string(),
            output::format_amount(account.balance),
            account.created_at.format("%Y-%m-%d %H:%M").to_string(),
            account.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{}", table);
}
