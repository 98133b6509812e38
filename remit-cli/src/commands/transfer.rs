//! Transfer command - move funds between two accounts

use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use colored::Colorize;
use rust_decimal::Decimal;

use remit_core::services::{LogEvent, TransferCommand};

use super::{get_context, get_logger, get_password_or_prompt, log_event};
use crate::output;

pub fn run(
    from: &str,
    to: &str,
    amount: &str,
    password: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("transfer"));

    let amount =
        Decimal::from_str(amount.trim()).map_err(|_| anyhow!("Invalid amount: {}", amount))?;
    let password = get_password_or_prompt(password, &format!("Password for {}", from))?;

    let ctx = get_context(logger)?;
    let response = ctx.transfer_handler.handle(&TransferCommand {
        sender_account: from.to_string(),
        receiver_account: to.to_string(),
        amount,
        password,
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if response.is_success() {
        output::success(&format!(
            "Transferred {} from {} to {}",
            output::format_amount(amount),
            from,
            to
        ));
        let attempts = response.body["attempts"].as_u64().unwrap_or(1);
        if attempts > 1 {
            println!("{}", format!("Committed after {} attempts", attempts).dimmed());
        }
    } else {
        let message = response.body["error"]
            .as_str()
            .unwrap_or("Transfer failed")
            .to_string();
        output::error(&format!("{} (status {})", message, response.status));
        if response.body["rollback"].as_bool() == Some(true) {
            println!("No balances were changed.");
        }
        if response.body["indeterminate"].as_bool() == Some(true) {
            output::warning(
                "The outcome is unknown. Check balances with 'rmt account show' before retrying.",
            );
        }
    }

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
