//! Logs command - inspect recorded transfer outcomes

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use super::get_logger;
use crate::output;
use remit_core::services::logging::now_ms;
use remit_core::services::{LogEntry, LoggingService};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Outcomes a transfer event can carry
const OUTCOMES: [&str; 6] = [
    "committed",
    "indeterminate",
    "insufficient_balance",
    "account_not_found",
    "invalid_amount",
    "same_account",
];

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent transfers and their outcomes
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only transfers with this outcome
        #[arg(long, value_parser = OUTCOMES, conflicts_with = "all")]
        outcome: Option<String>,
        /// Include non-transfer events such as executed commands
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete entries older than a number of days
    Clear {
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize transfer outcomes and attempts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: LogsCommands) -> Result<()> {
    let service = get_logger().ok_or_else(|| anyhow!("Event log is unavailable"))?;

    match command {
        LogsCommands::List {
            limit,
            outcome,
            all,
            json,
        } => list(&service, limit, outcome.as_deref(), all, json),
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => clear(&service, older_than_days, force, json),
        LogsCommands::Stats { json } => stats(&service, json),
    }
}

fn list(
    service: &Arc<LoggingService>,
    limit: usize,
    outcome: Option<&str>,
    all: bool,
    json: bool,
) -> Result<()> {
    let entries = if all {
        service.get_recent(limit)?
    } else {
        service.get_transfers(limit, outcome)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No transfers recorded.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Source", "Event", "Outcome", "Attempts"]);
    for entry in &entries {
        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.entry_point.clone(),
            event_label(entry),
            outcome_cell(entry.outcome.as_deref()),
            entry.attempts.map(|a| a.to_string()).unwrap_or_default(),
        ]);
    }
    println!("{}", table);

    let indeterminate = entries
        .iter()
        .filter(|e| e.outcome.as_deref() == Some("indeterminate"))
        .count();
    if indeterminate > 0 {
        output::warning(&format!(
            "{} transfer(s) ended indeterminate; check balances before retrying them.",
            indeterminate
        ));
    }
    Ok(())
}

fn clear(service: &Arc<LoggingService>, older_than_days: u64, force: bool, json: bool) -> Result<()> {
    if !force && !json {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete log entries older than {} days?", older_than_days))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = service.delete_before(cutoff_ms(now_ms(), older_than_days))?;
    if json {
        println!("{}", json!({ "deleted": deleted }));
    } else {
        output::success(&format!("Deleted {} log entries", deleted));
    }
    Ok(())
}

fn stats(service: &Arc<LoggingService>, json: bool) -> Result<()> {
    let summary = service.outcome_summary()?;
    let total = service.count()?;
    let transfers: u64 = summary.iter().map(|s| s.transfers).sum();
    let db_path = service.db_path();
    let size_bytes = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "transfers": transfers,
                "outcomes": summary,
                "other_events": total.saturating_sub(transfers),
                "database_path": db_path.to_string_lossy(),
                "database_size_bytes": size_bytes,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Transfer Outcomes".bold());
    if summary.is_empty() {
        println!("  No transfers recorded.");
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Outcome", "Transfers", "Avg attempts"]);
        for row in &summary {
            table.add_row(vec![
                outcome_cell(Some(&row.outcome)),
                row.transfers.to_string(),
                format!("{:.1}", row.mean_attempts()),
            ]);
        }
        println!("{}", table);
    }
    println!("  Other events: {}", total.saturating_sub(transfers));
    println!("  Database: {} ({})", db_path.display(), output::format_size(size_bytes));
    Ok(())
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Unix ms before which entries are older than `days`
fn cutoff_ms(now_ms: i64, days: u64) -> i64 {
    let span = i64::try_from(days).unwrap_or(i64::MAX).saturating_mul(DAY_MS);
    now_ms.saturating_sub(span)
}

/// Transfer events show without their prefix; commands show what ran
fn event_label(entry: &LogEntry) -> String {
    match (entry.event.strip_prefix("transfer_"), &entry.command) {
        (Some(kind), _) => kind.to_string(),
        (None, Some(command)) => format!("{} ({})", entry.event, command),
        (None, None) => entry.event.clone(),
    }
}

fn outcome_cell(outcome: Option<&str>) -> String {
    match outcome {
        Some("committed") => "committed".green().to_string(),
        Some("indeterminate") => "indeterminate".red().bold().to_string(),
        Some(other) => other.yellow().to_string(),
        None => String::new(),
    }
}
