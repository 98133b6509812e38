//! Logging service - structured event logging to DuckDB
//!
//! Stores privacy-safe events in logs.duckdb. Account references,
//! balances, amounts and secrets are never logged; transfer events carry
//! only their outcome and the number of attempts used.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::domain::TransferError;
use crate::log_migrations::LOG_MIGRATIONS;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

const SELECT_ENTRY: &str = "SELECT id, timestamp, entry_point, app_version, platform,
        event, command, outcome, attempts
 FROM sys_logs";

/// Transfer events share this prefix
const TRANSFER_EVENTS: &str = "transfer_%";

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = now_ms().max(0) as u64;

    // Lower 16 bits hold the counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Where an event originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    Handler,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Handler => "handler",
        }
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            command: None,
            outcome: None,
            attempts: None,
        }
    }

    /// Successful transfer
    pub fn transfer_succeeded(attempts: u32) -> Self {
        Self::new("transfer_succeeded")
            .with_outcome("committed")
            .with_attempts(attempts)
    }

    /// Failed transfer, classified by error kind. The error message is not
    /// recorded: it can name accounts and balances.
    pub fn transfer_failed(error: &TransferError) -> Self {
        let (event, outcome) = if error.is_indeterminate() {
            ("transfer_failed", "indeterminate")
        } else {
            ("transfer_rejected", error_kind(error))
        };
        Self::new(event)
            .with_outcome(outcome)
            .with_attempts(error.attempts())
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}

fn error_kind(error: &TransferError) -> &'static str {
    match error {
        TransferError::AccountNotFound(_) => "account_not_found",
        TransferError::InsufficientBalance { .. } => "insufficient_balance",
        TransferError::InvalidAmount(_) => "invalid_amount",
        TransferError::SameAccount(_) => "same_account",
        TransferError::Exhausted { .. } => "exhausted",
        TransferError::DeadlineExceeded { .. } => "deadline_exceeded",
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub outcome: Option<String>,
    pub attempts: Option<u32>,
}

impl LogEntry {
    pub fn is_transfer(&self) -> bool {
        self.event.starts_with("transfer_")
    }

    fn from_row(row: &Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            entry_point: row.get(2)?,
            app_version: row.get(3)?,
            platform: row.get(4)?,
            event: row.get(5)?,
            command: row.get(6)?,
            outcome: row.get(7)?,
            attempts: row.get(8)?,
        })
    }
}

/// Transfers recorded with one outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub outcome: String,
    pub transfers: u64,
    /// Attempts summed over those transfers
    pub attempts: u64,
}

impl OutcomeSummary {
    pub fn mean_attempts(&self) -> f64 {
        if self.transfers == 0 {
            0.0
        } else {
            self.attempts as f64 / self.transfers as f64
        }
    }
}

/// Service for structured event logging
///
/// Manages the logs.duckdb database and provides methods for logging
/// events and querying the log history.
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in `remit_dir` and run pending migrations
    pub fn new(
        remit_dir: &Path,
        entry_point: EntryPoint,
        app_version: impl Into<String>,
    ) -> Result<Self> {
        let db_path = remit_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;

        let service = Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
            platform: detect_platform(),
        };

        service.run_migrations()?;

        Ok(service)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM information_schema.tables WHERE table_name = 'sys_migrations'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !table_exists {
            if let Some((name, sql)) = LOG_MIGRATIONS.iter().find(|(n, _)| *n == "000_migrations.sql")
            {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [name],
                )?;
            }
        }

        let mut stmt = conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let applied = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;

        for (name, sql) in LOG_MIGRATIONS.iter() {
            if applied.iter().any(|a| a == name) {
                continue;
            }
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                [name],
            )?;
            tracing::debug!(migration = %name, "applied log migration");
        }

        Ok(())
    }

    /// Record an event, stamped with entry point, version and platform
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO sys_logs (
                id, timestamp, entry_point, app_version, platform,
                event, command, outcome, attempts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            duckdb::params![
                generate_id(),
                now_ms(),
                self.entry_point.as_str(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.command,
                &event.outcome,
                &event.attempts,
            ],
        )?;

        Ok(())
    }

    pub fn log_event(&self, event: &str) -> Result<()> {
        self.log(LogEvent::new(event))
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query(
            &format!("{} ORDER BY timestamp DESC, id DESC LIMIT ?", SELECT_ENTRY),
            duckdb::params![limit as i64],
        )
    }

    /// Most recent transfer events first, optionally only those with `outcome`
    pub fn get_transfers(&self, limit: usize, outcome: Option<&str>) -> Result<Vec<LogEntry>> {
        match outcome {
            Some(outcome) => self.query(
                &format!(
                    "{} WHERE event LIKE ? AND outcome = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
                    SELECT_ENTRY
                ),
                duckdb::params![TRANSFER_EVENTS, outcome, limit as i64],
            ),
            None => self.query(
                &format!(
                    "{} WHERE event LIKE ? ORDER BY timestamp DESC, id DESC LIMIT ?",
                    SELECT_ENTRY
                ),
                duckdb::params![TRANSFER_EVENTS, limit as i64],
            ),
        }
    }

    fn query<P: duckdb::Params>(&self, sql: &str, params: P) -> Result<Vec<LogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, LogEntry::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Transfer events grouped by outcome, most frequent first
    pub fn outcome_summary(&self) -> Result<Vec<OutcomeSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(outcome, 'unknown'), COUNT(*), CAST(COALESCE(SUM(attempts), 0) AS BIGINT)
             FROM sys_logs WHERE event LIKE ?
             GROUP BY 1 ORDER BY 2 DESC, 1",
        )?;
        let summary = stmt
            .query_map([TRANSFER_EVENTS], |row| {
                Ok(OutcomeSummary {
                    outcome: row.get(0)?,
                    transfers: row.get(1)?,
                    attempts: row.get(2)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(summary)
    }

    /// Event names with their number of occurrences, most frequent first
    pub fn event_counts(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT event, COUNT(*) FROM sys_logs GROUP BY event ORDER BY COUNT(*) DESC, event",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(counts)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete logs older than the specified timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
