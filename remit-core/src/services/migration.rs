//! Migration service - manages database schema migrations
//!
//! Migrations are SQL files embedded at compile time. Each migration is
//! tracked in the sys_migrations table to ensure idempotent execution.

use anyhow::{Context, Result};
use duckdb::Connection;

use crate::migrations::MIGRATIONS;

const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Service for managing database migrations
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    /// Create a new migration service with a database connection
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run all pending migrations
    ///
    /// Bootstraps sys_migrations if needed, then applies every migration not
    /// yet recorded, in order. Each migration and its bookkeeping row are
    /// applied in one transaction.
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let mut newly_applied = Vec::new();

        if !self.migrations_table_exists()? {
            if let Some((name, sql)) = MIGRATIONS.iter().find(|(n, _)| *n == BOOTSTRAP_MIGRATION) {
                self.apply(name, sql)?;
                newly_applied.push(name.to_string());
            }
        }

        let applied_set = self.get_applied()?;
        let already_applied = applied_set.len() - newly_applied.len();

        for (name, sql) in MIGRATIONS.iter() {
            if !applied_set.iter().any(|applied| applied == name) {
                self.apply(name, sql)?;
                newly_applied.push(name.to_string());
            }
        }

        Ok(MigrationResult {
            applied: newly_applied,
            already_applied,
        })
    }

    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let outcome = self
            .conn
            .execute_batch(sql)
            .and_then(|_| {
                self.conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [name],
                )
            })
            .and_then(|_| self.conn.execute_batch("COMMIT"));

        if let Err(e) = outcome {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e).with_context(|| format!("Migration {} failed", name));
        }
        tracing::debug!(migration = name, "applied migration");
        Ok(())
    }

    /// Check if sys_migrations table exists
    fn migrations_table_exists(&self) -> Result<bool> {
        let result: Result<i64, _> = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(count) => Ok(count > 0),
            Err(_) => Ok(false),
        }
    }

    /// Get list of already applied migration names
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    /// Get list of pending migration names
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied = self.get_applied()?;
        let pending: Vec<String> = MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.iter().any(|a| a == name))
            .map(|(name, _)| name.to_string())
            .collect();
        Ok(pending)
    }
}
