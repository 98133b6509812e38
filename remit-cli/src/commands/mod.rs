//! CLI command implementations

pub mod account;
pub mod config;
pub mod logs;
pub mod transfer;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::Password;
use remit_core::services::{EntryPoint, LogEvent, LoggingService};
use remit_core::RemitContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<Arc<LoggingService>> {
    let remit_dir = get_remit_dir().ok()?;
    std::fs::create_dir_all(&remit_dir).ok()?;
    match LoggingService::new(&remit_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::debug!(error = %e, "event log unavailable");
            None
        }
    }
}

/// Log an event; a failed write is traced and never fails the command
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "failed to record event");
        }
    }
}

/// Get the remit directory from REMIT_DIR or default to ~/.remit
pub fn get_remit_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var("REMIT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".remit"))
        .ok_or_else(|| anyhow!("Could not find home directory; set REMIT_DIR"))
}

/// Open the remit context, with the event log attached when available
pub fn get_context(logger: Option<Arc<LoggingService>>) -> Result<RemitContext> {
    let remit_dir = get_remit_dir()?;
    tracing::debug!(dir = %remit_dir.display(), "opening remit directory");

    let context = RemitContext::new(&remit_dir)
        .with_context(|| format!("Failed to open remit directory: {}", remit_dir.display()))?;
    Ok(match logger {
        Some(logger) => context.with_event_log(logger),
        None => context,
    })
}

/// Get a password from the flag, REMIT_PASSWORD, or an interactive prompt
pub fn get_password_or_prompt(password_flag: Option<String>, prompt: &str) -> Result<String> {
    if let Some(p) = password_flag {
        return Ok(p);
    }
    if let Ok(p) = env::var("REMIT_PASSWORD") {
        return Ok(p);
    }
    let p = Password::new().with_prompt(prompt).interact()?;
    Ok(p)
}

/// Like [`get_password_or_prompt`], asking twice when prompting
pub fn get_password_with_confirm(password_flag: Option<String>) -> Result<String> {
    if let Some(p) = password_flag {
        return Ok(p);
    }
    if let Ok(p) = env::var("REMIT_PASSWORD") {
        return Ok(p);
    }

    let p1 = Password::new().with_prompt("Account password").interact()?;
    let p2 = Password::new()
        .with_prompt("Confirm account password")
        .interact()?;

    if p1 != p2 {
        bail!("Passwords do not match");
    }
    Ok(p1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_event_records_through_logger() {
        let dir = tempdir().unwrap();
        let logger = Some(Arc::new(
            LoggingService::new(dir.path(), EntryPoint::Cli, "test").unwrap(),
        ));

        log_event(&logger, LogEvent::transfer_succeeded(2));
        log_event(&None, LogEvent::transfer_succeeded(1));

        let logger = logger.unwrap();
        assert_eq!(logger.count().unwrap(), 1);
        assert_eq!(logger.get_transfers(10, None).unwrap()[0].attempts, Some(2));
    }
}
