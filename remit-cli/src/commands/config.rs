//! Config commands - show and change settings

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use remit_core::config::{Config, CONFIG_KEYS, SETTINGS_FILE};
use remit_core::services::LogEvent;

use super::{get_logger, get_remit_dir, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show effective settings (file plus environment overrides)
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a setting, e.g. `rmt config set transfer.maxAttempts 3`
    Set {
        /// One of transfer.maxAttempts, transfer.baseDelayMs, transfer.timeoutMs, logging.level
        key: String,
        /// New value (`none` clears transfer.timeoutMs)
        value: String,
    },
}

pub fn run(command: ConfigCommands) -> Result<()> {
    let logger = get_logger();
    let remit_dir = get_remit_dir()?;

    match command {
        ConfigCommands::Show { json } => {
            log_event(&logger, LogEvent::new("command_executed").with_command("config show"));
            let config = Config::load(&remit_dir)?;
            let values = values(&config);

            if json {
                let map: serde_json::Map<String, serde_json::Value> = values
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Key", "Value"]);
            for (key, value) in values {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{}", table);
            println!(
                "{}",
                format!("Settings file: {}", remit_dir.join(SETTINGS_FILE).display()).dimmed()
            );
        }
        ConfigCommands::Set { key, value } => {
            log_event(&logger, LogEvent::new("command_executed").with_command("config set"));
            let mut config = Config::load(&remit_dir)?;
            config.set(&key, &value)?;
            config.save(&remit_dir)?;
            output::success(&format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

/// Current value of every managed key, in [`CONFIG_KEYS`] order
fn values(config: &Config) -> Vec<(&'static str, String)> {
    CONFIG_KEYS
        .iter()
        .map(|key| {
            let value = match *key {
                "transfer.maxAttempts" => config.max_attempts.to_string(),
                "transfer.baseDelayMs" => config.base_delay_ms.to_string(),
                "transfer.timeoutMs" => config
                    .timeout_ms
                    .map_or_else(|| "none".to_string(), |ms| ms.to_string()),
                "logging.level" => config.log_level.clone(),
                _ => String::new(),
            };
            (*key, value)
        })
        .collect()
}
