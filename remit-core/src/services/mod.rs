//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod account;
pub mod auth;
mod handler;
pub mod logging;
pub mod migration;
mod transfer;

pub use account::AccountService;
pub use auth::{hash_secret, hash_secret_with_params, verify_secret, SecretAuthenticator, SecretError};
pub use handler::{TransferCommand, TransferHandler, TransferResponse};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService, OutcomeSummary};
pub use migration::{MigrationResult, MigrationService};
pub use transfer::TransferEngine;
