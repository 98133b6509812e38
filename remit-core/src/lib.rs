//! Remit Core - atomic account-to-account transfers with bounded retry
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Account, TransferRequest, RetryPolicy, errors)
//! - **ports**: Trait definitions for external dependencies (AccountStore, Clock, Authenticator)
//! - **services**: Business logic orchestration (TransferEngine, TransferHandler, ...)
//! - **adapters**: Concrete implementations (DuckDB, in-memory store, clocks)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::{
    Account, AccountRef, ErrorClass, RetryPolicy, StoreError, TransferError, TransferReceipt,
    TransferRequest,
};

/// File name of the account database inside the remit directory
pub const DATABASE_FILE: &str = "remit.duckdb";

/// Main context for remit operations
///
/// Holds the database connection, configuration, and all services wired
/// together over the DuckDB store.
pub struct RemitContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub account_service: AccountService,
    pub transfer_engine: Arc<TransferEngine<DuckDbRepository>>,
    pub transfer_handler: TransferHandler<DuckDbRepository>,
}

impl RemitContext {
    /// Open the context rooted at `remit_dir`, creating the database if needed
    pub fn new(remit_dir: &Path) -> Result<Self> {
        let config = Config::load(remit_dir)?;
        std::fs::create_dir_all(remit_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&remit_dir.join(DATABASE_FILE))?);
        repository.ensure_schema()?;

        Ok(Self::with_repository(config, repository))
    }

    /// Wire services over an existing repository
    pub fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Self {
        let account_service = AccountService::new(Arc::clone(&repository));
        let transfer_engine = Arc::new(TransferEngine::new(
            Arc::clone(&repository),
            config.retry_policy(),
        ));
        let authenticator = Arc::new(SecretAuthenticator::new(Arc::clone(&repository)));
        let transfer_handler = TransferHandler::new(Arc::clone(&transfer_engine), authenticator);

        Self {
            config,
            repository,
            account_service,
            transfer_engine,
            transfer_handler,
        }
    }

    /// Record handler outcomes in the given event log
    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.transfer_handler = self.transfer_handler.with_event_log(event_log);
        self
    }
}
