//! Request handler - authenticates, runs a transfer, maps the outcome
//!
//! Transport-agnostic: a command goes in, a status code and JSON body come
//! out. Authorization is checked once, before the engine runs; the retry
//! loop never re-authenticates.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{AccountRef, TransferError, TransferReceipt, TransferRequest};
use crate::ports::{AccountStore, Authenticator};

use super::logging::{LogEvent, LoggingService};
use super::transfer::TransferEngine;

/// Incoming transfer request as sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCommand {
    pub sender_account: String,
    pub receiver_account: String,
    pub amount: Decimal,
    pub password: String,
}

/// Transport-level response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferResponse {
    pub status: u16,
    pub body: Value,
}

impl TransferResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": message.into() }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Handles transfer requests on behalf of an external caller
pub struct TransferHandler<S: AccountStore> {
    engine: Arc<TransferEngine<S>>,
    authenticator: Arc<dyn Authenticator>,
    event_log: Option<Arc<LoggingService>>,
}

impl<S: AccountStore> TransferHandler<S> {
    pub fn new(engine: Arc<TransferEngine<S>>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            engine,
            authenticator,
            event_log: None,
        }
    }

    /// Record transfer outcomes in the event log
    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Parse a JSON request body and handle it
    pub fn handle_json(&self, body: &str) -> TransferResponse {
        match serde_json::from_str::<TransferCommand>(body) {
            Ok(command) => self.handle(&command),
            Err(e) => {
                tracing::debug!(error = %e, "malformed transfer request");
                TransferResponse::error(400, "Invalid request")
            }
        }
    }

    pub fn handle(&self, command: &TransferCommand) -> TransferResponse {
        let (sender, receiver) = match (
            AccountRef::from_str(&command.sender_account),
            AccountRef::from_str(&command.receiver_account),
        ) {
            (Ok(sender), Ok(receiver)) => (sender, receiver),
            _ => return TransferResponse::error(400, "Invalid request"),
        };

        match self.authenticator.authorize(&sender, &command.password) {
            Ok(true) => {}
            Ok(false) => return TransferResponse::error(401, "Unauthorized"),
            Err(e) => {
                tracing::error!(error = %e, "authorization check failed");
                return TransferResponse::error(500, "Transaction failed");
            }
        }

        let request = TransferRequest::new(sender, receiver, command.amount);
        let outcome = self.engine.transfer(&request);
        self.record(&outcome);
        match outcome {
            Ok(receipt) => success(&receipt),
            Err(e) => failure(&e),
        }
    }

    fn record(&self, outcome: &Result<TransferReceipt, TransferError>) {
        let Some(event_log) = &self.event_log else {
            return;
        };
        let event = match outcome {
            Ok(receipt) => LogEvent::transfer_succeeded(receipt.attempts),
            Err(e) => LogEvent::transfer_failed(e),
        };
        if let Err(e) = event_log.log(event) {
            tracing::warn!(error = %e, "failed to record transfer event");
        }
    }
}

fn success(receipt: &TransferReceipt) -> TransferResponse {
    TransferResponse::new(
        200,
        json!({
            "message": "Transfer successful",
            "attempts": receipt.attempts,
        }),
    )
}

fn failure(error: &TransferError) -> TransferResponse {
    match error {
        TransferError::InsufficientBalance { .. } => TransferResponse::new(
            400,
            json!({
                "error": "Transaction failed due to insufficient balance",
                "rollback": true,
            }),
        ),
        TransferError::InvalidAmount(_) | TransferError::SameAccount(_) => {
            TransferResponse::error(400, error.to_string())
        }
        TransferError::AccountNotFound(_) => TransferResponse::error(404, error.to_string()),
        TransferError::DeadlineExceeded { .. } => TransferResponse::new(
            503,
            json!({
                "error": "Transaction timed out",
                "indeterminate": true,
            }),
        ),
        TransferError::Exhausted { .. } => TransferResponse::new(
            500,
            json!({
                "error": "Transaction failed",
                "indeterminate": true,
            }),
        ),
    }
}
