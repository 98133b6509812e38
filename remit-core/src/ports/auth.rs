//! Authentication port

use crate::domain::{AccountRef, StoreError};

/// Decides whether a caller may debit an account.
///
/// Consulted by the request handler before the transfer engine runs; the
/// engine itself never authenticates.
pub trait Authenticator: Send + Sync {
    /// `Ok(false)` for an unknown account or a wrong secret
    fn authorize(&self, account: &AccountRef, secret: &str) -> Result<bool, StoreError>;
}
