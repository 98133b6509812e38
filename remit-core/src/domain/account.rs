//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of fractional digits a balance or amount may carry.
/// Matches the DECIMAL(18,4) column in `sys_accounts`.
pub const BALANCE_SCALE: u32 = 4;

/// Unique reference of an account (the account number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRef(String);

impl AccountRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountRef {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("account reference cannot be empty");
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for AccountRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A funded account as stored in the shared store.
///
/// Accounts are provisioned outside the transfer engine; the engine only
/// reads them and rewrites `balance`.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub account_ref: AccountRef,
    /// Always >= 0 between transactions
    pub balance: Decimal,
    /// Argon2id PHC string, never the plaintext secret
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with an already hashed secret
    pub fn new(account_ref: AccountRef, balance: Decimal, secret_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            account_ref,
            balance,
            secret_hash: secret_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the balance covers a debit of `amount`
    pub fn can_debit(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Validate account data before it is written by provisioning
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.account_ref.as_str().trim().is_empty() {
            return Err("account reference cannot be empty");
        }
        if self.balance < Decimal::ZERO {
            return Err("balance cannot be negative");
        }
        if self.balance.normalize().scale() > BALANCE_SCALE {
            return Err("balance has more than 4 decimal places");
        }
        if self.secret_hash.is_empty() {
            return Err("secret hash cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_ref_parsing_trims() {
        let parsed: AccountRef = " 0012345 ".parse().unwrap();
        assert_eq!(parsed.as_str(), "0012345");
        assert!("   ".parse::<AccountRef>().is_err());
    }

    #[test]
    fn test_account_validation() {
        let mut account = Account::new(AccountRef::from("A-1"), dec!(10.50), "$argon2id$stub");
        assert!(account.validate().is_ok());

        account.balance = dec!(-1);
        assert!(account.validate().is_err());

        account.balance = dec!(1.00001);
        assert!(account.validate().is_err());

        account.balance = dec!(1.0000);
        account.secret_hash.clear();
        assert!(account.validate().is_err());
    }

    #[test]
    fn test_can_debit_boundary() {
        let account = Account::new(AccountRef::from("A-1"), dec!(30), "h");
        assert!(account.can_debit(dec!(30)));
        assert!(account.can_debit(dec!(29.9999)));
        assert!(!account.can_debit(dec!(30.0001)));
    }

    #[test]
    fn test_secret_hash_not_serialized() {
        let account = Account::new(AccountRef::from("A-1"), dec!(1), "secret-hash");
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"account_ref\":\"A-1\""));
    }
}
