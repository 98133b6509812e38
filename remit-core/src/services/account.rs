//! Account service - provisioning and lookup

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use argon2::Params;
use rust_decimal::Decimal;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::{Account, AccountRef};

use super::auth::hash_secret_with_params;

/// Service for creating and reading accounts
pub struct AccountService {
    repository: Arc<DuckDbRepository>,
    hash_params: Params,
}

impl AccountService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self {
            repository,
            hash_params: Params::default(),
        }
    }

    /// Override the Argon2id cost used for new secrets
    pub fn with_hash_params(mut self, params: Params) -> Self {
        self.hash_params = params;
        self
    }

    /// Create an account with an opening balance and a login secret
    pub fn create_account(
        &self,
        reference: &str,
        initial_balance: Decimal,
        secret: &str,
    ) -> Result<Account> {
        let account_ref = AccountRef::from_str(reference).map_err(|e| anyhow!(e))?;
        if self.repository.get_account(&account_ref)?.is_some() {
            return Err(anyhow!("Account already exists: {}", account_ref));
        }

        let hash = hash_secret_with_params(secret, self.hash_params.clone())?;
        let account = Account::new(account_ref, initial_balance, hash);
        self.repository.insert_account(&account)?;

        tracing::info!(account = %account.account_ref, "account created");
        Ok(account)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.repository.get_accounts()
    }

    pub fn get_account(&self, reference: &str) -> Result<Option<Account>> {
        let account_ref = AccountRef::from_str(reference).map_err(|e| anyhow!(e))?;
        self.repository.get_account(&account_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::{test_params, verify_secret};
    use rust_decimal_macros::dec;

    fn service() -> AccountService {
        let repo = Arc::new(DuckDbRepository::in_memory().unwrap());
        repo.ensure_schema().unwrap();
        AccountService::new(repo).with_hash_params(test_params())
    }

    #[test]
    fn test_create_and_get() {
        let service = service();
        let created = service.create_account("acct-1", dec!(12.3456), "pw").unwrap();
        assert_eq!(created.balance, dec!(12.3456));

        let found = service.get_account("acct-1").unwrap().unwrap();
        assert_eq!(found.balance, dec!(12.3456));
        assert!(verify_secret(&found.secret_hash, "pw"));
        assert!(service.get_account("acct-2").unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_input() {
        let service = service();
        service.create_account("acct-1", dec!(1), "pw").unwrap();

        assert!(service.create_account("acct-1", dec!(1), "pw").is_err());
        assert!(service.create_account("  ", dec!(1), "pw").is_err());
        assert!(service.create_account("acct-2", dec!(-1), "pw").is_err());
        assert!(service.create_account("acct-3", dec!(1), "").is_err());
        assert_eq!(service.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_list_is_ordered() {
        let service = service();
        service.create_account("b", dec!(1), "pw").unwrap();
        service.create_account("a", dec!(2), "pw").unwrap();

        let refs: Vec<String> = service
            .list_accounts()
            .unwrap()
            .into_iter()
            .map(|a| a.account_ref.to_string())
            .collect();
        assert_eq!(refs, vec!["a", "b"]);
    }
}
