//! Account secrets - Argon2id hashing and verification
//!
//! Secrets are stored as PHC strings (`$argon2id$v=19$...`), so the salt
//! and cost parameters travel with the hash and verification never needs
//! out-of-band settings.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::Rng;
use thiserror::Error;

use crate::domain::{AccountRef, StoreError};
use crate::ports::{AccountStore, Authenticator};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Secret must not be empty")]
    Empty,

    #[error("Failed to hash secret: {0}")]
    Hash(String),
}

/// Hash a secret with the default Argon2id parameters
pub fn hash_secret(secret: &str) -> Result<String, SecretError> {
    hash_secret_with_params(secret, Params::default())
}

/// Hash a secret with explicit Argon2id cost parameters
pub fn hash_secret_with_params(secret: &str, params: Params) -> Result<String, SecretError> {
    if secret.is_empty() {
        return Err(SecretError::Empty);
    }

    let salt_bytes: [u8; 16] = rand::thread_rng().gen();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| SecretError::Hash(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| SecretError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a secret against a stored PHC hash. Malformed hashes never match.
pub fn verify_secret(hash: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored secret hash is malformed");
            false
        }
    }
}

/// Authenticator backed by the secret hashes in an [`AccountStore`]
pub struct SecretAuthenticator<S: AccountStore> {
    store: Arc<S>,
}

impl<S: AccountStore> SecretAuthenticator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: AccountStore> Authenticator for SecretAuthenticator<S> {
    fn authorize(&self, account: &AccountRef, secret: &str) -> Result<bool, StoreError> {
        let authorized = match self.store.find_account(account)? {
            Some(found) => verify_secret(&found.secret_hash, secret),
            None => false,
        };
        if !authorized {
            tracing::debug!(account = %account, "authorization denied");
        }
        Ok(authorized)
    }
}

/// Cheap parameters so tests don't spend seconds per hash
#[cfg(test)]
pub(crate) fn test_params() -> Params {
    Params::new(Params::MIN_M_COST, 1, 1, None).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::Account;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret_with_params("hunter2", test_params()).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret(&hash, "hunter2"));
        assert!(!verify_secret(&hash, "hunter3"));
        assert!(!verify_secret(&hash, ""));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_secret_with_params("same", test_params()).unwrap();
        let second = hash_secret_with_params("same", test_params()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert_eq!(
            hash_secret_with_params("", test_params()),
            Err(SecretError::Empty)
        );
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_secret("not-a-phc-string", "anything"));
    }

    #[test]
    fn test_authenticator() {
        let store = Arc::new(MemoryStore::new());
        let hash = hash_secret_with_params("s3cret", test_params()).unwrap();
        store.insert(Account::new(AccountRef::from("A"), dec!(10), hash));
        let auth = SecretAuthenticator::new(Arc::clone(&store));

        assert!(auth.authorize(&AccountRef::from("A"), "s3cret").unwrap());
        assert!(!auth.authorize(&AccountRef::from("A"), "wrong").unwrap());
        assert!(!auth.authorize(&AccountRef::from("ghost"), "s3cret").unwrap());
    }
}
