//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The transfer
//! engine depends only on these traits, not on concrete implementations.

mod auth;
mod clock;
mod store;

pub use auth::Authenticator;
pub use clock::Clock;
pub use store::{AccountStore, StoreTransaction};
