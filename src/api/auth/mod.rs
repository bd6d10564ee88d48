//! Accounts and supporting modules.
//!
//! This module owns everything below the GraphQL resolvers: validation
//! helpers, Argon2 password hashing, cookie sessions, password-reset
//! tokens, and the storage layer.
//!
//! ## Sessions
//!
//! Session tokens are 32 random bytes, base64-encoded for the cookie.
//! The database stores only a SHA-256 hash of the token, so a leaked
//! table cannot be replayed as live sessions. Lookups touch
//! `last_seen_at` without extending the TTL.
//!
//! ## Reset Tokens
//!
//! Password-reset tokens follow the same hash-at-rest rule, are single
//! use (`consumed_at`), and expire after a configurable TTL. Consuming
//! one revokes every session for the account.

pub(crate) mod password;
mod rate_limit;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod utils;

pub use rate_limit::{NoopRateLimiter, RateLimiter};
pub use state::{AuthConfig, AuthState};
pub(crate) use rate_limit::{RateLimitAction, RateLimitDecision};

use thiserror::Error;

/// Session resolution failures the resolvers branch on.
#[derive(Debug, Error)]
pub(crate) enum AuthError {
    /// Missing, unknown, or expired session token.
    #[error("not authenticated")]
    NotAuthenticated,
    /// Infrastructure fault while resolving the session.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
