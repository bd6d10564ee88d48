//! # Konto (Accounts & Profile Service)
//!
//! `konto` is a standalone user-accounts service. It handles registration,
//! password login, cookie sessions, password reset over email, and profile
//! edits, all exposed through a single GraphQL endpoint.
//!
//! ## Sessions
//!
//! Logging in (and registering, which logs the new account in) sets an
//! opaque session cookie. Only a SHA-256 hash of the token is stored
//! server-side, so a database leak does not yield usable sessions. Changing
//! the password revokes every session for the account and starts a fresh one.
//!
//! ## Password Reset
//!
//! `forgotPassword` never reveals whether an address has an account: it
//! always answers `true` and, when the account exists, queues a reset email
//! in a transactional outbox. A background worker drains the outbox with
//! retries and exponential backoff, so a slow or flapping SMTP relay never
//! blocks a request.
//!
//! ## Field Errors
//!
//! Validation and conflict failures are data, not transport errors: mutations
//! return `(field, message)` pairs the frontend can attach to form inputs.
//! Failed logins return a single generic error to prevent account probing.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
