//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, email};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        forgot_cooldown_seconds: auth_opts.forgot_cooldown_seconds,
        email_outbox_poll_seconds: email_opts.outbox.poll_seconds,
        email_outbox_batch_size: email_opts.outbox.batch_size,
        email_outbox_max_attempts: email_opts.outbox.max_attempts,
        email_outbox_backoff_base_seconds: email_opts.outbox.backoff_base_seconds,
        email_outbox_backoff_max_seconds: email_opts.outbox.backoff_max_seconds,
        smtp: email_opts.smtp,
    }))
}
