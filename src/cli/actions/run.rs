use crate::cli::actions::{Action, server};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
// A new `Action::*` variant needs a matching `*::execute` arm here.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
    }
}
