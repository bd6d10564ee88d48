use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_FORGOT_COOLDOWN_SECONDS: &str = "forgot-cooldown-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub forgot_cooldown_seconds: i64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_FRONTEND_BASE_URL}")
            })?;
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_SESSION_TTL_SECONDS}")
            })?;
        let reset_token_ttl_seconds = matches
            .get_one::<i64>(ARG_RESET_TOKEN_TTL_SECONDS)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_RESET_TOKEN_TTL_SECONDS}")
            })?;
        let forgot_cooldown_seconds = matches
            .get_one::<i64>(ARG_FORGOT_COOLDOWN_SECONDS)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_FORGOT_COOLDOWN_SECONDS}")
            })?;

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds,
            reset_token_ttl_seconds,
            forgot_cooldown_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for password reset links and CORS")
                .env("KONTO_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("KONTO_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("KONTO_RESET_TOKEN_TTL_SECONDS")
                .default_value("259200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FORGOT_COOLDOWN_SECONDS)
                .long(ARG_FORGOT_COOLDOWN_SECONDS)
                .help("Cooldown before queueing another password reset email")
                .env("KONTO_FORGOT_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}
