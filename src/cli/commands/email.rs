use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_OUTBOX_POLL_SECONDS: &str = "email-outbox-poll-seconds";
pub const ARG_OUTBOX_BATCH_SIZE: &str = "email-outbox-batch-size";
pub const ARG_OUTBOX_MAX_ATTEMPTS: &str = "email-outbox-max-attempts";
pub const ARG_OUTBOX_BACKOFF_BASE_SECONDS: &str = "email-outbox-backoff-base-seconds";
pub const ARG_OUTBOX_BACKOFF_MAX_SECONDS: &str = "email-outbox-backoff-max-seconds";
pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_EMAIL_FROM: &str = "email-from";

#[derive(Debug)]
pub struct Options {
    pub outbox: OutboxOptions,
    pub smtp: Option<SmtpOptions>,
}

#[derive(Debug, Clone)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

impl Options {
    /// Parse email arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing, or if an SMTP host
    /// is given without credentials.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_u64 = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let outbox = OutboxOptions {
            poll_seconds: read_u64(ARG_OUTBOX_POLL_SECONDS)?,
            batch_size: matches
                .get_one::<usize>(ARG_OUTBOX_BATCH_SIZE)
                .copied()
                .ok_or_else(|| {
                    anyhow::anyhow!("missing required argument: --{ARG_OUTBOX_BATCH_SIZE}")
                })?,
            max_attempts: matches
                .get_one::<u32>(ARG_OUTBOX_MAX_ATTEMPTS)
                .copied()
                .ok_or_else(|| {
                    anyhow::anyhow!("missing required argument: --{ARG_OUTBOX_MAX_ATTEMPTS}")
                })?,
            backoff_base_seconds: read_u64(ARG_OUTBOX_BACKOFF_BASE_SECONDS)?,
            backoff_max_seconds: read_u64(ARG_OUTBOX_BACKOFF_MAX_SECONDS)?,
        };

        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let smtp = match get_non_empty(ARG_SMTP_HOST) {
            Some(host) => {
                let username = get_non_empty(ARG_SMTP_USERNAME).ok_or_else(|| {
                    anyhow::anyhow!(
                        "missing required argument: --{ARG_SMTP_USERNAME} (required with --{ARG_SMTP_HOST})"
                    )
                })?;
                let password = get_non_empty(ARG_SMTP_PASSWORD).ok_or_else(|| {
                    anyhow::anyhow!(
                        "missing required argument: --{ARG_SMTP_PASSWORD} (required with --{ARG_SMTP_HOST})"
                    )
                })?;
                let from = get_non_empty(ARG_EMAIL_FROM).ok_or_else(|| {
                    anyhow::anyhow!("missing required argument: --{ARG_EMAIL_FROM}")
                })?;

                Some(SmtpOptions {
                    host,
                    port: matches
                        .get_one::<u16>(ARG_SMTP_PORT)
                        .copied()
                        .unwrap_or(587),
                    username,
                    password: SecretString::from(password),
                    from,
                })
            }
            None => None,
        };

        Ok(Self { outbox, smtp })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_outbox_args(command);
    with_smtp_args(command)
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OUTBOX_POLL_SECONDS)
                .long(ARG_OUTBOX_POLL_SECONDS)
                .help("Email outbox poll interval in seconds")
                .env("KONTO_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BATCH_SIZE)
                .long(ARG_OUTBOX_BATCH_SIZE)
                .help("Email outbox batch size per poll")
                .env("KONTO_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_MAX_ATTEMPTS)
                .long(ARG_OUTBOX_MAX_ATTEMPTS)
                .help("Max attempts before marking an email as failed")
                .env("KONTO_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .help("Base delay for email outbox retry backoff")
                .env("KONTO_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .help("Max delay for email outbox retry backoff")
                .env("KONTO_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_smtp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; when unset, outbound email is logged instead")
                .env("KONTO_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("KONTO_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP relay username")
                .env("KONTO_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP relay password")
                .env("KONTO_SMTP_PASSWORD"),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Mailbox for the From header of outbound email")
                .env("KONTO_EMAIL_FROM")
                .default_value("Konto <no-reply@localhost>"),
        )
}
