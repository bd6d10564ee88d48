//! End-to-end tests for the `konto` service.
//!
//! Each case verifies the database-backed behavior the schema-level tests
//! cannot reach by:
//! 1. Orchestrating a transient Postgres container and applying the schema.
//! 2. Spawning the actual `konto` binary as a supervised child process.
//! 3. Driving the GraphQL API over HTTP, session cookies included.
//!
//! Cases skip themselves when no container runtime is available.

mod support;

use anyhow::{Context, Result, bail};
use reqwest::header::{COOKIE, SET_COOKIE};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::{
    net::TcpListener,
    process::{Child, Command, Stdio},
    time::Duration,
};
use support::{postgres::PostgresContainer, runtime};
use tokio::time::sleep;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/01_konto.sql"));

struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

struct TestServer {
    _postgres: PostgresContainer,
    _child: ChildGuard,
    pool: PgPool,
    client: reqwest::Client,
    base: String,
}

impl TestServer {
    /// Boot Postgres, apply the schema, and spawn `konto` against it.
    async fn start(extra_args: &[&str]) -> Result<Self> {
        let postgres = PostgresContainer::start().await?;
        postgres.wait_until_ready().await?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&postgres.dsn())
            .await
            .context("Failed to connect to Postgres")?;
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to apply schema")?;

        let port = pick_port()?;
        let mut command = Command::new(env!("CARGO_BIN_EXE_konto"));
        command.env("KONTO_LOG_LEVEL", "info");
        // Clear conflicting env vars that might leak from the host
        for var in [
            "KONTO_DSN",
            "KONTO_PORT",
            "KONTO_FRONTEND_BASE_URL",
            "KONTO_SESSION_TTL_SECONDS",
            "KONTO_RESET_TOKEN_TTL_SECONDS",
            "KONTO_FORGOT_COOLDOWN_SECONDS",
            "KONTO_EMAIL_OUTBOX_POLL_SECONDS",
            "KONTO_EMAIL_OUTBOX_BATCH_SIZE",
            "KONTO_EMAIL_OUTBOX_MAX_ATTEMPTS",
            "KONTO_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS",
            "KONTO_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS",
            "KONTO_SMTP_HOST",
            "KONTO_SMTP_PORT",
            "KONTO_SMTP_USERNAME",
            "KONTO_SMTP_PASSWORD",
            "KONTO_EMAIL_FROM",
            "KONTO_LOG_JSON",
        ] {
            command.env_remove(var);
        }

        let child = ChildGuard(
            command
                .args(["--port", &port.to_string(), "--dsn", &postgres.dsn()])
                .args(extra_args)
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn()
                .context("Failed to spawn konto binary")?,
        );

        let client = reqwest::Client::new();
        let base = format!("http://127.0.0.1:{port}");
        wait_for_ready(&client, &base).await?;

        Ok(Self {
            _postgres: postgres,
            _child: child,
            pool,
            client,
            base,
        })
    }

    /// POST a GraphQL query; returns the `data` value and the session
    /// cookie from `Set-Cookie`, if the server issued one.
    async fn graphql(&self, query: &str, session: Option<&str>) -> Result<(Value, Option<String>)> {
        let mut request = self
            .client
            .post(format!("{}/graphql", self.base))
            .json(&json!({ "query": query }));
        if let Some(token) = session {
            request = request.header(COOKIE, format!("konto_session={token}"));
        }
        let response = request.send().await.context("GraphQL request failed")?;
        response
            .error_for_status_ref()
            .context("GraphQL request was rejected")?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| {
                let rest = value.strip_prefix("konto_session=")?;
                let raw = rest.split(';').next().unwrap_or(rest).trim();
                (!raw.is_empty()).then(|| raw.to_string())
            });

        let body: Value = response
            .json()
            .await
            .context("GraphQL response was not JSON")?;
        if let Some(errors) = body.get("errors")
            && !errors.is_null()
        {
            bail!("GraphQL errors: {errors}");
        }
        Ok((body["data"].clone(), cookie))
    }

    /// Register an account, asserting success, and return its session cookie.
    async fn register(&self, username: &str, email: &str, password: &str) -> Result<String> {
        let query = format!(
            r#"mutation {{
                register(options: {{ username: "{username}", email: "{email}", password: "{password}" }}) {{
                    errors {{ field message }}
                    user {{ id username }}
                }}
            }}"#
        );
        let (data, cookie) = self.graphql(&query, None).await?;
        assert!(
            data["register"]["errors"].is_null(),
            "register errors: {}",
            data["register"]["errors"]
        );
        assert_eq!(data["register"]["user"]["username"], username);
        cookie.context("register should set a session cookie")
    }

    async fn login(&self, identity: &str, password: &str) -> Result<(Value, Option<String>)> {
        let query = format!(
            r#"mutation {{
                login(options: {{ usernameOrEmail: "{identity}", password: "{password}" }}) {{
                    errors {{ field message }}
                    user {{ id username }}
                }}
            }}"#
        );
        let (data, cookie) = self.graphql(&query, None).await?;
        Ok((data["login"].clone(), cookie))
    }

    async fn change_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(Value, Option<String>)> {
        let query = format!(
            r#"mutation {{
                changePassword(token: "{token}", newPassword: "{new_password}", confirmNewPassword: "{new_password}") {{
                    errors {{ field message }}
                    user {{ id username }}
                }}
            }}"#
        );
        let (data, cookie) = self.graphql(&query, None).await?;
        Ok((data["changePassword"].clone(), cookie))
    }

    async fn me(&self, session: &str) -> Result<Value> {
        let (data, _) = self.graphql("{ me { id username } }", Some(session)).await?;
        Ok(data["me"].clone())
    }

    /// Pull the freshest reset token for an address out of the outbox payload.
    async fn latest_reset_token(&self, email: &str) -> Result<String> {
        let reset_url: String = sqlx::query_scalar(
            "SELECT payload_json->>'reset_url' FROM email_outbox WHERE to_email = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .context("No outbox row for email")?;
        let (_, token) = reset_url
            .split_once("#token=")
            .context("Reset URL missing token fragment")?;
        Ok(token.to_string())
    }

    async fn outbox_count(&self, email: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT count(*) FROM email_outbox WHERE to_email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count outbox rows")
    }
}

fn pick_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to bind a local port")?;
    Ok(listener
        .local_addr()
        .context("Failed to read local port")?
        .port())
}

async fn wait_for_ready(client: &reqwest::Client, base: &str) -> Result<()> {
    for _ in 0..40 {
        match client.get(format!("{base}/health")).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => sleep(Duration::from_millis(250)).await,
        }
    }
    bail!("konto did not become ready at {base}");
}

#[tokio::test]
async fn register_conflicts_surface_field_errors() -> Result<()> {
    if let Err(err) = runtime::ensure_container_runtime() {
        eprintln!("Skipping integration test: {err}");
        return Ok(());
    }

    let server = TestServer::start(&[]).await?;

    let cookie = server
        .register("alice", "alice@example.com", "hunter22")
        .await?;
    assert_eq!(server.me(&cookie).await?["username"], "alice");

    // Same email, different username: the unique violation maps to the email field.
    let (data, _) = server
        .graphql(
            r#"mutation { register(options: { username: "alice2", email: "alice@example.com", password: "hunter22" }) { errors { field message } user { id } } }"#,
            None,
        )
        .await?;
    let errors = data["register"]["errors"]
        .as_array()
        .context("errors array")?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "email");
    assert_eq!(errors[0]["message"], "email already registered");
    assert!(data["register"]["user"].is_null());

    // Same username, different email.
    let (data, _) = server
        .graphql(
            r#"mutation { register(options: { username: "alice", email: "alice2@example.com", password: "hunter22" }) { errors { field message } user { id } } }"#,
            None,
        )
        .await?;
    let errors = data["register"]["errors"]
        .as_array()
        .context("errors array")?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "username");
    assert_eq!(errors[0]["message"], "username already taken");

    // Neither conflict created an account.
    let (data, _) = server.graphql("{ countUsers }", None).await?;
    assert_eq!(data["countUsers"], 1);

    Ok(())
}

#[tokio::test]
async fn login_failures_share_generic_error() -> Result<()> {
    if let Err(err) = runtime::ensure_container_runtime() {
        eprintln!("Skipping integration test: {err}");
        return Ok(());
    }

    let server = TestServer::start(&[]).await?;
    server.register("bob", "bob@example.com", "hunter22").await?;

    // Unknown identity and wrong password answer identically.
    for (identity, password) in [("ghost@example.com", "hunter22"), ("bob", "wrong-password")] {
        let (login, cookie) = server.login(identity, password).await?;
        let errors = login["errors"].as_array().context("errors array")?;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["field"], "usernameOrEmail");
        assert_eq!(errors[0]["message"], "invalid username, email or password");
        assert!(login["user"].is_null());
        assert!(cookie.is_none());
    }

    let (login, cookie) = server.login("bob@example.com", "hunter22").await?;
    assert_eq!(login["user"]["username"], "bob");
    let session = cookie.context("login should set a session cookie")?;
    assert_eq!(server.me(&session).await?["username"], "bob");

    let (data, _) = server.graphql("mutation { logout }", Some(&session)).await?;
    assert_eq!(data["logout"], true);
    assert!(server.me(&session).await?.is_null());

    // Replaying the dead cookie removes nothing.
    let (data, _) = server.graphql("mutation { logout }", Some(&session)).await?;
    assert_eq!(data["logout"], false);

    Ok(())
}

#[tokio::test]
async fn password_reset_is_single_use_and_revokes_sessions() -> Result<()> {
    if let Err(err) = runtime::ensure_container_runtime() {
        eprintln!("Skipping integration test: {err}");
        return Ok(());
    }

    let server = TestServer::start(&[]).await?;
    let first_session = server
        .register("carol", "carol@example.com", "original-pw1")
        .await?;

    let (data, _) = server
        .graphql(
            r#"mutation { forgotPassword(email: "carol@example.com") }"#,
            None,
        )
        .await?;
    assert_eq!(data["forgotPassword"], true);
    assert_eq!(server.outbox_count("carol@example.com").await?, 1);

    let token = server.latest_reset_token("carol@example.com").await?;
    let (change, new_session) = server.change_password(&token, "brand-new-pw1").await?;
    assert!(
        change["errors"].is_null(),
        "changePassword errors: {}",
        change["errors"]
    );
    assert_eq!(change["user"]["username"], "carol");
    let new_session = new_session.context("changePassword should set a session cookie")?;

    // Every pre-reset session is revoked; the fresh one works.
    assert!(server.me(&first_session).await?.is_null());
    assert_eq!(server.me(&new_session).await?["username"], "carol");

    // The consumed token cannot be replayed.
    let (change, cookie) = server.change_password(&token, "another-pw123").await?;
    let errors = change["errors"].as_array().context("errors array")?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "token");
    assert_eq!(errors[0]["message"], "token expired or invalid");
    assert!(change["user"].is_null());
    assert!(cookie.is_none());

    // Within the cooldown a second request queues nothing new.
    let (data, _) = server
        .graphql(
            r#"mutation { forgotPassword(email: "carol@example.com") }"#,
            None,
        )
        .await?;
    assert_eq!(data["forgotPassword"], true);
    assert_eq!(server.outbox_count("carol@example.com").await?, 1);

    // The old password is dead, the new one logs in.
    let (login, _) = server.login("carol", "original-pw1").await?;
    let errors = login["errors"].as_array().context("errors array")?;
    assert_eq!(errors[0]["field"], "usernameOrEmail");
    let (login, _) = server.login("carol", "brand-new-pw1").await?;
    assert_eq!(login["user"]["username"], "carol");

    Ok(())
}

#[tokio::test]
async fn expired_reset_token_is_rejected() -> Result<()> {
    if let Err(err) = runtime::ensure_container_runtime() {
        eprintln!("Skipping integration test: {err}");
        return Ok(());
    }

    // TTL of zero expires tokens the moment they are minted.
    let server = TestServer::start(&["--reset-token-ttl-seconds", "0"]).await?;
    server
        .register("dave", "dave@example.com", "hunter22")
        .await?;

    let (data, _) = server
        .graphql(
            r#"mutation { forgotPassword(email: "dave@example.com") }"#,
            None,
        )
        .await?;
    assert_eq!(data["forgotPassword"], true);

    let token = server.latest_reset_token("dave@example.com").await?;
    let (change, cookie) = server.change_password(&token, "brand-new-pw1").await?;
    let errors = change["errors"].as_array().context("errors array")?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "token");
    assert_eq!(errors[0]["message"], "token expired or invalid");
    assert!(change["user"].is_null());
    assert!(cookie.is_none());

    Ok(())
}
