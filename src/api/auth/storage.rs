//! Database helpers for accounts, sessions, and password-reset state.

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::{
    build_reset_url, generate_reset_token, generate_session_token, hash_reset_token,
    hash_session_token, is_unique_violation, unique_violation_field,
};

/// Public user fields as stored, with timestamps already rendered as
/// UTC ISO-8601 strings.
#[derive(Debug)]
pub(crate) struct UserRow {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) image_url: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

/// User plus stored password hash, for login checks only.
pub(crate) struct CredentialRow {
    pub(crate) user: UserRow,
    pub(crate) password_hash: String,
}

/// Minimal data resolved from a valid session token.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created(UserRow),
    /// Unique violation, mapped to the offending form field.
    Conflict(&'static str),
}

/// Outcome when applying profile updates.
#[derive(Debug)]
pub(crate) enum UpdateOutcome {
    Updated(UserRow),
    Conflict(&'static str),
    /// Session resolved but the user row is gone.
    Missing,
}

/// Outcome for a forgot-password request (callers always answer `true`
/// to avoid account probing).
#[derive(Debug)]
pub(crate) enum ForgotOutcome {
    Queued,
    Cooldown,
    Noop,
}

/// How to treat the stored image URL during a profile update.
#[derive(Debug)]
pub(crate) enum ImageUpdate {
    Keep,
    Clear,
    Set(String),
}

fn user_from_row(row: &PgRow) -> UserRow {
    UserRow {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        image_url: row.get("image_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) async fn insert_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = r#"
        INSERT INTO users
            (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING
            id,
            username,
            email,
            image_url,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(user_from_row(&row))),
        Err(err) => match unique_violation_field(&err) {
            Some(field) => Ok(SignupOutcome::Conflict(field)),
            None => Err(err).context("failed to insert user"),
        },
    }
}

/// Look up login data by username or email. Callers pass an email only
/// when the identifier contains an `@`; usernames cannot.
pub(crate) async fn lookup_credentials(
    pool: &PgPool,
    username_or_email: &str,
) -> Result<Option<CredentialRow>> {
    let by_email = username_or_email.contains('@');
    let query = if by_email {
        r#"
        SELECT
            id,
            username,
            email,
            image_url,
            password_hash,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users
        WHERE email = $1
        LIMIT 1
    "#
    } else {
        r#"
        SELECT
            id,
            username,
            email,
            image_url,
            password_hash,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users
        WHERE username = $1
        LIMIT 1
    "#
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username_or_email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    Ok(row.map(|row| CredentialRow {
        password_hash: row.get("password_hash"),
        user: user_from_row(&row),
    }))
}

pub(crate) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRow>> {
    let query = r#"
        SELECT
            id,
            username,
            email,
            image_url,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;
    Ok(row.map(|row| user_from_row(&row)))
}

pub(crate) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT user_id
        FROM user_sessions
        WHERE session_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(Some(SessionRecord {
        user_id: row.get("user_id"),
    }))
}

/// Delete one session. Logout is idempotent; returns whether a row existed.
pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(result.rows_affected() > 0)
}

async fn revoke_user_sessions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<u64> {
    let query = "DELETE FROM user_sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to revoke user sessions")?;
    Ok(result.rows_affected())
}

pub(crate) async fn enqueue_password_reset(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ForgotOutcome> {
    // Forgot-password is intentionally opaque: callers always answer true.
    let mut tx = pool.begin().await.context("begin forgot-password transaction")?;

    let query = r"
        SELECT id, email
        FROM users
        WHERE email = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup user for password reset")?;

    let Some(row) = row else {
        tx.commit().await.context("commit forgot-password noop")?;
        return Ok(ForgotOutcome::Noop);
    };

    let user_id: Uuid = row.get("id");
    if reset_cooldown_active(&mut tx, user_id, config.forgot_cooldown_seconds()).await? {
        tx.commit().await.context("commit forgot-password cooldown")?;
        return Ok(ForgotOutcome::Cooldown);
    }

    let email: String = row.get("email");
    let _token = insert_reset_records(&mut tx, user_id, &email, config).await?;
    tx.commit().await.context("commit forgot-password enqueue")?;
    Ok(ForgotOutcome::Queued)
}

async fn insert_reset_records(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    email: &str,
    config: &AuthConfig,
) -> Result<String> {
    // Generate a raw token for the email link and store only its hash.
    let token = generate_reset_token()?;
    let token_hash = hash_reset_token(&token);

    let query = r"
        INSERT INTO password_reset_tokens
            (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(config.reset_token_ttl_seconds())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert password reset token")?;

    let reset_url = build_reset_url(config.frontend_base_url(), &token);
    let payload_json = json!({
        "email": email,
        "reset_url": reset_url,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind("reset_password")
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(token)
}

async fn reset_cooldown_active(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    cooldown_seconds: i64,
) -> Result<bool> {
    // Cooldown prevents repeated forgot-password requests from spamming the outbox.
    let query = r"
        SELECT 1
        FROM password_reset_tokens
        WHERE user_id = $1
          AND created_at > NOW() - ($2 * INTERVAL '1 second')
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(cooldown_seconds)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check forgot-password cooldown")?;
    Ok(row.is_some())
}

async fn consume_reset_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
) -> Result<Option<Uuid>> {
    // Mark the token consumed only if still valid; single use.
    let query = r"
        UPDATE password_reset_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Consume a reset token and set the new password hash, revoking every
/// session for the account in the same transaction.
///
/// Returns `None` when the token is unknown, expired, or already used.
pub(crate) async fn reset_password(
    pool: &PgPool,
    token_hash: &[u8],
    password_hash: &str,
) -> Result<Option<UserRow>> {
    let mut tx = pool.begin().await.context("begin change-password transaction")?;

    let Some(user_id) = consume_reset_token(&mut tx, token_hash).await? else {
        let _ = tx.rollback().await;
        return Ok(None);
    };

    let query = r#"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING
            id,
            username,
            email,
            image_url,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password")?;

    let Some(row) = row else {
        // Token pointed at a user deleted in the meantime.
        let _ = tx.rollback().await;
        return Ok(None);
    };

    revoke_user_sessions(&mut tx, user_id).await?;
    tx.commit().await.context("commit change-password transaction")?;

    Ok(Some(user_from_row(&row)))
}

pub(crate) async fn update_user_info(
    pool: &PgPool,
    user_id: Uuid,
    username: Option<&str>,
    email: Option<&str>,
    image: &ImageUpdate,
) -> Result<UpdateOutcome> {
    let (apply_image, image_url) = match image {
        ImageUpdate::Keep => (false, None),
        ImageUpdate::Clear => (true, None),
        ImageUpdate::Set(url) => (true, Some(url.as_str())),
    };

    let query = r#"
        UPDATE users
        SET username = COALESCE($2, username),
            email = COALESCE($3, email),
            image_url = CASE WHEN $4 THEN $5 ELSE image_url END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING
            id,
            username,
            email,
            image_url,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(username)
        .bind(email)
        .bind(apply_image)
        .bind(image_url)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(UpdateOutcome::Updated(user_from_row(&row))),
        Ok(None) => Ok(UpdateOutcome::Missing),
        Err(err) => match unique_violation_field(&err) {
            Some(field) => Ok(UpdateOutcome::Conflict(field)),
            None => Err(err).context("failed to update user info"),
        },
    }
}

/// Delete the account. Sessions and reset tokens go with it via FK cascade.
pub(crate) async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn count_users(pool: &PgPool) -> Result<i64> {
    let query = "SELECT COUNT(*) AS count FROM users";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count users")?;
    Ok(row.get("count"))
}
