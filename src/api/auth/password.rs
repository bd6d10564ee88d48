//! Argon2 password hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use tracing::error;

/// Hash a plaintext password into a PHC string for storage.
pub(crate) fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| {
            error!(error = %err, "argon2 hash_password error");
            anyhow::anyhow!(err.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Well-formed argon2id hash (default params) that no password verifies
/// against. Login checks unknown identities against it so a miss costs
/// the same argon2 work as a wrong password for a real account.
pub(crate) const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$GpZ3sK/oH9p7VIiV56G/64Zo/8GaUw434IimaPqxwCo";

/// Check a plaintext password against a stored PHC string.
/// A malformed stored hash is an error, not a failed login.
pub(crate) fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|err| {
        error!(error = %err, "argon2 parse hash error");
        anyhow::anyhow!(err.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
