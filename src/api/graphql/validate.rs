//! Form-field validation shared by the account mutations.
//!
//! Every check maps to a `FieldError` keyed by the GraphQL input field
//! name, so errors land next to the right form input.

use url::Url;

use super::types::FieldError;
use crate::api::auth::utils;

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 30;
const PASSWORD_MIN_CHARS: usize = 8;

pub(super) fn validate_username(username: &str) -> Option<FieldError> {
    // The @ check comes first: an @ means someone typed an email here.
    if username.contains('@') {
        return Some(FieldError::new("username", "username cannot include an @"));
    }
    let length = username.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&length) {
        return Some(FieldError::new(
            "username",
            "username must be between 3 and 30 characters",
        ));
    }
    if !utils::valid_username(username) {
        return Some(FieldError::new(
            "username",
            "username may only contain letters, numbers and underscores",
        ));
    }
    None
}

pub(super) fn validate_email(email_normalized: &str) -> Option<FieldError> {
    if utils::valid_email(email_normalized) {
        None
    } else {
        Some(FieldError::new("email", "invalid email address"))
    }
}

pub(super) fn validate_new_password(field: &str, password: &str) -> Option<FieldError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        Some(FieldError::new(
            field,
            "password must be at least 8 characters",
        ))
    } else {
        None
    }
}

pub(super) fn validate_image_url(image_url: &str) -> Option<FieldError> {
    match Url::parse(image_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => None,
        _ => Some(FieldError::new(
            "imageUrl",
            "image URL must be a valid http(s) URL",
        )),
    }
}

/// Run every registration check and collect the failures, so the form
/// can show all problems at once.
pub(super) fn validate_register(username: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(err) = validate_username(username) {
        errors.push(err);
    }
    if let Some(err) = validate_email(email) {
        errors.push(err);
    }
    if let Some(err) = validate_new_password("password", password) {
        errors.push(err);
    }
    errors
}

pub(super) fn conflict_error(field: &'static str) -> FieldError {
    let message = if field == "email" {
        "email already registered"
    } else {
        "username already taken"
    };
    FieldError::new(field, message)
}
