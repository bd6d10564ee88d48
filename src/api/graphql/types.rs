//! GraphQL object and input types for the accounts API.

use async_graphql::{ID, InputObject, SimpleObject};

use crate::api::auth::storage::UserRow;

/// Public account fields; the password hash never leaves storage.
#[derive(Debug, SimpleObject)]
pub(crate) struct User {
    pub(crate) id: ID,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) image_url: Option<String>,
    /// UTC ISO-8601, e.g. `2024-01-01T00:00:00Z`.
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: ID::from(row.id.to_string()),
            username: row.username,
            email: row.email,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Validation or conflict error bound to a single form field, so the
/// frontend can render it next to the right input.
#[derive(Debug, SimpleObject)]
pub(crate) struct FieldError {
    pub(crate) field: String,
    pub(crate) message: String,
}

impl FieldError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Standard mutation payload: either a user or a list of field errors,
/// never both.
#[derive(Debug, Default, SimpleObject)]
pub(crate) struct UserResponse {
    pub(crate) errors: Option<Vec<FieldError>>,
    pub(crate) user: Option<User>,
}

impl UserResponse {
    pub(crate) fn from_user(user: User) -> Self {
        Self {
            errors: None,
            user: Some(user),
        }
    }

    pub(crate) fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            errors: Some(errors),
            user: None,
        }
    }

    pub(crate) fn from_field_error(
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::from_errors(vec![FieldError::new(field, message)])
    }
}

#[derive(Debug, InputObject)]
pub(crate) struct RegisterInput {
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(Debug, InputObject)]
pub(crate) struct LoginInput {
    pub(crate) username_or_email: String,
    pub(crate) password: String,
}

/// All fields optional; absent fields keep their stored value. An empty
/// `imageUrl` clears the stored image.
#[derive(Debug, InputObject)]
pub(crate) struct ChangeInfoInput {
    pub(crate) username: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) image_url: Option<String>,
}
