use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::db::integrity::{
    EMAIL_VERIFICATION_TOKENS_TOKEN_KEY, PASSWORD_RESET_TOKENS_TOKEN_KEY, USERS_EMAIL_KEY,
    USERS_USERNAME_KEY,
};
use crate::responses::JsonResponse;

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("a record with this {field} already exists")]
    Conflict {
        field: &'static str,
        constraint: String,
    },
    #[error("the referenced user does not exist")]
    UnknownUser,
    #[error("token is unknown, already used, or expired")]
    InvalidToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("field `{0}` is read-only")]
    ReadOnlyField(String),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for AccountsError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                AccountsError::Conflict {
                    field: conflicting_field(&constraint),
                    constraint,
                }
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AccountsError::UnknownUser
            }
            sqlx::Error::RowNotFound => AccountsError::NotFound("record"),
            other => AccountsError::Database(other),
        }
    }
}

fn conflicting_field(constraint: &str) -> &'static str {
    match constraint {
        USERS_EMAIL_KEY => "email",
        USERS_USERNAME_KEY => "username",
        EMAIL_VERIFICATION_TOKENS_TOKEN_KEY | PASSWORD_RESET_TOKENS_TOKEN_KEY => "token",
        _ => "value",
    }
}

impl IntoResponse for AccountsError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            AccountsError::Conflict { .. } => JsonResponse::conflict(&message).into_response(),
            AccountsError::UnknownUser | AccountsError::Validation(_) => {
                JsonResponse::bad_request(&message).into_response()
            }
            AccountsError::InvalidToken => {
                JsonResponse::bad_request_with_code(&message, "invalid_token").into_response()
            }
            AccountsError::InvalidCredentials => {
                JsonResponse::unauthorized(&message).into_response()
            }
            AccountsError::ReadOnlyField(_) => {
                JsonResponse::bad_request_with_code(&message, "readonly_field").into_response()
            }
            AccountsError::NotFound(_) => JsonResponse::not_found(&message).into_response(),
            AccountsError::PasswordHash(_) | AccountsError::Database(_) => {
                error!(err = %message, "accounts request failed");
                JsonResponse::server_error("Something went wrong").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::db::integrity::{IntegrityViolation, EMAIL_VERIFICATION_TOKENS_USER_FKEY};

    #[test]
    fn unique_email_violation_becomes_conflict() {
        let err = AccountsError::from(IntegrityViolation::unique("users", USERS_EMAIL_KEY));
        match err {
            AccountsError::Conflict { field, constraint } => {
                assert_eq!(field, "email");
                assert_eq!(constraint, USERS_EMAIL_KEY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_token_value_becomes_conflict_on_token() {
        let err = AccountsError::from(IntegrityViolation::unique(
            "password_reset_tokens",
            PASSWORD_RESET_TOKENS_TOKEN_KEY,
        ));
        assert!(matches!(err, AccountsError::Conflict { field: "token", .. }));
    }

    #[test]
    fn foreign_key_violation_becomes_unknown_user() {
        let err = AccountsError::from(IntegrityViolation::foreign_key(
            "email_verification_tokens",
            EMAIL_VERIFICATION_TOKENS_USER_FKEY,
        ));
        assert!(matches!(err, AccountsError::UnknownUser));
    }

    #[test]
    fn other_database_errors_pass_through() {
        let err = AccountsError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AccountsError::Database(sqlx::Error::PoolTimedOut)));
    }

    #[test]
    fn status_codes() {
        let conflict = AccountsError::Conflict {
            field: "email",
            constraint: USERS_EMAIL_KEY.to_string(),
        };
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            AccountsError::UnknownUser.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AccountsError::NotFound("user").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AccountsError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AccountsError::Database(sqlx::Error::PoolClosed)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
