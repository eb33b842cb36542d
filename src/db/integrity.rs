use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use sqlx::error::{BoxDynError, DatabaseError, ErrorKind};

pub const USERS_EMAIL_KEY: &str = "users_email_key";
pub const USERS_USERNAME_KEY: &str = "users_username_key";
pub const EMAIL_VERIFICATION_TOKENS_TOKEN_KEY: &str = "email_verification_tokens_token_key";
pub const EMAIL_VERIFICATION_TOKENS_USER_FKEY: &str = "email_verification_tokens_user_id_fkey";
pub const PASSWORD_RESET_TOKENS_TOKEN_KEY: &str = "password_reset_tokens_token_key";
pub const PASSWORD_RESET_TOKENS_USER_FKEY: &str = "password_reset_tokens_user_id_fkey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    Unique,
    ForeignKey,
}

/// Postgres-shaped integrity error raised by stores that enforce constraints
/// themselves, so callers see the same `sqlx::Error::Database` either way.
#[derive(Debug)]
pub struct IntegrityViolation {
    kind: Violation,
    table: &'static str,
    constraint: &'static str,
    message: String,
}

impl IntegrityViolation {
    pub fn unique(table: &'static str, constraint: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(Self {
            kind: Violation::Unique,
            table,
            constraint,
            message: format!("duplicate key value violates unique constraint \"{constraint}\""),
        }))
    }

    pub fn foreign_key(table: &'static str, constraint: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(Self {
            kind: Violation::ForeignKey,
            table,
            constraint,
            message: format!(
                "insert or update on table \"{table}\" violates foreign key constraint \"{constraint}\""
            ),
        }))
    }
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for IntegrityViolation {}

impl DatabaseError for IntegrityViolation {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(match self.kind {
            Violation::Unique => "23505",
            Violation::ForeignKey => "23503",
        }))
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn table(&self) -> Option<&str> {
        Some(self.table)
    }

    fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> BoxDynError {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self.kind {
            Violation::Unique => ErrorKind::UniqueViolation,
            Violation::ForeignKey => ErrorKind::ForeignKeyViolation,
        }
    }
}
