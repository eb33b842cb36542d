use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::errors::AccountsError;
use crate::utils::{
    clock::Clock,
    email::validated_email,
    password::{hash_password, verify_password},
};

/// Account identity. Email is the login identifier; username is a required
/// secondary field.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_email_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_login: Option<OffsetDateTime>,
}

impl User {
    pub const LOGIN_FIELD: &'static str = "email";
    pub const REQUIRED_FIELDS: &'static [&'static str] = &["username"];

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Users created without a password (or with a blank hash) can never log in.
    pub fn has_usable_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    pub fn check_password(&self, password: &str) -> bool {
        self.has_usable_password()
            && verify_password(password, &self.password_hash).unwrap_or(false)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: OffsetDateTime,
}

impl NewUser {
    /// Validates and normalizes the identity fields. New users start active,
    /// unverified, and without staff rights.
    pub fn new(
        clock: &dyn Clock,
        email: &str,
        username: &str,
        password_hash: String,
    ) -> Result<Self, AccountsError> {
        let email = validated_email(email)?;

        let username = username.trim();
        if username.is_empty() {
            return Err(AccountsError::Validation("username is required".into()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            email,
            username: username.to_string(),
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            is_staff: false,
            is_superuser: false,
            date_joined: clock.now().to_offset(UtcOffset::UTC),
        })
    }

    pub fn with_password(
        clock: &dyn Clock,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, AccountsError> {
        let password_hash =
            hash_password(password).map_err(|e| AccountsError::PasswordHash(e.to_string()))?;
        Self::new(clock, email, username, password_hash)
    }

    pub fn with_names(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = first_name.trim().to_string();
        self.last_name = last_name.trim().to_string();
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    /// Superusers always get staff access as well.
    pub fn superuser(mut self) -> Self {
        self.is_staff = true;
        self.is_superuser = true;
        self
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            username: self.username,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            is_email_verified: false,
            is_active: true,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            date_joined: self.date_joined,
            last_login: None,
        }
    }
}
