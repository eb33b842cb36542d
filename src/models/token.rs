use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::errors::AccountsError;
use crate::utils::clock::Clock;

pub const DEFAULT_EMAIL_VERIFICATION_EXPIRES_HOURS: i64 = 24;
/// Upper bound for the configurable email window (one year).
pub const MAX_EMAIL_VERIFICATION_EXPIRES_HOURS: i64 = 24 * 366;
/// Reset links get a short, fixed window; it is deliberately not configurable.
pub const PASSWORD_RESET_EXPIRES_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn table(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification_tokens",
            TokenKind::PasswordReset => "password_reset_tokens",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "Email verification token",
            TokenKind::PasswordReset => "Password reset token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        };
        f.write_str(s)
    }
}

/// Expiry windows handed to the token factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub email_verification_expires_hours: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            email_verification_expires_hours: DEFAULT_EMAIL_VERIFICATION_EXPIRES_HOURS,
        }
    }
}

impl TokenSettings {
    /// Hours outside `1..=MAX_EMAIL_VERIFICATION_EXPIRES_HOURS` are capped.
    pub fn email_verification_window(&self) -> Duration {
        Duration::hours(
            self.email_verification_expires_hours
                .clamp(1, MAX_EMAIL_VERIFICATION_EXPIRES_HOURS),
        )
    }

    pub fn password_reset_window(&self) -> Duration {
        Duration::hours(PASSWORD_RESET_EXPIRES_HOURS)
    }

    pub fn window(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::EmailVerification => self.email_verification_window(),
            TokenKind::PasswordReset => self.password_reset_window(),
        }
    }
}

/// A token is expired once `now` is strictly past `expires_at`.
pub fn is_expired(expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now > expires_at
}

/// Identity and timestamps shared by every freshly issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStamp {
    pub id: Uuid,
    pub token: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl TokenStamp {
    /// Reads the clock once; `expires_at` is the explicit value when given,
    /// otherwise `created_at + window`.
    pub fn issue(
        clock: &dyn Clock,
        expires_at: Option<OffsetDateTime>,
        window: Duration,
    ) -> Result<Self, AccountsError> {
        let created_at = clock.now().to_offset(UtcOffset::UTC);
        let expires_at = match expires_at {
            Some(explicit) => explicit.to_offset(UtcOffset::UTC),
            None => created_at.checked_add(window).ok_or_else(|| {
                AccountsError::Validation("token expiry is out of range".into())
            })?,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            token: Uuid::new_v4(),
            created_at,
            expires_at,
        })
    }
}

/// Read access shared by both persisted token kinds.
pub trait AccountToken {
    const KIND: TokenKind;

    fn id(&self) -> Uuid;
    fn user_id(&self) -> Uuid;
    fn token(&self) -> Uuid;
    fn created_at(&self) -> OffsetDateTime;
    fn expires_at(&self) -> OffsetDateTime;
    fn is_used(&self) -> bool;
    fn mark_used(&mut self);

    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        is_expired(self.expires_at(), now)
    }

    /// Unused and not yet expired.
    fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        !self.is_used() && !self.is_expired_at(now)
    }

    fn describe(&self, owner_email: &str) -> String {
        format!("{} for {}", Self::KIND.label(), owner_email)
    }
}
