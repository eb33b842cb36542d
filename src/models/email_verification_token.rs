use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::token::{AccountToken, TokenKind, TokenSettings, TokenStamp};
use crate::errors::AccountsError;
use crate::utils::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct EmailVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub is_used: bool,
}

/// Fully populated row ready to insert; `expires_at` is fixed from here on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmailVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl NewEmailVerificationToken {
    pub fn issue(
        clock: &dyn Clock,
        user_id: Uuid,
        expires_at: Option<OffsetDateTime>,
        settings: &TokenSettings,
    ) -> Result<Self, AccountsError> {
        let stamp = TokenStamp::issue(clock, expires_at, settings.email_verification_window())?;
        Ok(Self {
            id: stamp.id,
            user_id,
            token: stamp.token,
            created_at: stamp.created_at,
            expires_at: stamp.expires_at,
        })
    }

    pub fn into_token(self) -> EmailVerificationToken {
        EmailVerificationToken {
            id: self.id,
            user_id: self.user_id,
            token: self.token,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_used: false,
        }
    }
}

impl AccountToken for EmailVerificationToken {
    const KIND: TokenKind = TokenKind::EmailVerification;

    fn id(&self) -> Uuid {
        self.id
    }

    fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn token(&self) -> Uuid {
        self.token
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    fn is_used(&self) -> bool {
        self.is_used
    }

    fn mark_used(&mut self) {
        self.is_used = true;
    }
}
