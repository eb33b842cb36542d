use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    EmailVerificationToken, NewEmailVerificationToken, NewPasswordResetToken, PasswordResetToken,
};

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert_email_verification_token(
        &self,
        new_token: &NewEmailVerificationToken,
    ) -> Result<EmailVerificationToken, sqlx::Error>;
    async fn find_email_verification_token(
        &self,
        token: Uuid,
    ) -> Result<Option<EmailVerificationToken>, sqlx::Error>;
    /// Consumes the token if it is unused and unexpired at `now`, returning its owner.
    async fn mark_email_verification_token_used(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    /// Consumes the token and marks its owner verified in one transaction.
    async fn consume_email_verification_token(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    async fn list_email_verification_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<EmailVerificationToken>, sqlx::Error>;

    async fn insert_password_reset_token(
        &self,
        new_token: &NewPasswordResetToken,
    ) -> Result<PasswordResetToken, sqlx::Error>;
    async fn find_password_reset_token(
        &self,
        token: Uuid,
    ) -> Result<Option<PasswordResetToken>, sqlx::Error>;
    async fn mark_password_reset_token_used(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    /// Consumes the token and stores the owner's new password hash in one
    /// transaction. Nothing changes when the token is not valid at `now`.
    async fn consume_password_reset_token(
        &self,
        token: Uuid,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    async fn list_password_reset_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordResetToken>, sqlx::Error>;
}
