use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{token_repository::TokenRepository, user_repository::UserRepository};
use crate::errors::AccountsError;
use crate::models::{
    EmailVerificationToken, NewEmailVerificationToken, NewPasswordResetToken, NewUser,
    PasswordResetToken, TokenSettings, User,
};
use crate::utils::{clock::Clock, password::hash_password};

/// Account operations for host handlers: registration, login, token issue,
/// and the two consume-a-token flows.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        clock: Arc<dyn Clock>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            users,
            tokens,
            clock,
            settings,
        }
    }

    pub async fn register_user(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AccountsError> {
        if password.is_empty() {
            return Err(AccountsError::Validation("password is required".into()));
        }
        let new_user = NewUser::with_password(self.clock.as_ref(), email, username, password)?;
        Ok(self.users.create_user(&new_user).await?)
    }

    pub async fn issue_email_verification_token(
        &self,
        user_id: Uuid,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<EmailVerificationToken, AccountsError> {
        let new_token = NewEmailVerificationToken::issue(
            self.clock.as_ref(),
            user_id,
            expires_at,
            &self.settings,
        )?;
        Ok(self.tokens.insert_email_verification_token(&new_token).await?)
    }

    pub async fn issue_password_reset_token(
        &self,
        user_id: Uuid,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<PasswordResetToken, AccountsError> {
        let new_token = NewPasswordResetToken::issue(self.clock.as_ref(), user_id, expires_at)?;
        Ok(self.tokens.insert_password_reset_token(&new_token).await?)
    }

    /// Looks the user up by email and checks the password. Unknown, inactive
    /// and passwordless accounts all fail the same way.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountsError> {
        let Some(mut user) = self.users.find_user_by_email(email).await? else {
            debug!("login attempted for an unknown email");
            return Err(AccountsError::InvalidCredentials);
        };
        if !user.is_active || !user.check_password(password) {
            warn!(user_id = %user.id, "login rejected");
            return Err(AccountsError::InvalidCredentials);
        }

        let now = self.clock.now();
        self.users.record_login(user.id, now).await?;
        user.last_login = Some(now);
        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    /// Issues a fresh verification token for an unverified account. Returns
    /// `None` for unknown or already verified addresses.
    pub async fn resend_email_verification(
        &self,
        email: &str,
    ) -> Result<Option<EmailVerificationToken>, AccountsError> {
        let Some(user) = self.users.find_user_by_email(email).await? else {
            debug!("verification resend for an unknown email");
            return Ok(None);
        };
        if user.is_email_verified {
            info!(user_id = %user.id, "email already verified");
            return Ok(None);
        }
        self.issue_email_verification_token(user.id, None)
            .await
            .map(Some)
    }

    /// Issues a reset token for an active account. Returns `None` for
    /// unknown or inactive addresses.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetToken>, AccountsError> {
        match self.users.find_user_by_email(email).await? {
            Some(user) if user.is_active => self
                .issue_password_reset_token(user.id, None)
                .await
                .map(Some),
            _ => {
                debug!("password reset requested for an unknown or inactive email");
                Ok(None)
            }
        }
    }

    /// Consumes an email verification token and marks its owner verified.
    pub async fn verify_email(&self, token: Uuid) -> Result<User, AccountsError> {
        let now = self.clock.now();
        let user_id = self
            .tokens
            .consume_email_verification_token(token, now)
            .await?
            .ok_or(AccountsError::InvalidToken)?;

        self.users
            .find_user_by_id(user_id)
            .await?
            .ok_or(AccountsError::NotFound("user"))
    }

    /// The new password is hashed before the token is consumed.
    pub async fn reset_password(
        &self,
        token: Uuid,
        new_password: &str,
    ) -> Result<(), AccountsError> {
        if new_password.is_empty() {
            return Err(AccountsError::Validation("password is required".into()));
        }
        let password_hash =
            hash_password(new_password).map_err(|e| AccountsError::PasswordHash(e.to_string()))?;

        let now = self.clock.now();
        let Some(user_id) = self
            .tokens
            .consume_password_reset_token(token, now, &password_hash)
            .await?
        else {
            warn!("password reset attempted with an invalid token");
            return Err(AccountsError::InvalidToken);
        };

        info!(%user_id, "password reset");
        Ok(())
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AccountsError> {
        if self.users.delete_user(user_id).await? {
            Ok(())
        } else {
            Err(AccountsError::NotFound("user"))
        }
    }
}
