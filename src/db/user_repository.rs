use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::user::{NewUser, User};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, sqlx::Error>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;
    /// Looks the address up in its normalized form.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    /// Flips `is_email_verified` to true. Returns false when the user was
    /// already verified or does not exist.
    async fn mark_email_verified(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;
    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> Result<(), sqlx::Error>;
    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error>;
    /// Deletes the user and, through the foreign keys, every token it owns.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;
}
