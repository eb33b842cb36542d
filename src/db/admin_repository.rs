use async_trait::async_trait;
use uuid::Uuid;

use crate::admin::{
    query::AdminListQuery,
    record::{AdminPage, AdminTokenRow},
    FieldChange,
};
use crate::models::{TokenKind, User};

/// Listing and editing behind the admin routes. Queries and changes arrive
/// already validated against the model's descriptor.
#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn list_users(&self, query: &AdminListQuery) -> Result<AdminPage<User>, sqlx::Error>;
    async fn list_tokens(
        &self,
        kind: TokenKind,
        query: &AdminListQuery,
    ) -> Result<AdminPage<AdminTokenRow>, sqlx::Error>;
    async fn update_user(
        &self,
        user_id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Option<User>, sqlx::Error>;
    async fn update_token(
        &self,
        kind: TokenKind,
        id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Option<AdminTokenRow>, sqlx::Error>;
}
