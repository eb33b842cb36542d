use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::token_repository::TokenRepository,
    models::{
        AccountToken, EmailVerificationToken, NewEmailVerificationToken, NewPasswordResetToken,
        PasswordResetToken, TokenKind,
    },
};

const TOKEN_COLUMNS: &str = "id, user_id, token, created_at, expires_at, is_used";

pub struct PostgresTokenRepository {
    pub pool: PgPool,
}

fn mark_used_query(kind: TokenKind) -> String {
    format!(
        r#"
        UPDATE {table}
        SET is_used = true
        WHERE token = $1
          AND is_used = false
          AND expires_at >= $2
        RETURNING user_id
        "#,
        table = kind.table()
    )
}

/// Both token tables share one layout, so every statement is written once and
/// pointed at the table of `T::KIND`.
impl PostgresTokenRepository {
    async fn insert<T>(
        &self,
        id: Uuid,
        user_id: Uuid,
        token: Uuid,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<T, sqlx::Error>
    where
        T: AccountToken + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = format!(
            r#"
            INSERT INTO {table} (id, user_id, token, created_at, expires_at, is_used)
            VALUES ($1, $2, $3, $4, $5, false)
            RETURNING {TOKEN_COLUMNS}
            "#,
            table = T::KIND.table()
        );

        let row = sqlx::query_as::<_, T>(&query)
            .bind(id)
            .bind(user_id)
            .bind(token)
            .bind(created_at)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?;

        info!(%user_id, token_kind = %T::KIND, expires_at = %row.expires_at(), "issued token");
        Ok(row)
    }

    async fn find<T>(&self, token: Uuid) -> Result<Option<T>, sqlx::Error>
    where
        T: AccountToken + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM {table} WHERE token = $1",
            table = T::KIND.table()
        );
        sqlx::query_as::<_, T>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
    }

    /// Single conditional UPDATE so concurrent callers cannot both consume it.
    async fn mark_used<T>(&self, token: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>, sqlx::Error>
    where
        T: AccountToken,
    {
        let user_id: Option<Uuid> = sqlx::query_scalar(&mark_used_query(T::KIND))
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        if user_id.is_none() {
            debug!(token_kind = %T::KIND, "token missing, used, or expired");
        }
        Ok(user_id)
    }

    /// Marks the token used and runs `owner_update` (bound to the owner id as
    /// `$1`, then `extra`) in the same transaction.
    async fn consume<T>(
        &self,
        token: Uuid,
        now: OffsetDateTime,
        owner_update: &str,
        extra: Option<&str>,
    ) -> Result<Option<Uuid>, sqlx::Error>
    where
        T: AccountToken,
    {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<Uuid> = sqlx::query_scalar(&mark_used_query(T::KIND))
            .bind(token)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(user_id) = user_id else {
            debug!(token_kind = %T::KIND, "token missing, used, or expired");
            return Ok(None);
        };

        let mut update = sqlx::query(owner_update).bind(user_id);
        if let Some(value) = extra {
            update = update.bind(value);
        }
        if update.execute(&mut *tx).await?.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        tx.commit().await?;
        info!(%user_id, token_kind = %T::KIND, "consumed token");
        Ok(Some(user_id))
    }

    async fn list_for_user<T>(&self, user_id: Uuid) -> Result<Vec<T>, sqlx::Error>
    where
        T: AccountToken + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM {table} WHERE user_id = $1 ORDER BY created_at DESC, id",
            table = T::KIND.table()
        );
        sqlx::query_as::<_, T>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }
}

#[async_trait]
impl TokenRepository for PostgresTokenRepository {
    async fn insert_email_verification_token(
        &self,
        new_token: &NewEmailVerificationToken,
    ) -> Result<EmailVerificationToken, sqlx::Error> {
        self.insert(
            new_token.id,
            new_token.user_id,
            new_token.token,
            new_token.created_at,
            new_token.expires_at,
        )
        .await
    }

    async fn find_email_verification_token(
        &self,
        token: Uuid,
    ) -> Result<Option<EmailVerificationToken>, sqlx::Error> {
        self.find(token).await
    }

    async fn mark_email_verification_token_used(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.mark_used::<EmailVerificationToken>(token, now).await
    }

    async fn consume_email_verification_token(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.consume::<EmailVerificationToken>(
            token,
            now,
            "UPDATE users SET is_email_verified = true WHERE id = $1",
            None,
        )
        .await
    }

    async fn list_email_verification_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<EmailVerificationToken>, sqlx::Error> {
        self.list_for_user(user_id).await
    }

    async fn insert_password_reset_token(
        &self,
        new_token: &NewPasswordResetToken,
    ) -> Result<PasswordResetToken, sqlx::Error> {
        self.insert(
            new_token.id,
            new_token.user_id,
            new_token.token,
            new_token.created_at,
            new_token.expires_at,
        )
        .await
    }

    async fn find_password_reset_token(
        &self,
        token: Uuid,
    ) -> Result<Option<PasswordResetToken>, sqlx::Error> {
        self.find(token).await
    }

    async fn mark_password_reset_token_used(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.mark_used::<PasswordResetToken>(token, now).await
    }

    async fn consume_password_reset_token(
        &self,
        token: Uuid,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.consume::<PasswordResetToken>(
            token,
            now,
            "UPDATE users SET password_hash = $2 WHERE id = $1",
            Some(password_hash),
        )
        .await
    }

    async fn list_password_reset_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordResetToken>, sqlx::Error> {
        self.list_for_user(user_id).await
    }
}
