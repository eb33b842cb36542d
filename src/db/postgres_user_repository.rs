use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::user_repository::UserRepository,
    models::user::{NewUser, User},
    utils::email::normalize_email,
};

pub(crate) const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, \
     is_email_verified, is_active, is_staff, is_superuser, date_joined, last_login";

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (
                id, email, username, password_hash, first_name, last_name,
                is_email_verified, is_active, is_staff, is_superuser, date_joined
            )
            VALUES ($1, $2, $3, $4, $5, $6, false, true, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(new_user.id)
            .bind(&new_user.email)
            .bind(&new_user.username)
            .bind(&new_user.password_hash)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(new_user.is_staff)
            .bind(new_user.is_superuser)
            .bind(new_user.date_joined)
            .fetch_one(&self.pool)
            .await?;

        info!(user_id = %user.id, "created user");
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_email_verified = true WHERE id = $1 AND is_email_verified = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() == 1;
        if deleted {
            info!(%user_id, "deleted user and its tokens");
        }
        Ok(deleted)
    }
}
