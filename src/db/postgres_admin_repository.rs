use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    admin::{
        query::{AdminListQuery, AppliedFilter},
        record::{AdminPage, AdminTokenRow, AdminValue},
        AdminModel, FieldChange, FieldKind,
    },
    db::{admin_repository::AdminRepository, postgres_user_repository::USER_COLUMNS},
    models::{TokenKind, User},
};

const ADMIN_TOKEN_COLUMNS: &str = "t.id, t.user_id, u.email AS user_email, \
     u.username AS user_username, t.token, t.created_at, t.expires_at, t.is_used";

pub struct PostgresAdminRepository {
    pub pool: PgPool,
}

fn admin_model(kind: TokenKind) -> AdminModel {
    match kind {
        TokenKind::EmailVerification => AdminModel::EmailVerificationTokens,
        TokenKind::PasswordReset => AdminModel::PasswordResetTokens,
    }
}

/// SQL expression for an admin field. Token listings join the owner as `u`.
fn column(model: AdminModel, field: &str) -> Option<&'static str> {
    match model {
        AdminModel::Users => match field {
            "id" => Some("id"),
            "email" => Some("email"),
            "username" => Some("username"),
            "first_name" => Some("first_name"),
            "last_name" => Some("last_name"),
            "is_email_verified" => Some("is_email_verified"),
            "is_active" => Some("is_active"),
            "is_staff" => Some("is_staff"),
            "is_superuser" => Some("is_superuser"),
            "date_joined" => Some("date_joined"),
            "last_login" => Some("last_login"),
            _ => None,
        },
        AdminModel::EmailVerificationTokens | AdminModel::PasswordResetTokens => match field {
            "id" => Some("t.id"),
            "user" | "user_email" => Some("u.email"),
            "user_username" => Some("u.username"),
            "token" => Some("t.token"),
            "created_at" => Some("t.created_at"),
            "expires_at" => Some("t.expires_at"),
            "is_used" => Some("t.is_used"),
            _ => None,
        },
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, model: AdminModel, query: &AdminListQuery) {
    let admin = model.admin();
    let mut keyword = " WHERE ";

    for term in &query.search_terms {
        let pattern = like_pattern(term);
        builder.push(keyword).push("(");
        let searchable = admin
            .search_fields
            .iter()
            .filter_map(|field| column(model, field));
        for (i, col) in searchable.enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(col).push(" ILIKE ").push_bind(pattern.clone());
        }
        builder.push(")");
        keyword = " AND ";
    }

    for filter in &query.filters {
        match filter {
            AppliedFilter::Equals { field, value } => {
                let Some(col) = column(model, field) else { continue };
                builder.push(keyword).push(col).push(" = ").push_bind(*value);
            }
            AppliedFilter::Between { field, from, until } => {
                let Some(col) = column(model, field) else { continue };
                builder
                    .push(keyword)
                    .push("(")
                    .push(col)
                    .push(" >= ")
                    .push_bind(*from)
                    .push(" AND ")
                    .push(col)
                    .push(" < ")
                    .push_bind(*until)
                    .push(")");
            }
        }
        keyword = " AND ";
    }
}

fn push_ordering(builder: &mut QueryBuilder<'_, Postgres>, model: AdminModel, query: &AdminListQuery) {
    let admin = model.admin();
    builder.push(" ORDER BY ");
    for key in &query.ordering {
        let Some(col) = column(model, key.field) else { continue };
        // Text sorts case-insensitively by code point, the same order `MemoryStore` uses.
        if admin.field(key.field).map(|field| field.kind) == Some(FieldKind::Text) {
            builder.push("LOWER(").push(col).push(") COLLATE \"C\"");
        } else {
            builder.push(col);
        }
        builder.push(if key.descending { " DESC, " } else { " ASC, " });
    }
    // Stable pages when the requested keys tie.
    builder.push(column(model, "id").unwrap_or("id")).push(" ASC");
    builder
        .push(" LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset());
}

fn from_clause(model: AdminModel) -> String {
    match model.token_kind() {
        None => " FROM users".to_string(),
        Some(kind) => format!(" FROM {} t JOIN users u ON u.id = t.user_id", kind.table()),
    }
}

fn list_query(model: AdminModel, query: &AdminListQuery) -> QueryBuilder<'static, Postgres> {
    let columns = match model {
        AdminModel::Users => USER_COLUMNS,
        _ => ADMIN_TOKEN_COLUMNS,
    };
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {columns}"));
    builder.push(from_clause(model));
    push_conditions(&mut builder, model, query);
    push_ordering(&mut builder, model, query);
    builder
}

fn count_query(model: AdminModel, query: &AdminListQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) as count");
    builder.push(from_clause(model));
    push_conditions(&mut builder, model, query);
    builder
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &AdminValue) {
    match value {
        AdminValue::Null => {
            builder.push("NULL");
        }
        AdminValue::Bool(flag) => {
            builder.push_bind(*flag);
        }
        AdminValue::Text(text) => {
            builder.push_bind(text.clone());
        }
        AdminValue::Uuid(id) => {
            builder.push_bind(*id);
        }
        AdminValue::Timestamp(at) => {
            builder.push_bind(*at);
        }
    }
}

fn push_assignments(builder: &mut QueryBuilder<'_, Postgres>, changes: &[FieldChange]) {
    for (i, change) in changes.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(change.field).push(" = ");
        push_value(builder, &change.value);
    }
}

fn update_user_query(user_id: Uuid, changes: &[FieldChange]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET ");
    push_assignments(&mut builder, changes);
    builder
        .push(" WHERE id = ")
        .push_bind(user_id)
        .push(format!(" RETURNING {USER_COLUMNS}"));
    builder
}

fn update_token_query(
    kind: TokenKind,
    id: Uuid,
    changes: &[FieldChange],
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("WITH t AS (UPDATE {} SET ", kind.table()));
    push_assignments(&mut builder, changes);
    builder
        .push(" WHERE id = ")
        .push_bind(id)
        .push(format!(
            " RETURNING *) SELECT {ADMIN_TOKEN_COLUMNS} FROM t JOIN users u ON u.id = t.user_id"
        ));
    builder
}

impl PostgresAdminRepository {
    async fn count(&self, model: AdminModel, query: &AdminListQuery) -> Result<i64, sqlx::Error> {
        count_query(model, query)
            .build()
            .fetch_one(&self.pool)
            .await
            .map(|row: PgRow| row.get::<i64, _>("count"))
    }
}

#[async_trait]
impl AdminRepository for PostgresAdminRepository {
    async fn list_users(&self, query: &AdminListQuery) -> Result<AdminPage<User>, sqlx::Error> {
        let data: Vec<User> = list_query(AdminModel::Users, query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                error!(?err, "admin list_users failed to fetch rows");
                err
            })?;
        let total = self.count(AdminModel::Users, query).await?;

        Ok(AdminPage {
            data,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn list_tokens(
        &self,
        kind: TokenKind,
        query: &AdminListQuery,
    ) -> Result<AdminPage<AdminTokenRow>, sqlx::Error> {
        let model = admin_model(kind);
        let data: Vec<AdminTokenRow> = list_query(model, query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                error!(?err, token_kind = %kind, "admin list_tokens failed to fetch rows");
                err
            })?;
        let total = self.count(model, query).await?;

        Ok(AdminPage {
            data,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Option<User>, sqlx::Error> {
        let user: Option<User> = update_user_query(user_id, changes)
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        if user.is_some() {
            let fields: Vec<&str> = changes.iter().map(|c| c.field).collect();
            info!(%user_id, ?fields, "admin updated user");
        }
        Ok(user)
    }

    async fn update_token(
        &self,
        kind: TokenKind,
        id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Option<AdminTokenRow>, sqlx::Error> {
        let row: Option<AdminTokenRow> = update_token_query(kind, id, changes)
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        if row.is_some() {
            info!(token_id = %id, token_kind = %kind, "admin updated token");
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{query::SortKey, USER_ADMIN};
    use time::macros::datetime;

    fn normalize(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn user_list_uses_default_ordering() {
        let query = AdminListQuery::for_admin(&USER_ADMIN);
        let sql = normalize(list_query(AdminModel::Users, &query).sql());

        assert!(sql.starts_with("SELECT id, email, username"));
        assert!(sql.ends_with("FROM users ORDER BY date_joined DESC, id ASC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn text_ordering_ignores_case() {
        let mut query = AdminListQuery::for_admin(&USER_ADMIN);
        query.ordering = vec![
            SortKey {
                field: "username",
                descending: true,
            },
            SortKey {
                field: "is_staff",
                descending: false,
            },
        ];
        let sql = normalize(list_query(AdminModel::Users, &query).sql());
        assert!(sql.ends_with(
            "ORDER BY LOWER(username) COLLATE \"C\" DESC, is_staff ASC, id ASC LIMIT $1 OFFSET $2"
        ));
    }

    #[test]
    fn search_terms_and_filters_are_bound() {
        let mut query = AdminListQuery::for_admin(&USER_ADMIN);
        query.search_terms = vec!["ada".into(), "example".into()];
        query.filters = vec![AppliedFilter::Equals {
            field: "is_staff",
            value: true,
        }];

        let sql = normalize(count_query(AdminModel::Users, &query).sql());
        assert_eq!(
            sql,
            "SELECT COUNT(*) as count FROM users \
             WHERE (email ILIKE $1 OR username ILIKE $2) \
             AND (email ILIKE $3 OR username ILIKE $4) \
             AND is_staff = $5"
        );
    }

    #[test]
    fn token_list_joins_owner_for_search_and_date_range() {
        let mut query = AdminListQuery::for_admin(AdminModel::PasswordResetTokens.admin());
        query.search_terms = vec!["ada".into()];
        query.filters = vec![AppliedFilter::Between {
            field: "created_at",
            from: datetime!(2026-05-01 00:00 UTC),
            until: datetime!(2026-06-01 00:00 UTC),
        }];
        query.ordering = vec![SortKey {
            field: "user",
            descending: false,
        }];

        let sql = normalize(list_query(AdminModel::PasswordResetTokens, &query).sql());
        assert!(sql.contains("FROM password_reset_tokens t JOIN users u ON u.id = t.user_id"));
        assert!(sql.contains("WHERE (u.email ILIKE $1 OR u.username ILIKE $2)"));
        assert!(sql.contains("AND (t.created_at >= $3 AND t.created_at < $4)"));
        assert!(sql.ends_with("ORDER BY LOWER(u.email) COLLATE \"C\" ASC, t.id ASC LIMIT $5 OFFSET $6"));
    }

    #[test]
    fn update_statements() {
        let changes = [
            FieldChange {
                field: "is_active",
                value: AdminValue::Bool(false),
            },
            FieldChange {
                field: "email",
                value: AdminValue::Text("new@example.com".into()),
            },
        ];
        let sql = normalize(update_user_query(Uuid::nil(), &changes).sql());
        assert!(sql.starts_with("UPDATE users SET is_active = $1, email = $2 WHERE id = $3 RETURNING id,"));

        let sql = normalize(
            update_token_query(TokenKind::EmailVerification, Uuid::nil(), &changes[..1]).sql(),
        );
        assert!(sql.starts_with(
            "WITH t AS (UPDATE email_verification_tokens SET is_active = $1 WHERE id = $2 RETURNING *)"
        ));
        assert!(sql.ends_with("FROM t JOIN users u ON u.id = t.user_id"));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
