use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{
    admin::{
        query::{AdminListQuery, AppliedFilter},
        record::{AdminPage, AdminRecord, AdminTokenRow, AdminValue},
        AdminModel, FieldChange,
    },
    db::{
        admin_repository::AdminRepository,
        integrity::{
            IntegrityViolation, EMAIL_VERIFICATION_TOKENS_TOKEN_KEY,
            EMAIL_VERIFICATION_TOKENS_USER_FKEY, PASSWORD_RESET_TOKENS_TOKEN_KEY,
            PASSWORD_RESET_TOKENS_USER_FKEY, USERS_EMAIL_KEY, USERS_USERNAME_KEY,
        },
        token_repository::TokenRepository,
        user_repository::UserRepository,
    },
    models::{
        AccountToken, EmailVerificationToken, NewEmailVerificationToken, NewPasswordResetToken,
        NewUser, PasswordResetToken, TokenKind, User,
    },
    utils::email::normalize_email,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    email_tokens: HashMap<Uuid, EmailVerificationToken>,
    reset_tokens: HashMap<Uuid, PasswordResetToken>,
}

/// In-process store with the same constraints as the Postgres schema:
/// unique email, username and token values, tokens must reference an
/// existing user, and deleting a user removes its tokens. Violations come
/// back as `sqlx::Error::Database` so callers classify them the same way.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn check_user_unique(&self, user: &User) -> Result<(), sqlx::Error> {
        let others = self.users.values().filter(|other| other.id != user.id);
        for other in others {
            if other.email == user.email {
                return Err(IntegrityViolation::unique("users", USERS_EMAIL_KEY));
            }
            if other.username == user.username {
                return Err(IntegrityViolation::unique("users", USERS_USERNAME_KEY));
            }
        }
        Ok(())
    }

    fn token_rows<T: AccountToken>(&self, tokens: &HashMap<Uuid, T>) -> Vec<AdminTokenRow> {
        tokens
            .values()
            .filter_map(|token| {
                self.users
                    .get(&token.user_id())
                    .map(|owner| AdminTokenRow::from_token(token, owner))
            })
            .collect()
    }

    fn admin_token_row(&self, kind: TokenKind, id: Uuid) -> Option<AdminTokenRow> {
        match kind {
            TokenKind::EmailVerification => {
                let token = self.email_tokens.get(&id)?;
                let owner = self.users.get(&token.user_id)?;
                Some(AdminTokenRow::from_token(token, owner))
            }
            TokenKind::PasswordReset => {
                let token = self.reset_tokens.get(&id)?;
                let owner = self.users.get(&token.user_id)?;
                Some(AdminTokenRow::from_token(token, owner))
            }
        }
    }
}

fn insert_token<T: AccountToken + Clone>(
    users: &HashMap<Uuid, User>,
    tokens: &mut HashMap<Uuid, T>,
    token: T,
    (token_key, user_fkey): (&'static str, &'static str),
) -> Result<T, sqlx::Error> {
    let table = T::KIND.table();
    if !users.contains_key(&token.user_id()) {
        return Err(IntegrityViolation::foreign_key(table, user_fkey));
    }
    if tokens
        .values()
        .any(|existing| existing.id() == token.id() || existing.token() == token.token())
    {
        return Err(IntegrityViolation::unique(table, token_key));
    }

    info!(user_id = %token.user_id(), token_kind = %T::KIND, "issued token");
    tokens.insert(token.id(), token.clone());
    Ok(token)
}

fn find_token<T: AccountToken + Clone>(tokens: &HashMap<Uuid, T>, token: Uuid) -> Option<T> {
    tokens.values().find(|row| row.token() == token).cloned()
}

fn mark_token_used<T: AccountToken>(
    tokens: &mut HashMap<Uuid, T>,
    token: Uuid,
    now: OffsetDateTime,
) -> Option<Uuid> {
    let row = tokens
        .values_mut()
        .find(|row| row.token() == token && row.is_valid_at(now))?;
    row.mark_used();
    Some(row.user_id())
}

fn valid_owner<T: AccountToken>(
    tokens: &HashMap<Uuid, T>,
    token: Uuid,
    now: OffsetDateTime,
) -> Option<Uuid> {
    tokens
        .values()
        .find(|row| row.token() == token && row.is_valid_at(now))
        .map(|row| row.user_id())
}

fn tokens_for_user<T: AccountToken + Clone>(tokens: &HashMap<Uuid, T>, user_id: Uuid) -> Vec<T> {
    let mut rows: Vec<T> = tokens
        .values()
        .filter(|row| row.user_id() == user_id)
        .cloned()
        .collect();
    rows.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
    rows
}

fn set_used(is_used: &mut bool, changes: &[FieldChange]) {
    for change in changes {
        if let ("is_used", AdminValue::Bool(flag)) = (change.field, &change.value) {
            *is_used = *flag;
        }
    }
}

fn matches_query(record: &dyn AdminRecord, model: AdminModel, query: &AdminListQuery) -> bool {
    let admin = model.admin();
    let searched = query.search_terms.iter().all(|term| {
        let term = term.to_lowercase();
        admin.search_fields.iter().any(|field| match record.value(field) {
            AdminValue::Text(text) => text.to_lowercase().contains(&term),
            _ => false,
        })
    });

    searched
        && query.filters.iter().all(|filter| match filter {
            AppliedFilter::Equals { field, value } => record.value(field) == AdminValue::Bool(*value),
            AppliedFilter::Between { field, from, until } => match record.value(field) {
                AdminValue::Timestamp(at) => *from <= at && at < *until,
                _ => false,
            },
        })
}

/// Filters, orders and pages in memory the way the SQL listing does.
fn page_of<R: AdminRecord>(mut rows: Vec<R>, model: AdminModel, query: &AdminListQuery) -> AdminPage<R> {
    rows.retain(|row| matches_query(row, model, query));
    rows.sort_by(|a, b| {
        query
            .ordering
            .iter()
            .map(|key| {
                let ord = a.value(key.field).compare(&b.value(key.field));
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.record_id().cmp(&b.record_id()))
    });

    let total = rows.len() as i64;
    let data = rows
        .into_iter()
        .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
        .take(query.limit as usize)
        .collect();

    AdminPage {
        data,
        total,
        page: query.page,
        limit: query.limit,
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, sqlx::Error> {
        let mut tables = self.tables.lock().await;
        let user = new_user.clone().into_user();
        if tables.users.contains_key(&user.id) {
            return Err(IntegrityViolation::unique("users", "users_pkey"));
        }
        tables.check_user_unique(&user)?;

        tables.users.insert(user.id, user.clone());
        info!(user_id = %user.id, "created user");
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let email = normalize_email(email);
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&user_id) {
            Some(user) if !user.is_email_verified => {
                user.is_email_verified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> Result<(), sqlx::Error> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        tables.email_tokens.retain(|_, token| token.user_id != user_id);
        tables.reset_tokens.retain(|_, token| token.user_id != user_id);
        info!(%user_id, "deleted user and its tokens");
        Ok(true)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert_email_verification_token(
        &self,
        new_token: &NewEmailVerificationToken,
    ) -> Result<EmailVerificationToken, sqlx::Error> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        insert_token(
            &tables.users,
            &mut tables.email_tokens,
            new_token.clone().into_token(),
            (
                EMAIL_VERIFICATION_TOKENS_TOKEN_KEY,
                EMAIL_VERIFICATION_TOKENS_USER_FKEY,
            ),
        )
    }

    async fn find_email_verification_token(
        &self,
        token: Uuid,
    ) -> Result<Option<EmailVerificationToken>, sqlx::Error> {
        Ok(find_token(&self.tables.lock().await.email_tokens, token))
    }

    async fn mark_email_verification_token_used(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(mark_token_used(
            &mut self.tables.lock().await.email_tokens,
            token,
            now,
        ))
    }

    async fn consume_email_verification_token(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let Some(user_id) = valid_owner(&tables.email_tokens, token, now) else {
            return Ok(None);
        };
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.is_email_verified = true;
        mark_token_used(&mut tables.email_tokens, token, now);
        Ok(Some(user_id))
    }

    async fn list_email_verification_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<EmailVerificationToken>, sqlx::Error> {
        Ok(tokens_for_user(&self.tables.lock().await.email_tokens, user_id))
    }

    async fn insert_password_reset_token(
        &self,
        new_token: &NewPasswordResetToken,
    ) -> Result<PasswordResetToken, sqlx::Error> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        insert_token(
            &tables.users,
            &mut tables.reset_tokens,
            new_token.clone().into_token(),
            (PASSWORD_RESET_TOKENS_TOKEN_KEY, PASSWORD_RESET_TOKENS_USER_FKEY),
        )
    }

    async fn find_password_reset_token(
        &self,
        token: Uuid,
    ) -> Result<Option<PasswordResetToken>, sqlx::Error> {
        Ok(find_token(&self.tables.lock().await.reset_tokens, token))
    }

    async fn mark_password_reset_token_used(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(mark_token_used(
            &mut self.tables.lock().await.reset_tokens,
            token,
            now,
        ))
    }

    async fn consume_password_reset_token(
        &self,
        token: Uuid,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let Some(user_id) = valid_owner(&tables.reset_tokens, token, now) else {
            return Ok(None);
        };
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.password_hash = password_hash.to_string();
        mark_token_used(&mut tables.reset_tokens, token, now);
        Ok(Some(user_id))
    }

    async fn list_password_reset_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordResetToken>, sqlx::Error> {
        Ok(tokens_for_user(&self.tables.lock().await.reset_tokens, user_id))
    }
}

#[async_trait]
impl AdminRepository for MemoryStore {
    async fn list_users(&self, query: &AdminListQuery) -> Result<AdminPage<User>, sqlx::Error> {
        let rows: Vec<User> = self.tables.lock().await.users.values().cloned().collect();
        Ok(page_of(rows, AdminModel::Users, query))
    }

    async fn list_tokens(
        &self,
        kind: TokenKind,
        query: &AdminListQuery,
    ) -> Result<AdminPage<AdminTokenRow>, sqlx::Error> {
        let tables = self.tables.lock().await;
        let (rows, model) = match kind {
            TokenKind::EmailVerification => (
                tables.token_rows(&tables.email_tokens),
                AdminModel::EmailVerificationTokens,
            ),
            TokenKind::PasswordReset => (
                tables.token_rows(&tables.reset_tokens),
                AdminModel::PasswordResetTokens,
            ),
        };
        Ok(page_of(rows, model, query))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Option<User>, sqlx::Error> {
        let mut tables = self.tables.lock().await;
        let Some(mut user) = tables.users.get(&user_id).cloned() else {
            return Ok(None);
        };

        for change in changes {
            match (change.field, &change.value) {
                ("email", AdminValue::Text(v)) => user.email = v.clone(),
                ("username", AdminValue::Text(v)) => user.username = v.clone(),
                ("first_name", AdminValue::Text(v)) => user.first_name = v.clone(),
                ("last_name", AdminValue::Text(v)) => user.last_name = v.clone(),
                ("is_email_verified", AdminValue::Bool(v)) => user.is_email_verified = *v,
                ("is_active", AdminValue::Bool(v)) => user.is_active = *v,
                ("is_staff", AdminValue::Bool(v)) => user.is_staff = *v,
                ("is_superuser", AdminValue::Bool(v)) => user.is_superuser = *v,
                _ => {}
            }
        }

        tables.check_user_unique(&user)?;
        tables.users.insert(user_id, user.clone());
        Ok(Some(user))
    }

    async fn update_token(
        &self,
        kind: TokenKind,
        id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Option<AdminTokenRow>, sqlx::Error> {
        let mut tables = self.tables.lock().await;
        match kind {
            TokenKind::EmailVerification => match tables.email_tokens.get_mut(&id) {
                Some(token) => set_used(&mut token.is_used, changes),
                None => return Ok(None),
            },
            TokenKind::PasswordReset => match tables.reset_tokens.get_mut(&id) {
                Some(token) => set_used(&mut token.is_used, changes),
                None => return Ok(None),
            },
        }
        Ok(tables.admin_token_row(kind, id))
    }
}
