use std::cmp::Ordering;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use sqlx::FromRow;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::models::{AccountToken, User};

/// A single field value as the admin sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminValue {
    Null,
    Bool(bool),
    Text(String),
    Uuid(Uuid),
    Timestamp(OffsetDateTime),
}

impl AdminValue {
    pub fn to_json(&self) -> Value {
        match self {
            AdminValue::Null => Value::Null,
            AdminValue::Bool(flag) => Value::Bool(*flag),
            AdminValue::Text(text) => Value::String(text.clone()),
            AdminValue::Uuid(id) => Value::String(id.to_string()),
            AdminValue::Timestamp(at) => at.format(&Rfc3339).map(Value::String).unwrap_or(Value::Null),
        }
    }

    /// Nulls sort after every value, as they do in Postgres ascending order.
    /// Text compares case-insensitively.
    pub fn compare(&self, other: &AdminValue) -> Ordering {
        match (self, other) {
            (AdminValue::Null, AdminValue::Null) => Ordering::Equal,
            (AdminValue::Null, _) => Ordering::Greater,
            (_, AdminValue::Null) => Ordering::Less,
            (AdminValue::Bool(a), AdminValue::Bool(b)) => a.cmp(b),
            (AdminValue::Text(a), AdminValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (AdminValue::Uuid(a), AdminValue::Uuid(b)) => a.cmp(b),
            (AdminValue::Timestamp(a), AdminValue::Timestamp(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl Serialize for AdminValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Field access by name for rows shown in the admin.
pub trait AdminRecord {
    fn record_id(&self) -> Uuid;
    fn value(&self, field: &str) -> AdminValue;
}

impl AdminRecord for User {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn value(&self, field: &str) -> AdminValue {
        match field {
            "id" => AdminValue::Uuid(self.id),
            "email" => AdminValue::Text(self.email.clone()),
            "username" => AdminValue::Text(self.username.clone()),
            "first_name" => AdminValue::Text(self.first_name.clone()),
            "last_name" => AdminValue::Text(self.last_name.clone()),
            "is_email_verified" => AdminValue::Bool(self.is_email_verified),
            "is_active" => AdminValue::Bool(self.is_active),
            "is_staff" => AdminValue::Bool(self.is_staff),
            "is_superuser" => AdminValue::Bool(self.is_superuser),
            "date_joined" => AdminValue::Timestamp(self.date_joined),
            "last_login" => self
                .last_login
                .map(AdminValue::Timestamp)
                .unwrap_or(AdminValue::Null),
            _ => AdminValue::Null,
        }
    }
}

/// A token joined with its owner, the shape both token admins list.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AdminTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_username: String,
    pub token: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub is_used: bool,
}

impl AdminTokenRow {
    pub fn from_token<T: AccountToken>(token: &T, owner: &User) -> Self {
        Self {
            id: token.id(),
            user_id: token.user_id(),
            user_email: owner.email.clone(),
            user_username: owner.username.clone(),
            token: token.token(),
            created_at: token.created_at(),
            expires_at: token.expires_at(),
            is_used: token.is_used(),
        }
    }
}

impl AdminRecord for AdminTokenRow {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn value(&self, field: &str) -> AdminValue {
        match field {
            "id" => AdminValue::Uuid(self.id),
            // Owners render by their email, like `User`'s Display.
            "user" | "user_email" => AdminValue::Text(self.user_email.clone()),
            "user_username" => AdminValue::Text(self.user_username.clone()),
            "token" => AdminValue::Uuid(self.token),
            "created_at" => AdminValue::Timestamp(self.created_at),
            "expires_at" => AdminValue::Timestamp(self.expires_at),
            "is_used" => AdminValue::Bool(self.is_used),
            _ => AdminValue::Null,
        }
    }
}

/// Picks `fields` (plus `id`) out of a record as a JSON object.
pub fn project(record: &dyn AdminRecord, fields: &[&str]) -> Map<String, Value> {
    let mut row = Map::with_capacity(fields.len() + 1);
    row.insert("id".into(), Value::String(record.record_id().to_string()));
    for field in fields {
        row.insert((*field).to_string(), record.value(field).to_json());
    }
    row
}

#[derive(Debug, Serialize)]
pub struct AdminPage<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> AdminPage<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> AdminPage<U> {
        AdminPage {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}
