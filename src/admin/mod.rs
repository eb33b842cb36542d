//! Admin registration for the account models.
//!
//! Each [`ModelAdmin`] declares which fields an admin UI lists, filters,
//! searches, and may not edit. The descriptors drive list queries against
//! both stores and the JSON surface in `routes::admin`.

pub mod query;
pub mod record;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AccountsError;
use crate::models::TokenKind;
use crate::utils::email::validated_email;

use self::record::AdminValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminModel {
    Users,
    EmailVerificationTokens,
    PasswordResetTokens,
}

impl AdminModel {
    pub const ALL: [AdminModel; 3] = [
        AdminModel::Users,
        AdminModel::EmailVerificationTokens,
        AdminModel::PasswordResetTokens,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            AdminModel::Users => "users",
            AdminModel::EmailVerificationTokens => "email-verification-tokens",
            AdminModel::PasswordResetTokens => "password-reset-tokens",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.slug() == slug)
    }

    pub fn token_kind(self) -> Option<TokenKind> {
        match self {
            AdminModel::Users => None,
            AdminModel::EmailVerificationTokens => Some(TokenKind::EmailVerification),
            AdminModel::PasswordResetTokens => Some(TokenKind::PasswordReset),
        }
    }

    pub fn admin(self) -> &'static ModelAdmin {
        match self {
            AdminModel::Users => &USER_ADMIN,
            AdminModel::EmailVerificationTokens => &EMAIL_VERIFICATION_TOKEN_ADMIN,
            AdminModel::PasswordResetTokens => &PASSWORD_RESET_TOKEN_ADMIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Uuid,
    Text,
    Bool,
    Timestamp,
}

#[derive(Debug, Serialize)]
pub struct AdminField {
    pub name: &'static str,
    pub kind: FieldKind,
    /// False for keys and for values joined in from the owning user.
    pub editable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Boolean,
    DateRange,
}

#[derive(Debug, Serialize)]
pub struct ListFilter {
    pub field: &'static str,
    pub kind: FilterKind,
}

#[derive(Debug, Serialize)]
pub struct Fieldset {
    pub title: Option<&'static str>,
    pub fields: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct ModelAdmin {
    pub model: AdminModel,
    pub verbose_name: &'static str,
    pub fields: &'static [AdminField],
    pub list_display: &'static [&'static str],
    pub list_filter: &'static [ListFilter],
    pub search_fields: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    /// Default ordering; a leading `-` sorts descending.
    pub ordering: &'static [&'static str],
    pub fieldsets: &'static [Fieldset],
}

/// A validated edit to one field of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub value: AdminValue,
}

impl ModelAdmin {
    pub fn field(&self, name: &str) -> Option<&'static AdminField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn filter(&self, name: &str) -> Option<&'static ListFilter> {
        self.list_filter.iter().find(|filter| filter.field == name)
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.readonly_fields.contains(&name)
    }

    /// Fields shown on the change form (all fields when no fieldsets are
    /// declared) minus read-only and non-editable ones.
    pub fn editable_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|field| field.editable && !self.is_readonly(field.name))
            .filter(|field| {
                self.fieldsets.is_empty()
                    || self
                        .fieldsets
                        .iter()
                        .any(|set| set.fields.contains(&field.name))
            })
            .map(|field| field.name)
            .collect()
    }

    /// Refuses a change set that touches any read-only field.
    pub fn reject_readonly<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), AccountsError> {
        match fields.into_iter().find(|name| self.is_readonly(name)) {
            Some(name) => Err(AccountsError::ReadOnlyField(name.to_string())),
            None => Ok(()),
        }
    }

    /// Checks a JSON patch against the descriptor and converts it into typed
    /// changes. Read-only fields are refused outright.
    pub fn validate_changes(
        &self,
        changes: &Map<String, Value>,
    ) -> Result<Vec<FieldChange>, AccountsError> {
        if changes.is_empty() {
            return Err(AccountsError::Validation("no changes supplied".into()));
        }
        self.reject_readonly(changes.keys().map(String::as_str))?;

        let editable = self.editable_fields();
        let mut validated = Vec::with_capacity(changes.len());

        for (name, value) in changes {
            let field = self
                .field(name)
                .ok_or_else(|| AccountsError::Validation(format!("unknown field `{name}`")))?;
            if !editable.contains(&field.name) {
                return Err(AccountsError::ReadOnlyField(field.name.to_string()));
            }

            let value = match (field.kind, value) {
                (FieldKind::Bool, Value::Bool(flag)) => AdminValue::Bool(*flag),
                (FieldKind::Text, Value::String(text)) => AdminValue::Text(text.trim().to_string()),
                _ => {
                    return Err(AccountsError::Validation(format!(
                        "`{name}` expects a {:?} value",
                        field.kind
                    )))
                }
            };

            validated.push(FieldChange {
                field: field.name,
                value: self.check_field_rules(field.name, value)?,
            });
        }

        Ok(validated)
    }

    fn check_field_rules(
        &self,
        field: &'static str,
        value: AdminValue,
    ) -> Result<AdminValue, AccountsError> {
        match (self.model, field, value) {
            (AdminModel::Users, "email", AdminValue::Text(email)) => {
                validated_email(&email).map(AdminValue::Text)
            }
            (AdminModel::Users, "username", AdminValue::Text(username)) if username.is_empty() => {
                Err(AccountsError::Validation("username is required".into()))
            }
            (AdminModel::Users, "is_email_verified", AdminValue::Bool(false)) => Err(
                AccountsError::Validation("email verification cannot be revoked".into()),
            ),
            (_, _, value) => Ok(value),
        }
    }
}

const TOKEN_FIELDS: &[AdminField] = &[
    AdminField {
        name: "id",
        kind: FieldKind::Uuid,
        editable: false,
    },
    AdminField {
        name: "user",
        kind: FieldKind::Text,
        editable: false,
    },
    AdminField {
        name: "user_email",
        kind: FieldKind::Text,
        editable: false,
    },
    AdminField {
        name: "user_username",
        kind: FieldKind::Text,
        editable: false,
    },
    AdminField {
        name: "token",
        kind: FieldKind::Uuid,
        editable: true,
    },
    AdminField {
        name: "created_at",
        kind: FieldKind::Timestamp,
        editable: false,
    },
    AdminField {
        name: "expires_at",
        kind: FieldKind::Timestamp,
        editable: true,
    },
    AdminField {
        name: "is_used",
        kind: FieldKind::Bool,
        editable: true,
    },
];

const TOKEN_LIST_DISPLAY: &[&str] = &["user", "token", "created_at", "expires_at", "is_used"];

const TOKEN_LIST_FILTER: &[ListFilter] = &[
    ListFilter {
        field: "is_used",
        kind: FilterKind::Boolean,
    },
    ListFilter {
        field: "created_at",
        kind: FilterKind::DateRange,
    },
];

const TOKEN_SEARCH_FIELDS: &[&str] = &["user_email", "user_username"];
const TOKEN_READONLY_FIELDS: &[&str] = &["token", "created_at", "expires_at"];
const TOKEN_ORDERING: &[&str] = &["-created_at"];

pub static USER_ADMIN: ModelAdmin = ModelAdmin {
    model: AdminModel::Users,
    verbose_name: "user",
    fields: &[
        AdminField {
            name: "id",
            kind: FieldKind::Uuid,
            editable: false,
        },
        AdminField {
            name: "email",
            kind: FieldKind::Text,
            editable: true,
        },
        AdminField {
            name: "username",
            kind: FieldKind::Text,
            editable: true,
        },
        AdminField {
            name: "first_name",
            kind: FieldKind::Text,
            editable: true,
        },
        AdminField {
            name: "last_name",
            kind: FieldKind::Text,
            editable: true,
        },
        AdminField {
            name: "is_email_verified",
            kind: FieldKind::Bool,
            editable: true,
        },
        AdminField {
            name: "is_active",
            kind: FieldKind::Bool,
            editable: true,
        },
        AdminField {
            name: "is_staff",
            kind: FieldKind::Bool,
            editable: true,
        },
        AdminField {
            name: "is_superuser",
            kind: FieldKind::Bool,
            editable: true,
        },
        AdminField {
            name: "date_joined",
            kind: FieldKind::Timestamp,
            editable: true,
        },
        AdminField {
            name: "last_login",
            kind: FieldKind::Timestamp,
            editable: true,
        },
    ],
    list_display: &[
        "email",
        "username",
        "is_email_verified",
        "is_active",
        "is_staff",
        "date_joined",
    ],
    list_filter: &[
        ListFilter {
            field: "is_email_verified",
            kind: FilterKind::Boolean,
        },
        ListFilter {
            field: "is_active",
            kind: FilterKind::Boolean,
        },
        ListFilter {
            field: "is_staff",
            kind: FilterKind::Boolean,
        },
        ListFilter {
            field: "is_superuser",
            kind: FilterKind::Boolean,
        },
    ],
    search_fields: &["email", "username"],
    readonly_fields: &["date_joined", "last_login"],
    ordering: &["-date_joined"],
    fieldsets: &[
        Fieldset {
            title: None,
            fields: &["email", "username"],
        },
        Fieldset {
            title: Some("Personal info"),
            fields: &["first_name", "last_name"],
        },
        Fieldset {
            title: Some("Permissions"),
            fields: &["is_active", "is_staff", "is_superuser"],
        },
        Fieldset {
            title: Some("Important dates"),
            fields: &["last_login", "date_joined"],
        },
        Fieldset {
            title: Some("Email Verification"),
            fields: &["is_email_verified"],
        },
    ],
};

pub static EMAIL_VERIFICATION_TOKEN_ADMIN: ModelAdmin = ModelAdmin {
    model: AdminModel::EmailVerificationTokens,
    verbose_name: "email verification token",
    fields: TOKEN_FIELDS,
    list_display: TOKEN_LIST_DISPLAY,
    list_filter: TOKEN_LIST_FILTER,
    search_fields: TOKEN_SEARCH_FIELDS,
    readonly_fields: TOKEN_READONLY_FIELDS,
    ordering: TOKEN_ORDERING,
    fieldsets: &[],
};

pub static PASSWORD_RESET_TOKEN_ADMIN: ModelAdmin = ModelAdmin {
    model: AdminModel::PasswordResetTokens,
    verbose_name: "password reset token",
    fields: TOKEN_FIELDS,
    list_display: TOKEN_LIST_DISPLAY,
    list_filter: TOKEN_LIST_FILTER,
    search_fields: TOKEN_SEARCH_FIELDS,
    readonly_fields: TOKEN_READONLY_FIELDS,
    ordering: TOKEN_ORDERING,
    fieldsets: &[],
};

pub fn registry() -> impl Iterator<Item = &'static ModelAdmin> {
    AdminModel::ALL.into_iter().map(AdminModel::admin)
}
