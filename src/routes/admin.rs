use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    admin::{
        query::AdminListQuery,
        record::{project, AdminPage},
        registry, AdminModel, ModelAdmin,
    },
    errors::AccountsError,
    state::AppState,
};

#[derive(Debug, Serialize)]
struct RegisteredModel {
    model: &'static str,
    verbose_name: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_models))
        .route("/{model}", get(list_records))
        .route("/{model}/schema", get(get_schema))
        .route("/{model}/{id}", patch(update_record))
}

fn resolve(slug: &str) -> Result<AdminModel, AccountsError> {
    AdminModel::from_slug(slug).ok_or(AccountsError::NotFound("admin model"))
}

async fn list_models() -> Json<Vec<RegisteredModel>> {
    Json(
        registry()
            .map(|admin| RegisteredModel {
                model: admin.model.slug(),
                verbose_name: admin.verbose_name,
            })
            .collect(),
    )
}

pub async fn get_schema(Path(model): Path<String>) -> Result<Json<&'static ModelAdmin>, AccountsError> {
    Ok(Json(resolve(&model)?.admin()))
}

pub async fn list_records(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AdminPage<Map<String, Value>>>, AccountsError> {
    let model = resolve(&model)?;
    let admin = model.admin();
    let query = AdminListQuery::from_params(admin, &params, state.clock.now())?;

    let page = match model.token_kind() {
        None => state
            .admin_repo
            .list_users(&query)
            .await
            .map(|page| page.map(|user| project(&user, admin.list_display))),
        Some(kind) => state
            .admin_repo
            .list_tokens(kind, &query)
            .await
            .map(|page| page.map(|row| project(&row, admin.list_display))),
    }
    .map_err(|err| {
        error!(?err, model = model.slug(), "admin list failed");
        AccountsError::from(err)
    })?;

    Ok(Json(page))
}

pub async fn update_record(
    State(state): State<AppState>,
    Path((model, id)): Path<(String, Uuid)>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>, AccountsError> {
    let model = resolve(&model)?;
    let admin = model.admin();
    let changes = admin.validate_changes(&body)?;
    let fields: Vec<&str> = admin.fields.iter().map(|field| field.name).collect();

    let record = match model.token_kind() {
        None => state
            .admin_repo
            .update_user(id, &changes)
            .await?
            .map(|user| project(&user, &fields)),
        Some(kind) => state
            .admin_repo
            .update_token(kind, id, &changes)
            .await?
            .map(|row| project(&row, &fields)),
    }
    .ok_or(AccountsError::NotFound("record"))?;

    info!(model = model.slug(), record_id = %id, "admin edited record");
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::json;
    use time::{macros::datetime, Duration, OffsetDateTime};
    use tower::ServiceExt;

    use super::*;
    use crate::db::{memory_store::MemoryStore, user_repository::UserRepository};
    use crate::models::{NewUser, User};
    use crate::services::accounts::AccountService;
    use crate::state::test_config;
    use crate::utils::clock::FixedClock;

    const NOW: OffsetDateTime = datetime!(2026-08-20 10:00 UTC);

    fn make_app(store: Arc<MemoryStore>) -> Router {
        let state = AppState::in_memory(store, Arc::new(FixedClock(NOW)), test_config());
        Router::new().nest("/admin", router()).with_state(state)
    }

    fn accounts(store: &Arc<MemoryStore>, now: OffsetDateTime) -> AccountService {
        AppState::in_memory(store.clone(), Arc::new(FixedClock(now)), test_config()).accounts()
    }

    async fn seed_user(store: &Arc<MemoryStore>, email: &str, username: &str, at: OffsetDateTime) -> User {
        let new_user = NewUser::new(&FixedClock(at), email, username, String::new()).unwrap();
        store.create_user(&new_user).await.unwrap()
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn lists_registered_models() {
        let (status, json) = send(make_app(Arc::new(MemoryStore::new())), "GET", "/admin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["model"], "users");
        assert_eq!(json[1]["model"], "email-verification-tokens");
        assert_eq!(json[2]["verbose_name"], "password reset token");
    }

    #[tokio::test]
    async fn schema_exposes_descriptor() {
        let app = make_app(Arc::new(MemoryStore::new()));
        let (status, json) = send(app, "GET", "/admin/password-reset-tokens/schema", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["readonly_fields"], json!(["token", "created_at", "expires_at"]));
        assert_eq!(json["search_fields"], json!(["user_email", "user_username"]));
    }

    #[tokio::test]
    async fn unknown_model_is_not_found() {
        let app = make_app(Arc::new(MemoryStore::new()));
        let (status, json) = send(app, "GET", "/admin/groups", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn user_list_projects_display_fields() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "ada@example.com", "ada", NOW - Duration::days(2)).await;
        seed_user(&store, "bob@example.com", "bob", NOW - Duration::days(1)).await;

        let (status, json) = send(make_app(store), "GET", "/admin/users?is_staff=false", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 2);
        assert_eq!(json["page"], 1);
        assert_eq!(json["limit"], 20);

        let first = &json["data"][0];
        assert_eq!(first["email"], "bob@example.com");
        assert_eq!(first["is_email_verified"], false);
        assert!(first.get("id").is_some());
        assert!(first.get("password_hash").is_none());
        assert!(first.get("first_name").is_none());
    }

    #[tokio::test]
    async fn user_search_and_bad_filter() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "ada@example.com", "ada", NOW).await;
        seed_user(&store, "bob@example.com", "bob", NOW).await;

        let (status, json) = send(make_app(store.clone()), "GET", "/admin/users?q=BOB", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["data"][0]["username"], "bob");

        let (status, _) = send(make_app(store), "GET", "/admin/users?email=x", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_range_pages() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "ada@example.com", "ada", NOW).await;

        let (status, json) = send(
            make_app(store.clone()),
            "GET",
            "/admin/users?page=9223372036854775807",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);

        let (status, json) = send(make_app(store), "GET", "/admin/users?page=5000", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["data"], json!([]));
    }

    #[tokio::test]
    async fn token_list_filters_by_usage_and_creation_date() {
        let store = Arc::new(MemoryStore::new());
        let ada = seed_user(&store, "ada@example.com", "ada", NOW - Duration::days(60)).await;

        let old = accounts(&store, NOW - Duration::days(40))
            .issue_email_verification_token(ada.id, None)
            .await
            .unwrap();
        let recent = accounts(&store, NOW - Duration::days(2))
            .issue_email_verification_token(ada.id, None)
            .await
            .unwrap();

        let (status, json) = send(
            make_app(store.clone()),
            "GET",
            "/admin/email-verification-tokens?created_at=past_7_days",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        let row = &json["data"][0];
        assert_eq!(row["token"], recent.token.to_string());
        assert_eq!(row["user"], "ada@example.com");
        assert_eq!(row["is_used"], false);

        let (_, json) = send(
            make_app(store),
            "GET",
            "/admin/email-verification-tokens?is_used=false&q=ada",
            None,
        )
        .await;
        assert_eq!(json["total"], 2);
        // Newest first.
        assert_eq!(json["data"][1]["token"], old.token.to_string());
    }

    #[tokio::test]
    async fn readonly_token_fields_cannot_be_patched() {
        let store = Arc::new(MemoryStore::new());
        let ada = seed_user(&store, "ada@example.com", "ada", NOW).await;
        let token = accounts(&store, NOW)
            .issue_password_reset_token(ada.id, None)
            .await
            .unwrap();

        let uri = format!("/admin/password-reset-tokens/{}", token.id);
        let (status, json) = send(
            make_app(store.clone()),
            "PATCH",
            &uri,
            Some(json!({ "expires_at": "2030-01-01T00:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "readonly_field");

        let (status, json) = send(make_app(store), "PATCH", &uri, Some(json!({ "is_used": true }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["is_used"], true);
        assert_eq!(json["user_email"], "ada@example.com");
        assert_eq!(json["token"], token.token.to_string());
    }

    #[tokio::test]
    async fn patching_a_user() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "ada@example.com", "ada", NOW).await;
        let bob = seed_user(&store, "bob@example.com", "bob", NOW).await;
        let uri = format!("/admin/users/{}", bob.id);

        let (status, json) = send(
            make_app(store.clone()),
            "PATCH",
            &uri,
            Some(json!({ "is_staff": true, "first_name": "Robert" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["is_staff"], true);
        assert_eq!(json["first_name"], "Robert");

        let (status, _) = send(
            make_app(store.clone()),
            "PATCH",
            &uri,
            Some(json!({ "email": "ada@EXAMPLE.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = send(
            make_app(store.clone()),
            "PATCH",
            &uri,
            Some(json!({ "date_joined": "2020-01-01T00:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "readonly_field");

        let missing = format!("/admin/users/{}", Uuid::new_v4());
        let (status, _) = send(make_app(store), "PATCH", &missing, Some(json!({ "is_active": false }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
