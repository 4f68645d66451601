use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    store::{NewSalary, SalaryFilter},
    AppState,
};

// ── Validated extractors ─────────────────────────────────────────────────────

/// `axum::Json` with rejections mapped to a JSON error body, so malformed
/// payloads (bad JSON, wrong types, unknown fields) never produce a plain
/// text response.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(validation_error(rejection.status(), rejection.body_text())),
        }
    }
}

/// `axum::Query` counterpart of [`ValidatedJson`].
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(validation_error(rejection.status(), rejection.body_text())),
        }
    }
}

fn validation_error(status: StatusCode, detail: String) -> Response {
    (status, Json(json!({"error": detail}))).into_response()
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyRequest {
    pub username: String,
    pub password: String,
}

/// Exchange username/password for the user's provisioned API key.
/// Invalid credentials are 401; valid credentials without a provisioned key
/// are 404 — a different caller property, never collapsed into 401.
pub async fn get_api_key(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ApiKeyRequest>,
) -> Response {
    let ApiKeyRequest { username, password } = body;

    if !state.credentials.verify_password(&username, &password) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "username": username,
                "error": "Credentials provided were incorrect; please try again!",
            })),
        )
            .into_response();
    }

    match state.credentials.api_key(&username) {
        Some(api_key) => Json(json!({"username": username, "apiKey": api_key})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "username": username,
                "error": "No API key found for user; please generate one before proceeding!",
            })),
        )
            .into_response(),
    }
}

// ── List ─────────────────────────────────────────────────────────────────────

pub async fn list_salaries(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddSalaryRequest {
    pub name: String,
    pub salary: f64,
    pub currency: String,
    #[serde(default)]
    pub on_contract: bool,
    pub department: String,
    pub sub_department: String,
}

pub async fn add_salary(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<AddSalaryRequest>,
) -> Response {
    if body.name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "name must not be empty"})),
        )
            .into_response();
    }
    if !body.salary.is_finite() || body.salary < 0.0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "salary must be a non-negative number"})),
        )
            .into_response();
    }

    let record = NewSalary {
        name: body.name,
        salary: body.salary,
        currency: body.currency.to_uppercase(),
        on_contract: body.on_contract,
        department: body.department,
        sub_department: body.sub_department,
    };

    match state.store.insert(record).await {
        Ok(record) => {
            info!(id = record.id, "salary record created");
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ── Delete ───────────────────────────────────────────────────────────────────

/// Deleting a nonexistent id is a no-op, reported as 410 with
/// `deleted: false` rather than an error body.
pub async fn delete_salary(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.delete(id).await {
        Ok(deleted) => {
            if deleted {
                info!(id, "salary record deleted");
            }
            let status = if deleted {
                StatusCode::OK
            } else {
                StatusCode::GONE
            };
            (status, Json(json!({"id": id, "deleted": deleted}))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ── Statistics ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsParams {
    pub currency: Option<String>,
    pub on_contract: Option<bool>,
}

impl StatsParams {
    /// Currency is uppercased here, at the boundary; the store applies no
    /// normalization of its own.
    fn into_filter(self) -> SalaryFilter {
        SalaryFilter {
            currency: self.currency.map(|c| c.to_uppercase()),
            on_contract: self.on_contract,
        }
    }
}

pub async fn salary_stats(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<StatsParams>,
) -> Response {
    match state.store.stats(&params.into_filter()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn salary_stats_by_department(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<StatsParams>,
) -> Response {
    match state.store.stats_by_department(&params.into_filter()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn salary_stats_by_department_and_sub_department(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<StatsParams>,
) -> Response {
    match state
        .store
        .stats_by_department_and_sub_department(&params.into_filter())
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
