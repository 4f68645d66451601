use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use crate::{credentials::Credentials, AppState};

/// A single authorization predicate attached to a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccessCheck {
    /// The route is open to unauthenticated callers.
    AllowAnonymous,
    /// `Authorization: Bearer <key>` must match an issued API key.
    BearerKey,
}

/// Ordered list of checks for a route. The request proceeds if ANY check
/// passes.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    checks: Vec<AccessCheck>,
}

impl AccessPolicy {
    /// Bearer token required — the policy for every data route.
    pub fn bearer() -> Self {
        Self {
            checks: vec![AccessCheck::BearerKey],
        }
    }

    /// Anonymous access allowed (login route). A valid bearer token also
    /// passes, it just isn't required.
    pub fn anonymous() -> Self {
        Self {
            checks: vec![AccessCheck::AllowAnonymous, AccessCheck::BearerKey],
        }
    }

    fn allows(&self, credentials: &Credentials, request: &Request) -> bool {
        self.checks.iter().any(|check| match check {
            AccessCheck::AllowAnonymous => true,
            AccessCheck::BearerKey => bearer_token(request)
                .map(|token| credentials.is_issued(token))
                .unwrap_or(false),
        })
    }
}

/// Axum middleware enforcing the route's `AccessPolicy` before the handler
/// runs. Rejected requests get `401 {"error": "unauthorized"}`.
pub async fn authorize(
    State(state): State<AppState>,
    Extension(policy): Extension<AccessPolicy>,
    request: Request,
    next: Next,
) -> Response {
    if policy.allows(&state.credentials, &request) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
