use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{self, AccessPolicy},
    credentials::Credentials,
    handlers, store, AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path to the sqlite database file ($SQLARY_DB_PATH). Defaults to
    /// `sqlary.db` in the platform data directory.
    pub db_path: Option<PathBuf>,
    /// JSON credentials file ($SQLARY_CREDENTIALS_FILE). Defaults to the
    /// built-in development set.
    pub credentials_file: Option<PathBuf>,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SQLARY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("SQLARY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            db_path: std::env::var("SQLARY_DB_PATH").ok().map(PathBuf::from),
            credentials_file: std::env::var("SQLARY_CREDENTIALS_FILE")
                .ok()
                .map(PathBuf::from),
            cors_origins: std::env::var("SQLARY_CORS_ORIGINS").ok(),
        }
    }
}

/// Resolve the database file location: explicit path, else the platform
/// data directory.
pub fn resolve_db_path(db_path: Option<&PathBuf>) -> Result<PathBuf> {
    match db_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).context("create database dir")?;
                }
            }
            Ok(path.clone())
        }
        None => Ok(crate::dirs::data_dir()?.join("sqlary.db")),
    }
}

/// Build the application router. Every route group carries an
/// `AccessPolicy`; the request proceeds if any of the policy's checks
/// passes — the login route allows anonymous callers, the data routes
/// require an issued bearer key.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api-key", post(handlers::get_api_key))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authorize,
        ))
        .layer(Extension(AccessPolicy::anonymous()));

    let protected = Router::new()
        .route("/salary", get(handlers::list_salaries))
        .route("/salary", put(handlers::add_salary))
        .route("/salary/{id}", delete(handlers::delete_salary))
        .route("/salary/stats", get(handlers::salary_stats))
        .route(
            "/salary/stats/department",
            get(handlers::salary_stats_by_department),
        )
        .route(
            "/salary/stats/department/sub-department",
            get(handlers::salary_stats_by_department_and_sub_department),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authorize,
        ))
        .layer(Extension(AccessPolicy::bearer()));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(public)
        .merge(protected)
        .with_state(state)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let db_path = resolve_db_path(cfg.db_path.as_ref())?;
    info!(db = %db_path.display(), "using salary database");

    let store = store::Store::open(&db_path).await.context("open store")?;

    let credentials =
        Credentials::load(cfg.credentials_file.as_deref()).context("load credentials")?;
    info!(
        users = credentials.user_count(),
        keys = credentials.key_count(),
        "credentials loaded"
    );

    let state = AppState {
        store,
        credentials: Arc::new(credentials),
    };

    let cors = build_cors(cfg.cors_origins.as_deref());

    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "sqlary server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
