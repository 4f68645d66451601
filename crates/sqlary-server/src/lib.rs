use std::sync::Arc;

pub mod auth;
pub mod credentials;
pub mod dirs;
pub mod handlers;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    /// Static credential set loaded at startup; never mutated afterwards.
    pub credentials: Arc<credentials::Credentials>,
}

pub use server::{router, run, ServerConfig};
