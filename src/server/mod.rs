//! HTTP surface for the sync engine.
//!
//! Identity arrives as a bearer API key mapped to a user id by a YAML
//! config file; the sync engine itself only ever sees the resolved owner
//! id. Authentication is transport plumbing here, not a feature of the
//! engine.

pub mod handlers;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// API key entry in the config file.
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated owner identity, added to request extensions after auth.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps bearer key -> owner identity.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from a YAML config file. Missing or malformed config
    /// leaves the store empty; requests will fail auth until it's fixed.
    pub fn load(config_path: &Path) -> Self {
        let keys = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => {
                    let mut map = HashMap::new();
                    for entry in config.api_keys {
                        map.insert(
                            entry.key,
                            AuthUser {
                                user_id: entry.user_id,
                            },
                        );
                    }
                    tracing::info!("Loaded {} API key(s)", map.len());
                    map
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                HashMap::new()
            }
        };

        Self { keys }
    }

    #[cfg(test)]
    pub fn with_keys(entries: &[(&str, &str)]) -> Self {
        let keys = entries
            .iter()
            .map(|(key, user_id)| {
                (
                    key.to_string(),
                    AuthUser {
                        user_id: user_id.to_string(),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub api_keys: Arc<ApiKeyStore>,
}

#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        Some(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(AuthError {
                    error: "invalid_auth",
                    message: "Authorization header must use Bearer scheme",
                }),
            )
                .into_response();
        }
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(AuthError {
                    error: "missing_auth",
                    message: "Authorization header required",
                }),
            )
                .into_response();
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(AuthError {
                error: "invalid_key",
                message: "Invalid API key",
            }),
        )
            .into_response(),
    }
}

/// Build the application router.
///
/// `/health` is public; everything else requires a valid bearer key.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(handlers::health));

    let protected_routes = Router::new()
        .route("/me", get(handlers::me))
        .route("/api/sync", post(handlers::sync_batch))
        .route("/api/sync/attempts", get(handlers::recent_attempts))
        .route(
            "/api/concepts",
            get(handlers::list_concepts).post(handlers::create_concept),
        )
        .route(
            "/api/concepts/{id}",
            put(handlers::update_concept).delete(handlers::delete_concept),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_store_validate() {
        let store = ApiKeyStore::with_keys(&[("secret-1", "alice"), ("secret-2", "bob")]);

        assert_eq!(store.validate("secret-1").unwrap().user_id, "alice");
        assert_eq!(store.validate("secret-2").unwrap().user_id, "bob");
        assert!(store.validate("secret-3").is_none());
        assert!(store.validate("").is_none());
    }

    #[test]
    fn test_api_key_store_load_from_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "api_keys:\n  - key: \"k1\"\n    user_id: \"user1\"\n",
        )
        .unwrap();

        let store = ApiKeyStore::load(&config_path);
        assert_eq!(store.validate("k1").unwrap().user_id, "user1");
        assert!(store.validate("k2").is_none());
    }

    #[test]
    fn test_api_key_store_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::load(&temp_dir.path().join("nope.yaml"));
        assert!(store.validate("anything").is_none());
    }

    #[test]
    fn test_api_key_store_malformed_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "api_keys: [not a mapping").unwrap();

        let store = ApiKeyStore::load(&config_path);
        assert!(store.validate("k1").is_none());
    }
}
