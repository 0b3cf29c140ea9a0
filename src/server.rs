//! Read-only viewer API over the stored category tree.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tree` | Whole forest plus integrity issues |
//! | `GET`  | `/categories/{id}` | One category subtree |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no category with id 42" } }
//! ```
//!
//! Error codes: `not_found` (404), `internal` (500).
//!
//! The tree is re-read from SQLite on every request, so a concurrent
//! `vdir run` shows up without a restart.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use vdir_core::tree::{Forest, TreeNode};

use crate::config::Config;
use crate::store::CategoryStore;

#[derive(Clone)]
struct AppState {
    store: Arc<CategoryStore>,
}

/// Build the router. Split out from [`run_server`] so tests can drive it
/// without a socket.
pub fn router(store: CategoryStore) -> Router {
    let state = AppState {
        store: Arc::new(store),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tree", get(handle_tree))
        .route("/categories/{id}", get(handle_category))
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = CategoryStore::open(config).await?;
    let app = router(store);

    println!("Viewer listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tree ============

async fn handle_tree(State(state): State<AppState>) -> Result<Json<Forest>, AppError> {
    Ok(Json(state.store.load().await?))
}

// ============ GET /categories/{id} ============

async fn handle_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TreeNode>, AppError> {
    let forest = state.store.load().await?;
    forest
        .find(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("no category with id {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use vdir_core::plan::CategoryPlan;

    use crate::{db, migrate};

    async fn app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&dir.path().join("tree.sqlite")).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let store = CategoryStore::new(pool);

        let plan = CategoryPlan::build(
            "Root",
            &[],
            &["Paging".to_string()],
            &[("/os/vm.pdf".to_string(), "Paging".to_string())],
        )
        .unwrap();
        store.replace(&plan).await.unwrap();
        (dir, router(store))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = app().await;
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_tree() {
        let (_dir, app) = app().await;
        let (status, body) = get_json(app, "/tree").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roots"][0]["name"], "Root");
        assert_eq!(body["roots"][0]["children"][0]["name"], "Paging");
        assert_eq!(body["roots"][0]["children"][0]["files"][0]["path"], "/os/vm.pdf");
        assert_eq!(body["issues"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_category_lookup() {
        let (_dir, app) = app().await;
        let (_, tree) = get_json(app.clone(), "/tree").await;
        let id = tree["roots"][0]["children"][0]["id"].as_i64().unwrap();

        let (status, body) = get_json(app.clone(), &format!("/categories/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Paging");

        let (status, body) = get_json(app, "/categories/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }
}
