//! Campus server library logic.
//!
//! A thin HTTP surface over `campus-db` and `campus-audit`: schema setup,
//! the query catalog, audited enrollment changes, the audit log, signed
//! documents and the product catalog. Every database call runs on the
//! blocking thread pool.

pub mod api;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use campus_audit::AuditRecorder;
use campus_db::{DbError, DbPool, FixtureReport, RerunPolicy};
use ed25519_dalek::SigningKey;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Observer that writes the audit log for every mutation.
    pub recorder: Arc<AuditRecorder>,
    /// Key used to sign stored documents (Ed25519).
    pub signing_key: Arc<SigningKey>,
    /// Default policy for `POST /api/setup`.
    pub rerun_policy: RerunPolicy,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        recorder: AuditRecorder,
        signing_key: SigningKey,
        rerun_policy: RerunPolicy,
    ) -> Self {
        Self {
            pool,
            recorder: Arc::new(recorder),
            signing_key: Arc::new(signing_key),
            rerun_policy,
        }
    }
}

/// Creates the schema and loads fixtures at startup.
///
/// An existing schema under [`RerunPolicy::FailIfExists`] is left alone and
/// reported as `Ok(None)`.
///
/// # Errors
///
/// Returns any other setup error.
pub fn bootstrap(pool: &DbPool, policy: RerunPolicy) -> Result<Option<FixtureReport>, DbError> {
    let conn = pool.get()?;
    match campus_db::setup(&conn, policy) {
        Ok(report) => Ok(Some(report)),
        Err(DbError::AlreadyExists(table)) => {
            tracing::info!(table = %table, "schema already present, skipping bootstrap");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Maximum request body size (8 MiB). Documents arrive base64 encoded.
const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let actor_routes = Router::new()
        .route("/api/setup", post(api::setup_handler))
        .route("/api/enrollments", post(api::enroll_handler))
        .route(
            "/api/enrollments/{student_id}/{course_id}",
            patch(api::set_grade_handler).delete(api::withdraw_handler),
        )
        .route("/api/documents", post(api::store_document_handler))
        .route(
            "/api/documents/{document_id}/sign",
            post(api::sign_document_handler),
        )
        .layer(axum::middleware::from_fn(middleware::actor_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/api/queries", get(api::list_queries_handler))
        .route("/api/queries/{name}", get(api::run_query_handler))
        .route("/api/audit", get(api::audit_handler))
        .route("/api/documents", get(api::list_documents_handler))
        .route(
            "/api/documents/{document_id}",
            get(api::get_document_handler),
        )
        .route(
            "/api/documents/{document_id}/verify",
            get(api::verify_document_handler),
        )
        .route("/api/products", get(api::list_products_handler))
        .merge(actor_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
