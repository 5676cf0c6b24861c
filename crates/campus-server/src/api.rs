//! API handlers for the Campus server.

use crate::middleware::ActorContext;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine as _;
use campus_audit::{query_entries, AuditAction, AuditEntry, AuditError, AuditFilter};
use campus_db::{
    DbError, FixtureReport, MutationOutcome, QueryDef, QueryName, QueryResult, RerunPolicy, Value,
    Verification,
};
use campus_types::{Document, DocumentSummary, Enrollment, Grade, NewDocument, ProductSpecs};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Largest page the audit endpoint returns.
const MAX_AUDIT_LIMIT: i64 = 1000;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::AlreadyExists(_)
            | DbError::ConstraintViolation { .. }
            | DbError::DigestMismatch { .. } => ApiError::Conflict(err.to_string()),
            DbError::PermissionDenied { .. } => ApiError::Forbidden(err.to_string()),
            DbError::UnknownQuery(_) | DbError::NotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            DbError::InvalidParameters { .. } => ApiError::BadRequest(err.to_string()),
            DbError::Definition(_)
            | DbError::AuditWriteFailure { .. }
            | DbError::ShapeMismatch { .. }
            | DbError::MalformedXml { .. }
            | DbError::Encoding(_)
            | DbError::Pool(_)
            | DbError::Database(_) => {
                tracing::error!("database failure: {}", err);
                ApiError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        tracing::error!("audit log failure: {}", err);
        ApiError::InternalServerError(err.to_string())
    }
}

/// Runs `f` on the blocking pool with a pooled connection.
async fn with_conn<T, F>(state: Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &AppState) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        f(&conn, &state)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

// ── Setup ────────────────────────────────────────────────────────────

/// Query parameters for `POST /api/setup`.
#[derive(Debug, Default, Deserialize)]
pub struct SetupParams {
    /// Overrides the configured re-run policy for this call.
    pub rerun_policy: Option<RerunPolicy>,
}

/// Response body for `POST /api/setup`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupResponse {
    pub rerun_policy: RerunPolicy,
    pub fixtures: FixtureCounts,
}

/// Rows loaded per table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureCounts {
    pub departments: usize,
    pub employees: usize,
    pub students: usize,
    pub courses: usize,
    pub enrollments: usize,
    pub documents: usize,
    pub products: usize,
    pub total: usize,
}

impl From<FixtureReport> for FixtureCounts {
    fn from(report: FixtureReport) -> Self {
        Self {
            departments: report.departments,
            employees: report.employees,
            students: report.students,
            courses: report.courses,
            enrollments: report.enrollments,
            documents: report.documents,
            products: report.products,
            total: report.total(),
        }
    }
}

/// Handler for `POST /api/setup`.
///
/// Once the schema exists the actor needs `ALL` on `_campus_schema`.
pub async fn setup_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(ActorContext(actor)): Extension<ActorContext>,
    Query(params): Query<SetupParams>,
) -> Result<(StatusCode, Json<SetupResponse>), ApiError> {
    let policy = params.rerun_policy.unwrap_or(state.rerun_policy);

    let report = with_conn(state, move |conn, _| {
        Ok(campus_db::setup_as(conn, &actor, policy)?)
    })
    .await?;
    tracing::info!(?policy, rows = report.total(), "campus database set up");

    Ok((
        StatusCode::CREATED,
        Json(SetupResponse {
            rerun_policy: policy,
            fixtures: report.into(),
        }),
    ))
}

// ── Queries ──────────────────────────────────────────────────────────

/// Handler for `GET /api/queries`.
pub async fn list_queries_handler() -> Json<&'static [QueryDef]> {
    Json(campus_db::catalog())
}

/// Query parameters for `GET /api/queries/{name}`.
#[derive(Debug, Default, Deserialize)]
pub struct RunQueryParams {
    pub min_courses: Option<i64>,
}

/// Handler for `GET /api/queries/{name}`.
pub async fn run_query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<RunQueryParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let name: QueryName = name.parse()?;
    let args: Vec<Value> = params.min_courses.map(Value::Integer).into_iter().collect();

    let result = with_conn(state, move |conn, _| {
        Ok(campus_db::run_query(conn, name, &args)?)
    })
    .await?;
    Ok(Json(result))
}

// ── Enrollments ──────────────────────────────────────────────────────

/// Request body for `POST /api/enrollments`.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_id: i64,
    pub course_id: i64,
    /// Defaults to today (UTC).
    pub enrolled_on: Option<NaiveDate>,
    pub grade: Option<Grade>,
}

/// Request body for `PATCH /api/enrollments/{student_id}/{course_id}`.
#[derive(Debug, Deserialize)]
pub struct SetGradeRequest {
    /// `null` clears the grade.
    pub grade: Option<Grade>,
}

/// Response body for enrollment mutations.
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    pub affected_rows: usize,
}

impl From<MutationOutcome> for MutationResponse {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            affected_rows: outcome.affected_rows,
        }
    }
}

/// Handler for `POST /api/enrollments`.
pub async fn enroll_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(ActorContext(actor)): Extension<ActorContext>,
    Json(payload): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<MutationResponse>), ApiError> {
    let enrollment = Enrollment {
        student_id: payload.student_id,
        course_id: payload.course_id,
        enrolled_on: payload
            .enrolled_on
            .unwrap_or_else(|| chrono::Utc::now().date_naive()),
        grade: payload.grade,
    };

    let outcome = with_conn(state, move |conn, state| {
        Ok(campus_db::enroll_student(
            conn,
            &actor,
            &enrollment,
            state.recorder.as_ref(),
        )?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Handler for `PATCH /api/enrollments/{student_id}/{course_id}`.
pub async fn set_grade_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(ActorContext(actor)): Extension<ActorContext>,
    Path((student_id, course_id)): Path<(i64, i64)>,
    Json(payload): Json<SetGradeRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = with_conn(state, move |conn, state| {
        Ok(campus_db::set_grade(
            conn,
            &actor,
            student_id,
            course_id,
            payload.grade,
            state.recorder.as_ref(),
        )?)
    })
    .await?;

    Ok(Json(outcome.into()))
}

/// Handler for `DELETE /api/enrollments/{student_id}/{course_id}`.
pub async fn withdraw_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(ActorContext(actor)): Extension<ActorContext>,
    Path((student_id, course_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    with_conn(state, move |conn, state| {
        Ok(campus_db::withdraw_enrollment(
            conn,
            &actor,
            student_id,
            course_id,
            state.recorder.as_ref(),
        )?)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ── Audit log ────────────────────────────────────────────────────────

/// Query parameters for `GET /api/audit`.
#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub object: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub since: Option<String>,
    pub limit: Option<i64>,
}

/// Handler for `GET /api/audit`.
pub async fn audit_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let action = params
        .action
        .as_deref()
        .map(str::parse::<AuditAction>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let filter = AuditFilter {
        actor: params.actor,
        action,
        object_name: params.object,
        since: params.since,
        limit: Some(params.limit.unwrap_or(100).clamp(1, MAX_AUDIT_LIMIT)),
    };

    let entries = with_conn(state, move |conn, _| Ok(query_entries(conn, &filter)?)).await?;
    Ok(Json(entries))
}

// ── Documents ────────────────────────────────────────────────────────

/// Request body for `POST /api/documents`.
#[derive(Debug, Deserialize)]
pub struct StoreDocumentRequest {
    pub title: String,
    pub mime_type: Option<String>,
    /// Payload, standard base64.
    pub content_base64: String,
}

/// Response body for `POST /api/documents`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreDocumentResponse {
    pub document_id: i64,
    pub sha256_hex: String,
}

/// A document with its payload base64 encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub document_id: i64,
    pub title: String,
    pub mime_type: String,
    pub content_base64: String,
    pub sha256_hex: String,
    pub signature_hex: Option<String>,
    pub public_key_hex: Option<String>,
    pub created_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            document_id: doc.document_id,
            title: doc.title,
            mime_type: doc.mime_type,
            content_base64: base64::engine::general_purpose::STANDARD.encode(&doc.content),
            sha256_hex: doc.sha256_hex,
            signature_hex: doc.signature_hex,
            public_key_hex: doc.public_key_hex,
            created_at: doc.created_at,
        }
    }
}

/// Response body for `GET /api/documents/{document_id}/verify`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub document_id: i64,
    pub verification: Verification,
    pub valid: bool,
}

/// Handler for `POST /api/documents`.
pub async fn store_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(ActorContext(actor)): Extension<ActorContext>,
    Json(payload): Json<StoreDocumentRequest>,
) -> Result<(StatusCode, Json<StoreDocumentResponse>), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let content = base64::engine::general_purpose::STANDARD
        .decode(payload.content_base64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 content: {}", e)))?;

    let document = NewDocument {
        title: payload.title,
        mime_type: payload
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        content,
    };
    let sha256_hex = campus_db::digest_hex(&document.content);

    let document_id = with_conn(state, move |conn, state| {
        Ok(campus_db::store_document(
            conn,
            &actor,
            &document,
            state.recorder.as_ref(),
        )?)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(StoreDocumentResponse {
            document_id,
            sha256_hex,
        }),
    ))
}

/// Handler for `GET /api/documents`.
pub async fn list_documents_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let documents = with_conn(state, |conn, _| Ok(campus_db::list_documents(conn)?)).await?;
    Ok(Json(documents))
}

/// Handler for `GET /api/documents/{document_id}`.
pub async fn get_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(document_id): Path<i64>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = with_conn(state, move |conn, _| {
        Ok(campus_db::fetch_document(conn, document_id)?)
    })
    .await?;
    Ok(Json(document.into()))
}

/// Handler for `POST /api/documents/{document_id}/sign`.
pub async fn sign_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(ActorContext(actor)): Extension<ActorContext>,
    Path(document_id): Path<i64>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = with_conn(state, move |conn, state| {
        Ok(campus_db::sign_document(
            conn,
            &actor,
            document_id,
            &state.signing_key,
            state.recorder.as_ref(),
        )?)
    })
    .await?;
    Ok(Json(document.into()))
}

/// Handler for `GET /api/documents/{document_id}/verify`.
pub async fn verify_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(document_id): Path<i64>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let verification = with_conn(state, move |conn, state| {
        let trusted = state.signing_key.verifying_key();
        Ok(campus_db::verify_document(conn, document_id, &trusted)?)
    })
    .await?;

    Ok(Json(VerifyResponse {
        document_id,
        verification,
        valid: verification.is_valid(),
    }))
}

/// Handler for `GET /api/products`.
///
/// Returns each product with the specs read from its XML description.
pub async fn list_products_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<ProductSpecs>>, ApiError> {
    let products = with_conn(state, |conn, _| Ok(campus_db::list_products(conn)?)).await?;
    Ok(Json(products))
}
