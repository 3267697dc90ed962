//! API middleware
//!
//! Shared state, the JSON error envelope, and authentication: session tokens
//! (Bearer header or `session` cookie) for the site, HTTP Basic for the API
//! actions.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::SharedCache;
use crate::config::{Config, UploadConfig};
use crate::db::repositories::{
    SqlxContentRepository, SqlxCourseRepository, SqlxModuleRepository, SqlxSessionRepository,
    SqlxSubjectRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{FieldErrors, User};
use crate::services::{
    ContentService, ContentServiceError, CourseService, CourseServiceError, EnrollmentError,
    EnrollmentService, OrderingError, OrderingService, SubjectService, SubjectServiceError,
    UserService, UserServiceError,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub subject_service: Arc<SubjectService>,
    pub course_service: Arc<CourseService>,
    pub content_service: Arc<ContentService>,
    pub ordering_service: Arc<OrderingService>,
    pub enrollment_service: Arc<EnrollmentService>,
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// Wire repositories and services over one pool and cache
    pub fn new(pool: DynDatabasePool, cache: SharedCache, config: &Config) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let subject_repo = SqlxSubjectRepository::boxed(pool.clone());
        let course_repo = SqlxCourseRepository::boxed(pool.clone());
        let module_repo = SqlxModuleRepository::boxed(pool.clone());
        let content_repo = SqlxContentRepository::boxed(pool.clone());

        Self {
            user_service: Arc::new(UserService::new(user_repo.clone(), session_repo)),
            subject_service: Arc::new(SubjectService::new(subject_repo.clone())),
            course_service: Arc::new(CourseService::new(
                course_repo.clone(),
                module_repo.clone(),
                subject_repo,
                user_repo,
                cache,
                Duration::from_secs(config.cache.page_ttl_seconds),
            )),
            content_service: Arc::new(ContentService::new(module_repo.clone(), content_repo.clone())),
            ordering_service: Arc::new(OrderingService::new(module_repo.clone(), content_repo.clone())),
            enrollment_service: Arc::new(EnrollmentService::new(course_repo, module_repo, content_repo)),
            upload_config: Arc::new(config.upload.clone()),
            pool,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Field-level validation failure
    pub fn invalid_fields(errors: &FieldErrors) -> Self {
        Self::with_details(
            "VALIDATION_ERROR",
            errors.to_string(),
            json!({ "fields": errors }),
        )
    }

    /// Echo the submitted input back with a validation error so the client
    /// can redisplay it. Other errors are returned unchanged.
    pub fn with_input(mut self, input: &Value) -> Self {
        if self.error.code == "VALIDATION_ERROR" {
            let details = self.error.details.get_or_insert_with(|| json!({}));
            if let Some(map) = details.as_object_mut() {
                map.insert("input".to_string(), input.clone());
            }
        }
        self
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {:#}", e);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::UNAUTHORIZED {
            let challenge = HeaderValue::from_static("Basic realm=\"educa\", charset=\"UTF-8\"");
            return (status, [(header::WWW_AUTHENTICATE, challenge)], Json(self)).into_response();
        }
        (status, Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(errors) => ApiError::invalid_fields(&errors),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User {} not found", id)),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<SubjectServiceError> for ApiError {
    fn from(e: SubjectServiceError) -> Self {
        match e {
            SubjectServiceError::NotFound(_) => ApiError::not_found("Subject not found"),
            SubjectServiceError::DuplicateSlug(_) | SubjectServiceError::InUse(_) => {
                ApiError::conflict(e.to_string())
            }
            SubjectServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            SubjectServiceError::ValidationError(errors) => ApiError::invalid_fields(&errors),
            SubjectServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CourseServiceError> for ApiError {
    fn from(e: CourseServiceError) -> Self {
        match e {
            CourseServiceError::NotFound(_) => ApiError::not_found("Not found"),
            CourseServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CourseServiceError::ValidationError(errors) => ApiError::invalid_fields(&errors),
            CourseServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ContentServiceError> for ApiError {
    fn from(e: ContentServiceError) -> Self {
        match e {
            ContentServiceError::NotFound(_) => ApiError::not_found("Not found"),
            ContentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ContentServiceError::ValidationError(errors) => ApiError::invalid_fields(&errors),
            ContentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<OrderingError> for ApiError {
    fn from(e: OrderingError) -> Self {
        match e {
            OrderingError::InvalidPayload(msg) => ApiError::validation_error(msg),
            OrderingError::Forbidden(msg) => ApiError::forbidden(msg),
            OrderingError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::NotFound(_) => ApiError::not_found("Not found"),
            EnrollmentError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Deserialize a JSON body, reporting type errors as a validation failure
/// that carries the submitted input
pub fn parse_body<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, ApiError> {
    serde_json::from_value(input.clone()).map_err(|e| {
        let mut errors = FieldErrors::new();
        errors.add("non_field_errors", e.to_string());
        ApiError::invalid_fields(&errors).with_input(input)
    })
}

/// Malformed or missing JSON bodies are validation failures like any other
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(format!("Invalid request body: {}", rejection.body_text()))
    }
}

/// `Json` extractor whose rejection is reported in the `ApiError` envelope
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Session token from `Authorization: Bearer` or the session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|c| {
                c.trim()
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                    .map(str::to_string)
            })
        })
        .filter(|t| !t.is_empty())
}

/// Username and password from `Authorization: Basic`
pub fn extract_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Session authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// HTTP Basic authentication middleware
pub async fn require_basic_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (username, password) = extract_basic_credentials(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;

    let user = state
        .user_service
        .authenticate_basic(&username, &password)
        .await?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware, layered inside `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}
