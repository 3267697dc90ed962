//! Account endpoints
//!
//! - POST /accounts/register - Register and log in
//! - POST /accounts/login - Log in
//! - POST /accounts/logout - Log out
//! - GET /accounts/me - Current user
//! - POST /accounts/enroll-course - Enroll in a course
//! - GET /accounts/courses - Courses the caller is enrolled in
//! - GET /accounts/course/{id}[/{module_id}] - Enrolled course detail

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::middleware::{
    extract_session_token, parse_body, ApiError, AppState, AuthenticatedUser, JsonBody,
    SESSION_COOKIE,
};
use crate::models::{Course, Session, User};
use crate::services::{LoginInput, RegisterInput, StudentCourse};

/// Request body for registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub course_id: i64,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Routes open to anonymous visitors
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes that need a session
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/enroll-course", post(enroll_course))
        .route("/courses", get(enrolled_courses))
        .route("/course/{id}", get(student_course))
        .route("/course/{id}/{module_id}", get(student_course_module))
}

fn session_headers(session: &Session) -> Result<HeaderMap, ApiError> {
    let max_age = (session.expires_at - session.created_at).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.id, max_age
    );
    let value = HeaderValue::from_str(&cookie)
        .map_err(|_| ApiError::internal_error("Invalid session cookie"))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

/// POST /accounts/register
///
/// The first account becomes the administrator. A session is opened right
/// away, as after a login.
async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let echoed = redact_password(&body);
    let request: RegisterRequest = parse_body(&body).map_err(|e| e.with_input(&echoed))?;
    let input = RegisterInput::new(request.username, request.email, request.password);

    let (user, session) = state
        .user_service
        .register(input)
        .await
        .map_err(|e| ApiError::from(e).with_input(&echoed))?;

    let headers = session_headers(&session)?;
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /accounts/login
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: LoginRequest =
        parse_body(&body).map_err(|e| e.with_input(&redact_password(&body)))?;
    let (user, session) = state
        .user_service
        .login(LoginInput::new(request.username, request.password))
        .await?;

    let headers = session_headers(&session)?;
    Ok((
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /accounts/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /accounts/me
async fn me(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// POST /accounts/enroll-course
async fn enroll_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Course>, ApiError> {
    let request: EnrollRequest = parse_body(&body)?;
    let course = state
        .enrollment_service
        .enroll(&user.0, request.course_id)
        .await?;
    Ok(Json(course))
}

/// GET /accounts/courses
async fn enrolled_courses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.enrollment_service.enrolled_courses(&user.0).await?))
}

/// GET /accounts/course/{id}
async fn student_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<StudentCourse>, ApiError> {
    Ok(Json(
        state.enrollment_service.student_course(&user.0, id, None).await?,
    ))
}

/// GET /accounts/course/{id}/{module_id}
async fn student_course_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, module_id)): Path<(i64, i64)>,
) -> Result<Json<StudentCourse>, ApiError> {
    Ok(Json(
        state
            .enrollment_service
            .student_course(&user.0, id, Some(module_id))
            .await?,
    ))
}

fn redact_password(body: &Value) -> Value {
    let mut body = body.clone();
    if let Some(map) = body.as_object_mut() {
        map.remove("password");
    }
    body
}
