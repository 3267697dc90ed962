//! User service
//!
//! Registration, login/logout, session validation, HTTP Basic credential
//! checks and role changes. The first account ever registered becomes the
//! administrator; everyone after that starts as a student.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{FieldErrors, Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;

/// Default session lifetime in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown user, wrong password or dead session
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("User already exists: {0}")]
    UserExists(String),

    /// Only administrators may do this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_lifetime: Duration,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_lifetime: Duration::days(session_expiration_days),
        }
    }

    /// Register a new account and open a session for it.
    pub async fn register(&self, input: RegisterInput) -> Result<(User, Session), UserServiceError> {
        validate_register_input(&input).map_err(UserServiceError::ValidationError)?;

        let username = input.username.trim().to_string();
        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::Student
        };
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(username, input.email.trim().to_string(), password_hash, role);

        let user = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;
        tracing::info!(user_id = user.id, role = %user.role, "Registered user {}", user.username);

        let session = self.open_session(user.id).await?;
        Ok((user, session))
    }

    /// Check credentials and open a new session.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let user = self.check_credentials(&input.username, &input.password).await?;
        let session = self.open_session(user.id).await?;
        Ok((user, session))
    }

    /// Check HTTP Basic credentials without opening a session.
    pub async fn authenticate_basic(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        self.check_credentials(username, password).await
    }

    /// Invalidate a session token. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are removed and treated as absent.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo
                .delete(&session.id)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get session user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Change another account's role. Administrators only.
    pub async fn change_role(
        &self,
        actor: &User,
        user_id: i64,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        if !actor.is_admin() {
            return Err(UserServiceError::Forbidden(
                "Only administrators can change roles".to_string(),
            ));
        }

        let user = self
            .user_repo
            .update_role(user_id, role)
            .await
            .context("Failed to update user role")?
            .ok_or(UserServiceError::NotFound(user_id))?;
        tracing::info!(user_id, role = %role, "Role changed by {}", actor.username);
        Ok(user)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Remove every expired session, returning how many were dropped
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn check_credentials(&self, username: &str, password: &str) -> Result<User, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .user_repo
            .get_by_username(username.trim())
            .await
            .context("Failed to get user by username")?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }
        Ok(user)
    }

    async fn open_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::open(user_id, self.session_lifetime);
        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    let username = input.username.trim();
    if username.is_empty() {
        errors.add("username", "This field is required.");
    } else if username.chars().count() > MAX_USERNAME_LEN {
        errors.add(
            "username",
            format!("Ensure this value has at most {} characters.", MAX_USERNAME_LEN),
        );
    } else if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    let email = input.email.trim();
    if !email.is_empty() && !email.contains('@') {
        errors.add("email", "Enter a valid email address.");
    }

    if input.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("This password is too short. It must contain at least {} characters.", MIN_PASSWORD_LEN),
        );
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};

    async fn setup_service() -> UserService {
        let pool = setup_pool().await;
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    #[tokio::test]
    async fn test_first_user_is_admin_then_students() {
        let service = setup_service().await;

        let (admin, session) = service
            .register(RegisterInput::new("root", "root@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(session.user_id, admin.id);

        let (student, _) = service
            .register(RegisterInput::new("sam", "", "password123"))
            .await
            .unwrap();
        assert_eq!(student.role, UserRole::Student);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("ana", "", "password123"))
            .await
            .unwrap();

        assert!(matches!(
            service.register(RegisterInput::new("ana", "", "password456")).await,
            Err(UserServiceError::UserExists(_))
        ));

        match service.register(RegisterInput::new("bad name", "nope", "short")).await {
            Err(UserServiceError::ValidationError(errors)) => {
                assert!(errors.get("username").is_some());
                assert!(errors.get("email").is_some());
                assert!(errors.get("password").is_some());
            }
            other => panic!("expected validation error, got {:?}", other.map(|(u, _)| u.id)),
        }
    }

    #[tokio::test]
    async fn test_login_session_lifecycle() {
        let service = setup_service().await;
        let (user, _) = service
            .register(RegisterInput::new("lee", "", "password123"))
            .await
            .unwrap();

        assert!(matches!(
            service.login(LoginInput::new("lee", "wrong-password")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(LoginInput::new("nobody", "password123")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        let (_, session) = service.login(LoginInput::new("lee", "password123")).await.unwrap();
        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let pool = setup_pool().await;
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
            -1,
        );

        let (_, session) = service
            .register(RegisterInput::new("old", "", "password123"))
            .await
            .unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_basic_auth_and_role_change() {
        let service = setup_service().await;
        let (admin, _) = service
            .register(RegisterInput::new("admin", "", "password123"))
            .await
            .unwrap();
        let (student, _) = service
            .register(RegisterInput::new("teacher", "", "password123"))
            .await
            .unwrap();

        let user = service.authenticate_basic("teacher", "password123").await.unwrap();
        assert_eq!(user.id, student.id);

        assert!(matches!(
            service.change_role(&student, admin.id, UserRole::Student).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.change_role(&admin, 999, UserRole::Instructor).await,
            Err(UserServiceError::NotFound(999))
        ));

        let promoted = service
            .change_role(&admin, student.id, UserRole::Instructor)
            .await
            .unwrap();
        assert_eq!(promoted.role, UserRole::Instructor);
    }
}
