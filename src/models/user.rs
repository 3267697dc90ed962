//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account: instructor, student or administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User. The password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Whether the user holds the add/change/delete course permissions
    pub fn can_manage_courses(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Instructor)
    }
}

/// User role for authorization.
///
/// - Admin: manages subjects and user roles, and may author courses
/// - Instructor: authors courses and their content
/// - Student: browses the catalog and enrolls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Instructor,
    #[default]
    Student,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Instructor => "instructor",
            UserRole::Student => "student",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "instructor" => Ok(UserRole::Instructor),
            "student" => Ok(UserRole::Student),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [UserRole::Admin, UserRole::Instructor, UserRole::Student] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert_eq!("INSTRUCTOR".parse::<UserRole>().unwrap(), UserRole::Instructor);
        assert!("teacher".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_course_management_permission() {
        let mut user = User::new("u".into(), String::new(), "h".into(), UserRole::Student);
        assert!(!user.can_manage_courses());
        user.role = UserRole::Instructor;
        assert!(user.can_manage_courses());
        assert!(!user.is_admin());
        user.role = UserRole::Admin;
        assert!(user.can_manage_courses());
        assert!(user.is_admin());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("u".into(), "u@x.io".into(), "secret-hash".into(), UserRole::Student);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"role\":\"student\""));
    }
}
