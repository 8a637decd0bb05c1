//! User model with role-based access control.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role")]
pub enum UserRole {
    /// Manages both partitions, the shared list and network settings.
    #[sqlx(rename = "Network_Admin")]
    NetworkAdmin,
    /// Manages site snippets, runs execution and rendering.
    #[sqlx(rename = "Site_Admin")]
    SiteAdmin,
    Viewer,
}

impl UserRole {
    pub fn can_manage_site(&self) -> bool {
        matches!(self, UserRole::NetworkAdmin | UserRole::SiteAdmin)
    }

    pub fn can_manage_network(&self) -> bool {
        matches!(self, UserRole::NetworkAdmin)
    }
}

/// Full user row. Holds the password hash; never serialize it.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as returned by the API, without credentials or lockout state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            display_name: u.display_name,
            role: u.role,
            is_active: u.is_active,
            last_login: u.last_login,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 3, max = 100))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 10))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_role_serialization() {
        let role = UserRole::SiteAdmin;
        let json = serde_json::to_string(&role).unwrap();
        assert_eq!(json, "\"SiteAdmin\"");
    }

    #[test]
    fn role_capabilities() {
        assert!(UserRole::NetworkAdmin.can_manage_network());
        assert!(UserRole::NetworkAdmin.can_manage_site());
        assert!(UserRole::SiteAdmin.can_manage_site());
        assert!(!UserRole::SiteAdmin.can_manage_network());
        assert!(!UserRole::Viewer.can_manage_site());
    }

    #[test]
    fn user_response_excludes_password() {
        let json = serde_json::to_string(&UserResponse {
            id: Uuid::nil(),
            username: "admin".to_string(),
            email: "admin@test.com".to_string(),
            display_name: "Admin".to_string(),
            role: UserRole::NetworkAdmin,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        })
        .unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("hash"));
    }

    #[test]
    fn create_user_validation() {
        let input = CreateUser {
            username: "ab".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            display_name: "X".to_string(),
            role: UserRole::Viewer,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("display_name"));
    }
}
