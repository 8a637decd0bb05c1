//! Authentication: password hashing, JWT issuance and user accounts.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::user::{CreateUser, User, UserRole};

/// Failed logins allowed before the account is locked.
const MAX_FAILED_ATTEMPTS: i32 = 5;

const LOCKOUT_DURATION_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: Uuid,
    pub role: UserRole,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

/// Signing secret and token lifetimes.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl From<&AppConfig> for JwtSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_ttl_secs: config.jwt_access_token_expiry_secs,
            refresh_ttl_secs: config.jwt_refresh_token_expiry_secs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn sign(user: &User, kind: TokenKind, ttl_secs: i64, key: &EncodingKey) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        role: user.role,
        kind,
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        iat: now.timestamp(),
    };
    jsonwebtoken::encode(&Header::default(), &claims, key)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {e}")))
}

pub fn generate_tokens(user: &User, jwt: &JwtSettings) -> Result<TokenPair, AppError> {
    let key = EncodingKey::from_secret(jwt.secret.as_bytes());
    Ok(TokenPair {
        access_token: sign(user, TokenKind::Access, jwt.access_ttl_secs, &key)?,
        refresh_token: sign(user, TokenKind::Refresh, jwt.refresh_ttl_secs, &key)?,
        token_type: "Bearer".to_string(),
        expires_in: jwt.access_ttl_secs,
    })
}

/// Decode a token and check it is of the expected kind.
pub fn validate_token(token: &str, secret: &str, expected: TokenKind) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let claims = jsonwebtoken::decode::<Claims>(token, &key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)?;
    if claims.kind != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(claims)
}

pub async fn create_user(pool: &PgPool, input: &CreateUser) -> Result<User, AppError> {
    let password_hash = hash_password(&input.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, display_name, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&password_hash)
    .bind(&input.display_name)
    .bind(input.role)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("Username or email already exists".to_string())
        }
        _ => AppError::Database(e),
    })?;

    tracing::info!(user_id = %user.id, role = ?user.role, "Created user");
    Ok(user)
}

pub async fn login(
    pool: &PgPool,
    username: &str,
    password: &str,
    jwt: &JwtSettings,
) -> Result<TokenPair, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if user.locked_until.is_some_and(|until| until > Utc::now()) || !user.is_active {
        tracing::warn!(user_id = %user.id, "Login refused for locked or inactive account");
        return Err(AppError::Unauthorized);
    }

    if !verify_password(password, &user.password_hash)? {
        let attempts = user.failed_login_attempts + 1;
        let lock_until = (attempts >= MAX_FAILED_ATTEMPTS)
            .then(|| Utc::now() + Duration::minutes(LOCKOUT_DURATION_MINUTES));
        sqlx::query(
            "UPDATE users SET failed_login_attempts = $1, locked_until = COALESCE($2, locked_until) WHERE id = $3",
        )
        .bind(attempts)
        .bind(lock_until)
        .bind(user.id)
        .execute(pool)
        .await?;
        tracing::warn!(user_id = %user.id, attempts, locked = lock_until.is_some(), "Failed login");
        return Err(AppError::Unauthorized);
    }

    sqlx::query(
        "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, last_login = NOW() WHERE id = $1",
    )
    .bind(user.id)
    .execute(pool)
    .await?;

    generate_tokens(&user, jwt)
}

pub async fn refresh_token(pool: &PgPool, token: &str, jwt: &JwtSettings) -> Result<TokenPair, AppError> {
    let claims = validate_token(token, &jwt.secret, TokenKind::Refresh)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = true")
        .bind(claims.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    generate_tokens(&user, jwt)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn list_users(pool: &PgPool) -> Result<Vec<User>, AppError> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
        .fetch_all(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            username: "editor".to_string(),
            email: "editor@example.com".to_string(),
            password_hash: "hash".to_string(),
            display_name: "Editor".to_string(),
            role,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn settings(access: i64, refresh: i64) -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-for-jwt".to_string(),
            access_ttl_secs: access,
            refresh_ttl_secs: refresh,
        }
    }

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("SecurePassword123!").unwrap();
        assert_ne!(hash, "SecurePassword123!");
        assert!(verify_password("SecurePassword123!", &hash).unwrap());
        assert!(!verify_password("WrongPassword", &hash).unwrap());
    }

    #[test]
    fn tokens_carry_role_and_kind() {
        let jwt = settings(900, 604800);
        let account = user(UserRole::SiteAdmin);
        let tokens = generate_tokens(&account, &jwt).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);

        let claims = validate_token(&tokens.access_token, &jwt.secret, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "editor");
        assert_eq!(claims.user_id, account.id);
        assert_eq!(claims.role, UserRole::SiteAdmin);

        let refresh = validate_token(&tokens.refresh_token, &jwt.secret, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
    }

    #[test]
    fn wrong_kind_rejected() {
        let jwt = settings(900, 900);
        let tokens = generate_tokens(&user(UserRole::Viewer), &jwt).unwrap();
        assert!(validate_token(&tokens.refresh_token, &jwt.secret, TokenKind::Access).is_err());
        assert!(validate_token(&tokens.access_token, &jwt.secret, TokenKind::Refresh).is_err());
    }

    #[test]
    fn garbage_and_expired_tokens_rejected() {
        assert!(validate_token("garbage.token.here", "secret", TokenKind::Access).is_err());

        // Well past the default 60s leeway.
        let jwt = settings(-3600, -3600);
        let tokens = generate_tokens(&user(UserRole::NetworkAdmin), &jwt).unwrap();
        assert!(validate_token(&tokens.access_token, &jwt.secret, TokenKind::Access).is_err());
    }
}
