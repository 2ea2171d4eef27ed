use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, AppUserModel, Role, UserProfileModel};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user_id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub is_super_user: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewStaffAccount {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub is_super_user: bool,
}

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    jwt_secret: String,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, is_staff, created_at";

impl AuthService {
    pub fn new(pool: PgPool, jwt_secret: String) -> Self {
        Self { pool, jwt_secret }
    }

    pub async fn login(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        let user: Option<AppUserModel> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE username = $1"
        ))
        .bind(&req.username)
        .fetch_optional(&self.pool)
        .await?;

        // Same rejection for unknown user and bad password.
        let user = user.ok_or(AppError::Unauthorized)?;
        let parsed = PasswordHash::new(&user.password_hash).map_err(|e| {
            tracing::error!("stored password hash for {} is invalid: {}", user.username, e);
            AppError::Unauthorized
        })?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed)
            .is_err()
        {
            tracing::warn!("failed login attempt for {}", req.username);
            return Err(AppError::Unauthorized);
        }

        let profile = self.ensure_profile(user.id).await?;
        let role = if profile.is_super_user {
            Role::SuperUser
        } else {
            Role::Staff
        };

        let (token, expires_at) = issue_jwt(&self.jwt_secret, user.id, &user.username, role)?;
        tracing::info!("user {} logged in", user.username);

        Ok(LoginResponse {
            token,
            expires_at: expires_at.to_rfc3339(),
            user_id: user.id,
            username: user.username,
            is_staff: user.is_staff,
            is_super_user: profile.is_super_user,
        })
    }

    /// Get-or-create the 1:1 profile row.
    pub async fn ensure_profile(&self, user_id: Uuid) -> AppResult<UserProfileModel> {
        let profile: UserProfileModel = sqlx::query_as(
            "INSERT INTO user_profiles (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING user_id, is_super_user, created_at",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    /// Super-user-only: create a staff account (optionally a super user).
    pub async fn create_staff_account(
        &self,
        actor: &Actor,
        req: NewStaffAccount,
    ) -> AppResult<LoginResponse> {
        if !actor.role.can_approve() {
            return Err(AppError::Forbidden(
                "super user privileges required".to_string(),
            ));
        }

        let username = req.username.trim();
        if username.is_empty() || username.len() > 150 {
            return Err(AppError::validation(
                "username",
                "username must be 1-150 characters",
            ));
        }
        if req.password.len() < 8 {
            return Err(AppError::validation(
                "password",
                "password must be at least 8 characters",
            ));
        }

        let password_hash = hash_password(&req.password)?;

        let mut tx = self.pool.begin().await?;

        let user: AppUserModel = sqlx::query_as(&format!(
            "INSERT INTO app_users (username, email, password_hash, is_staff) \
             VALUES ($1, $2, $3, TRUE) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(req.email.as_deref().unwrap_or(""))
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.to_string().contains("unique") || e.to_string().contains("duplicate") {
                AppError::Conflict("username already taken".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        sqlx::query("INSERT INTO user_profiles (user_id, is_super_user) VALUES ($1, $2)")
            .bind(user.id)
            .bind(req.is_super_user)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let role = if req.is_super_user {
            Role::SuperUser
        } else {
            Role::Staff
        };
        tracing::info!(
            "staff account {} created by {} ({:?})",
            user.username,
            actor.username,
            role
        );

        let (token, expires_at) = issue_jwt(&self.jwt_secret, user.id, &user.username, role)?;
        Ok(LoginResponse {
            token,
            expires_at: expires_at.to_rfc3339(),
            user_id: user.id,
            username: user.username,
            is_staff: true,
            is_super_user: req.is_super_user,
        })
    }

    /// Super-user-only: grant an existing account staff + super-user
    /// rights, creating its profile if missing.
    pub async fn promote(&self, actor: &Actor, username: &str) -> AppResult<UserProfileModel> {
        if !actor.role.can_approve() {
            return Err(AppError::Forbidden(
                "super user privileges required".to_string(),
            ));
        }

        let user: Option<AppUserModel> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        let user = user.ok_or_else(|| AppError::NotFound(format!("user {username}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE app_users SET is_staff = TRUE WHERE id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        let profile: UserProfileModel = sqlx::query_as(
            "INSERT INTO user_profiles (user_id, is_super_user) VALUES ($1, TRUE) \
             ON CONFLICT (user_id) DO UPDATE SET is_super_user = TRUE \
             RETURNING user_id, is_super_user, created_at",
        )
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("{} promoted {} to super user", actor.username, username);
        Ok(profile)
    }
}

fn issue_jwt(
    secret: &str,
    user_id: Uuid,
    username: &str,
    role: Role,
) -> AppResult<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let exp = now + chrono::Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role: match role {
            Role::SuperUser => "super_user".to_string(),
            Role::Staff => "staff".to_string(),
        },
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("JWT error: {}", e)))?;
    Ok((token, exp))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn jwt_round_trips_claims() {
        let user_id = Uuid::new_v4();
        let (token, exp) = issue_jwt("test-secret", user_id, "frontdesk", Role::SuperUser).unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, user_id.to_string());
        assert_eq!(data.claims.username, "frontdesk");
        assert_eq!(data.claims.role, "super_user");
        assert_eq!(data.claims.exp, exp.timestamp());
        assert!(data.claims.exp > data.claims.iat);
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let (token, _) = issue_jwt("secret-a", Uuid::new_v4(), "frontdesk", Role::Staff).unwrap();
        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret-b"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("correct horse").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"correct horse", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong horse", &parsed)
            .is_err());
    }
}
