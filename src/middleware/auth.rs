use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::async_trait;
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::response::Response;
use http::request::Parts;
use http::Request;
use jsonwebtoken::{DecodingKey, Validation};
use sqlx::PgPool;
use tower::{Layer, Service};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Actor, Role};
use crate::services::auth_service::Claims;

/// Resolves the Bearer token (when present) into an [`Actor`] stored in
/// request extensions. Requests without a valid staff token pass through
/// anonymously; staff-only handlers reject them at extraction time.
#[derive(Clone)]
pub struct AuthLayer {
    pool: PgPool,
    jwt_secret: String,
}

impl AuthLayer {
    pub fn new(pool: PgPool, jwt_secret: String) -> Self {
        Self { pool, jwt_secret }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            pool: self.pool.clone(),
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    pool: PgPool,
    jwt_secret: String,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        let pool = self.pool.clone();
        let jwt_secret = self.jwt_secret.clone();

        Box::pin(async move {
            let token = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            if let Some(token) = token {
                let claims = jsonwebtoken::decode::<Claims>(
                    &token,
                    &DecodingKey::from_secret(jwt_secret.as_bytes()),
                    &Validation::default(),
                )
                .ok()
                .map(|data| data.claims);

                if let Some(claims) = claims {
                    match resolve_actor(&pool, &claims).await {
                        Ok(Some(actor)) => {
                            req.extensions_mut().insert(actor);
                        }
                        Ok(None) => {
                            tracing::warn!(
                                "token for user {} does not resolve to a staff account",
                                claims.sub
                            );
                        }
                        Err(e) => {
                            tracing::error!("actor lookup failed: {}", e);
                        }
                    }
                }
            }
            // No valid token: the request proceeds anonymously.

            inner.call(req).await
        })
    }
}

/// Role flags are re-read per request so a demotion takes effect
/// immediately, not at token expiry.
async fn resolve_actor(pool: &PgPool, claims: &Claims) -> Result<Option<Actor>, sqlx::Error> {
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return Ok(None);
    };

    let row: Option<(Uuid, String, bool, Option<bool>)> = sqlx::query_as(
        "SELECT u.id, u.username, u.is_staff, p.is_super_user \
         FROM app_users u \
         LEFT JOIN user_profiles p ON p.user_id = u.id \
         WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some((id, username, is_staff, is_super_user)) = row else {
        return Ok(None);
    };

    let role = if is_super_user.unwrap_or(false) {
        Role::SuperUser
    } else if is_staff {
        Role::Staff
    } else {
        return Ok(None);
    };

    Ok(Some(Actor {
        user_id: id,
        username,
        role,
    }))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
