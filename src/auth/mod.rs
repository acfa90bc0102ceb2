pub mod password;
pub mod session;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::shared::error::ApiError;
use crate::shared::models::schema::{sessions, users};
use crate::shared::models::{SessionRecord, SubscriptionTier, User};
use crate::shared::state::AppState;
use session::{is_session_valid, new_session};

/// Verified tenant identity, injected by [`require_session`] into every
/// request that reaches a protected handler. Handlers never read auth
/// headers themselves.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub tenant_id: Uuid,
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let mut conn = state.conn.get()?;

    let record: Option<SessionRecord> = sessions::table
        .filter(sessions::token.eq(&token))
        .first(&mut conn)
        .optional()?;
    let record = record.ok_or(ApiError::Unauthorized)?;
    if !is_session_valid(&record, Utc::now()) {
        return Err(ApiError::Unauthorized);
    }

    let active: Option<bool> = users::table
        .find(record.user_id)
        .select(users::is_active)
        .first(&mut conn)
        .optional()?;
    if !active.unwrap_or(false) {
        return Err(ApiError::Forbidden);
    }

    req.extensions_mut().insert(AuthSession {
        tenant_id: record.user_id,
        token,
    });
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || email.len() > 254 {
        return Err(ApiError::validation("email", "not a valid email address"));
    }
    Ok(email)
}

/// Default records provisioned for every new tenant.
fn default_preferences() -> serde_json::Value {
    serde_json::json!({
        "currency": "USD",
        "price_display": "per_unit",
        "notifications": { "email": true }
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<SessionResponse>), ApiError> {
    let email = normalize_email(&req.email)?;
    password::validate_new_password(&req.password)?;
    let password_hash =
        password::hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash,
        subscription_tier: SubscriptionTier::Free.as_str().to_string(),
        company_name: req.company_name,
        preferences: default_preferences(),
        billing_plan: "starter".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let mut conn = state.conn.get()?;
    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => ApiError::Duplicate("email".into()),
            other => other.into(),
        })?;

    let record = new_session(user.id, state.config.session_ttl_hours);
    diesel::insert_into(sessions::table)
        .values(&record)
        .execute(&mut conn)?;

    info!(tenant = %user.id, "registered new tenant");
    Ok((
        axum::http::StatusCode::CREATED,
        Json(SessionResponse {
            token: record.token,
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let email = normalize_email(&req.email)?;
    let mut conn = state.conn.get()?;

    let user: Option<User> = users::table
        .filter(users::email.eq(&email))
        .filter(users::is_active.eq(true))
        .first(&mut conn)
        .optional()?;
    // Same failure for unknown email and wrong password, and the unknown
    // case still pays for a hash verification.
    let user = match user {
        Some(user) => user,
        None => {
            password::verify_dummy(&req.password);
            return Err(ApiError::Unauthorized);
        }
    };

    let verified = password::verify_password(&req.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !verified {
        return Err(ApiError::Unauthorized);
    }

    let record = new_session(user.id, state.config.session_ttl_hours);
    diesel::insert_into(sessions::table)
        .values(&record)
        .execute(&mut conn)?;

    Ok(Json(SessionResponse {
        token: record.token,
        user,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth): axum::Extension<AuthSession>,
) -> Result<axum::http::StatusCode, ApiError> {
    let mut conn = state.conn.get()?;
    diesel::update(sessions::table.filter(sessions::token.eq(&auth.token)))
        .set(sessions::revoked.eq(true))
        .execute(&mut conn)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth): axum::Extension<AuthSession>,
) -> Result<Json<User>, ApiError> {
    let mut conn = state.conn.get()?;
    let user: User = users::table
        .find(auth.tenant_id)
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("user".into()))?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Grower@Example.COM ").expect("valid"),
            "grower@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("").is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc123".parse().expect("header"),
        );
        assert_eq!(bearer_token(&headers), Some("abc123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Basic abc123".parse().expect("header"),
        );
        assert_eq!(bearer_token(&headers), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_default_preferences_shape() {
        let prefs = default_preferences();
        assert_eq!(prefs["currency"], "USD");
        assert_eq!(prefs["notifications"]["email"], true);
    }
}
