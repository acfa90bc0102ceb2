//! Tenant self-service: profile, preferences, billing plan, deactivation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthSession;
use crate::shared::error::ApiError;
use crate::shared::models::schema::{sessions, users};
use crate::shared::models::User;
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub company_name: Option<String>,
    pub preferences: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBillingRequest {
    pub billing_plan: String,
}

const KNOWN_PLANS: &[&str] = &["starter", "growth", "enterprise"];

/// All requested profile fields in one changeset; absent fields stay
/// untouched and the whole change lands in a single UPDATE.
#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct ProfileChanges {
    company_name: Option<String>,
    preferences: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

fn profile_changes(
    req: &UpdateProfileRequest,
    now: DateTime<Utc>,
) -> Result<ProfileChanges, ApiError> {
    if let Some(prefs) = &req.preferences {
        if !prefs.is_object() {
            return Err(ApiError::validation("preferences", "must be an object"));
        }
    }
    Ok(ProfileChanges {
        company_name: req.company_name.clone(),
        preferences: req.preferences.clone(),
        updated_at: now,
    })
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let changes = profile_changes(&req, Utc::now())?;
    let mut conn = state.conn.get()?;
    diesel::update(users::table.find(auth.tenant_id))
        .set(&changes)
        .execute(&mut conn)?;

    let user: User = users::table.find(auth.tenant_id).first(&mut conn)?;
    Ok(Json(user))
}

pub async fn update_billing(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<UpdateBillingRequest>,
) -> Result<Json<User>, ApiError> {
    if !KNOWN_PLANS.contains(&req.billing_plan.as_str()) {
        return Err(ApiError::validation("billing_plan", "unknown plan"));
    }
    let mut conn = state.conn.get()?;
    diesel::update(users::table.find(auth.tenant_id))
        .set((
            users::billing_plan.eq(&req.billing_plan),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let user: User = users::table.find(auth.tenant_id).first(&mut conn)?;
    Ok(Json(user))
}

/// Accounts are never hard-deleted: the row is deactivated and all sessions
/// revoked. Dependent catalog/sheet/contact data stays in place, reachable
/// again if the account is reactivated by support.
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;
    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::update(users::table.find(auth.tenant_id))
            .set((users::is_active.eq(false), users::updated_at.eq(Utc::now())))
            .execute(conn)?;
        diesel::update(sessions::table.filter(sessions::user_id.eq(auth.tenant_id)))
            .set(sessions::revoked.eq(true))
            .execute(conn)?;
        Ok(())
    })?;
    info!(tenant = %auth.tenant_id, "tenant deactivated");
    Ok(StatusCode::NO_CONTENT)
}
