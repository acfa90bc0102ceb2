//! Contact book and delivery records. `record_send` is called from the
//! price sheet send path inside its transaction.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::shared::error::ApiError;
use crate::shared::models::schema::{contacts, deliveries};
use crate::shared::models::{Contact, Delivery};
use crate::shared::state::AppState;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub status: Option<String>,
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || email.len() > 254 {
        return Err(ApiError::validation("email", "not a valid email address"));
    }
    Ok(email)
}

fn validate_status(status: &str) -> Result<(), ApiError> {
    if status == STATUS_ACTIVE || status == STATUS_INACTIVE {
        Ok(())
    } else {
        Err(ApiError::validation("status", "must be active or inactive"))
    }
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }
    let email = validate_email(&req.email)?;

    let contact = Contact {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        name: req.name.trim().to_string(),
        email,
        company: req.company,
        status: STATUS_ACTIVE.to_string(),
        last_contact_at: None,
        created_at: Utc::now(),
    };
    let mut conn = state.conn.get()?;
    diesel::insert_into(contacts::table)
        .values(&contact)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => ApiError::Duplicate("email".into()),
            other => other.into(),
        })?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Contact> = contacts::table
        .filter(contacts::tenant_id.eq(auth.tenant_id))
        .order(contacts::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contact>, ApiError> {
    let mut conn = state.conn.get()?;
    let contact: Contact = contacts::table
        .filter(contacts::id.eq(id))
        .filter(contacts::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("contact".into()))?;
    Ok(Json(contact))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateContactRequest>,
) -> Result<Json<Contact>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut contact: Contact = contacts::table
        .filter(contacts::id.eq(id))
        .filter(contacts::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("contact".into()))?;

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name", "name is required"));
        }
        contact.name = name.trim().to_string();
    }
    if let Some(email) = &req.email {
        contact.email = validate_email(email)?;
    }
    if let Some(company) = &req.company {
        contact.company = Some(company.clone());
    }
    if let Some(status) = &req.status {
        validate_status(status)?;
        contact.status = status.clone();
    }

    diesel::update(contacts::table.find(contact.id))
        .set(&contact)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => ApiError::Duplicate("email".into()),
            other => other.into(),
        })?;
    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;
    conn.transaction::<_, ApiError, _>(|conn| {
        let owned: Option<Uuid> = contacts::table
            .filter(contacts::id.eq(id))
            .filter(contacts::tenant_id.eq(auth.tenant_id))
            .select(contacts::id)
            .first(conn)
            .optional()?;
        if owned.is_none() {
            return Ok(());
        }
        let history: i64 = deliveries::table
            .filter(deliveries::contact_id.eq(id))
            .count()
            .get_result(conn)?;
        ensure_no_delivery_history(history)?;
        diesel::delete(contacts::table.find(id)).execute(conn)?;
        Ok(())
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delivery rows are part of the engagement record and are never removed
/// while their sheet exists. A contact that has received sheets can only
/// be marked inactive, not hard-deleted.
fn ensure_no_delivery_history(delivery_count: i64) -> Result<(), ApiError> {
    if delivery_count > 0 {
        return Err(ApiError::Conflict(
            "contact has delivery history; mark it inactive instead".into(),
        ));
    }
    Ok(())
}

/// Records one delivery per contact for a sheet send. Re-sending the same
/// sheet to a contact refreshes `sent_at` on the existing row instead of
/// inserting a second one, so open counts survive re-sends.
pub fn record_send(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    price_sheet_id: Uuid,
    contact_ids: &[Uuid],
) -> Result<usize, ApiError> {
    let owned: i64 = contacts::table
        .filter(contacts::tenant_id.eq(tenant_id))
        .filter(contacts::id.eq_any(contact_ids))
        .count()
        .get_result(conn)?;
    if owned != contact_ids.len() as i64 {
        return Err(ApiError::InvalidReference("contacts".into()));
    }

    let now = Utc::now();
    let mut recorded = 0;
    for &contact_id in contact_ids {
        let row = Delivery {
            id: Uuid::new_v4(),
            price_sheet_id,
            contact_id,
            sent_at: now,
            opened_at: None,
            open_count: 0,
        };
        recorded += diesel::insert_into(deliveries::table)
            .values(&row)
            .on_conflict((deliveries::price_sheet_id, deliveries::contact_id))
            .do_update()
            .set(deliveries::sent_at.eq(now))
            .execute(conn)?;
    }

    diesel::update(
        contacts::table
            .filter(contacts::tenant_id.eq(tenant_id))
            .filter(contacts::id.eq_any(contact_ids)),
    )
    .set(contacts::last_contact_at.eq(now))
    .execute(conn)?;

    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email("  Buyer@Example.COM ").expect("valid"),
            "buyer@example.com"
        );
        assert!(validate_email("no-at-sign").is_err());
    }

    #[test]
    fn test_validate_status() {
        assert!(validate_status("active").is_ok());
        assert!(validate_status("inactive").is_ok());
        assert!(validate_status("archived").is_err());
    }

    #[test]
    fn test_delivery_history_blocks_deletion() {
        assert!(ensure_no_delivery_history(0).is_ok());
        let err = ensure_no_delivery_history(1).expect_err("history must block");
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
