use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use diesel::prelude::*;
use diesel::PgArrayExpressionMethods;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::shared::error::ApiError;
use crate::shared::models::schema::{
    certifications, packaging, price_sheet_items, processing_variants,
};
use crate::shared::models::{Certification, Packaging};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateNamedEntryRequest {
    pub name: String,
    #[serde(default = "empty_attributes")]
    pub attributes: serde_json::Value,
}

fn empty_attributes() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct UpdateNamedEntryRequest {
    pub name: Option<String>,
    pub attributes: Option<serde_json::Value>,
}

fn apply_named_entry_update(
    name: &mut String,
    attributes: &mut serde_json::Value,
    req: &UpdateNamedEntryRequest,
) -> Result<(), ApiError> {
    if let Some(new_name) = &req.name {
        if new_name.trim().is_empty() {
            return Err(ApiError::validation("name", "name is required"));
        }
        *name = new_name.trim().to_string();
    }
    if let Some(new_attributes) = &req.attributes {
        if !new_attributes.is_object() {
            return Err(ApiError::validation("attributes", "must be an object"));
        }
        *attributes = new_attributes.clone();
    }
    Ok(())
}

pub async fn create_packaging(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateNamedEntryRequest>,
) -> Result<(StatusCode, Json<Packaging>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }
    if !req.attributes.is_object() {
        return Err(ApiError::validation("attributes", "must be an object"));
    }
    let entry = Packaging {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        name: req.name.trim().to_string(),
        attributes: req.attributes,
    };
    let mut conn = state.conn.get()?;
    diesel::insert_into(packaging::table)
        .values(&entry)
        .execute(&mut conn)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_packaging(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<Packaging>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Packaging> = packaging::table
        .filter(packaging::tenant_id.eq(auth.tenant_id))
        .order(packaging::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn update_packaging(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNamedEntryRequest>,
) -> Result<Json<Packaging>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut entry: Packaging = packaging::table
        .filter(packaging::id.eq(id))
        .filter(packaging::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("packaging".into()))?;

    apply_named_entry_update(&mut entry.name, &mut entry.attributes, &req)?;
    diesel::update(packaging::table.find(entry.id))
        .set(&entry)
        .execute(&mut conn)?;
    Ok(Json(entry))
}

pub async fn delete_packaging(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;

    let variant_refs: i64 = processing_variants::table
        .filter(processing_variants::tenant_id.eq(auth.tenant_id))
        .filter(processing_variants::packaging_ids.contains(vec![id]))
        .count()
        .get_result(&mut conn)?;
    let line_refs: i64 = price_sheet_items::table
        .filter(price_sheet_items::tenant_id.eq(auth.tenant_id))
        .filter(price_sheet_items::packaging_id.eq(id))
        .count()
        .get_result(&mut conn)?;
    if variant_refs > 0 || line_refs > 0 {
        return Err(ApiError::Conflict(
            "packaging is referenced by variants or price sheet lines".into(),
        ));
    }

    diesel::delete(
        packaging::table
            .filter(packaging::id.eq(id))
            .filter(packaging::tenant_id.eq(auth.tenant_id)),
    )
    .execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_certification(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateNamedEntryRequest>,
) -> Result<(StatusCode, Json<Certification>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }
    if !req.attributes.is_object() {
        return Err(ApiError::validation("attributes", "must be an object"));
    }
    let entry = Certification {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        name: req.name.trim().to_string(),
        attributes: req.attributes,
    };
    let mut conn = state.conn.get()?;
    diesel::insert_into(certifications::table)
        .values(&entry)
        .execute(&mut conn)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_certifications(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<Certification>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Certification> = certifications::table
        .filter(certifications::tenant_id.eq(auth.tenant_id))
        .order(certifications::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn update_certification(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNamedEntryRequest>,
) -> Result<Json<Certification>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut entry: Certification = certifications::table
        .filter(certifications::id.eq(id))
        .filter(certifications::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("certification".into()))?;

    apply_named_entry_update(&mut entry.name, &mut entry.attributes, &req)?;
    diesel::update(certifications::table.find(entry.id))
        .set(&entry)
        .execute(&mut conn)?;
    Ok(Json(entry))
}

pub async fn delete_certification(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;
    diesel::delete(
        certifications::table
            .filter(certifications::id.eq(id))
            .filter(certifications::tenant_id.eq(auth.tenant_id)),
    )
    .execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_entry_update_applies_fields() {
        let mut name = "Old".to_string();
        let mut attributes = serde_json::json!({});
        let req = UpdateNamedEntryRequest {
            name: Some("  25 lb carton  ".into()),
            attributes: Some(serde_json::json!({ "weight_lb": 25 })),
        };
        apply_named_entry_update(&mut name, &mut attributes, &req).expect("valid update");
        assert_eq!(name, "25 lb carton");
        assert_eq!(attributes["weight_lb"], 25);
    }

    #[test]
    fn test_named_entry_update_rejects_blank_name() {
        let mut name = "Old".to_string();
        let mut attributes = serde_json::json!({});
        let req = UpdateNamedEntryRequest {
            name: Some("   ".into()),
            attributes: None,
        };
        assert!(apply_named_entry_update(&mut name, &mut attributes, &req).is_err());
        assert_eq!(name, "Old");
    }

    #[test]
    fn test_named_entry_update_rejects_non_object_attributes() {
        let mut name = "Old".to_string();
        let mut attributes = serde_json::json!({});
        let req = UpdateNamedEntryRequest {
            name: None,
            attributes: Some(serde_json::json!([1, 2, 3])),
        };
        assert!(apply_named_entry_update(&mut name, &mut attributes, &req).is_err());
    }
}
