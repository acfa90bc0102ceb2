use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::shared::error::ApiError;
use crate::shared::models::schema::{crops, packaging, price_sheet_items, processing_variants};
use crate::shared::models::{Crop, ProcessingVariant};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VariantInput {
    pub name: String,
    #[serde(default)]
    pub packaging_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCropRequest {
    pub name: String,
    #[serde(default)]
    pub is_organic: bool,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCropRequest {
    pub name: Option<String>,
    pub is_organic: Option<bool>,
    pub variants: Option<Vec<VariantInput>>,
}

#[derive(Debug, Serialize)]
pub struct CropResponse {
    #[serde(flatten)]
    pub crop: Crop,
    pub variants: Vec<ProcessingVariant>,
}

fn tenant_packaging_ids(
    conn: &mut PgConnection,
    tenant_id: Uuid,
) -> Result<HashSet<Uuid>, ApiError> {
    let ids: Vec<Uuid> = packaging::table
        .filter(packaging::tenant_id.eq(tenant_id))
        .select(packaging::id)
        .load(conn)?;
    Ok(ids.into_iter().collect())
}

/// Turns variant inputs into ordered rows, rejecting any packaging id the
/// tenant does not own. List order defines the stored position.
fn build_variants(
    crop_id: Uuid,
    tenant_id: Uuid,
    inputs: &[VariantInput],
    owned_packaging: &HashSet<Uuid>,
) -> Result<Vec<ProcessingVariant>, ApiError> {
    let mut rows = Vec::with_capacity(inputs.len());
    for (position, input) in inputs.iter().enumerate() {
        if input.name.trim().is_empty() {
            return Err(ApiError::validation("variants", "variant name is required"));
        }
        for pkg in &input.packaging_ids {
            if !owned_packaging.contains(pkg) {
                return Err(ApiError::InvalidReference("packaging".into()));
            }
        }
        rows.push(ProcessingVariant {
            id: Uuid::new_v4(),
            crop_id,
            tenant_id,
            name: input.name.trim().to_string(),
            position: position as i32,
            packaging_ids: input.packaging_ids.clone(),
        });
    }
    Ok(rows)
}

fn load_variants(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    crop_id: Uuid,
) -> Result<Vec<ProcessingVariant>, ApiError> {
    let rows: Vec<ProcessingVariant> = processing_variants::table
        .filter(processing_variants::tenant_id.eq(tenant_id))
        .filter(processing_variants::crop_id.eq(crop_id))
        .order(processing_variants::position.asc())
        .load(conn)?;
    Ok(rows)
}

pub async fn create_crop(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateCropRequest>,
) -> Result<(StatusCode, Json<CropResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }
    let mut conn = state.conn.get()?;

    let crop = Crop {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        name: req.name.trim().to_string(),
        is_organic: req.is_organic,
        created_at: Utc::now(),
    };
    let owned = tenant_packaging_ids(&mut conn, auth.tenant_id)?;
    let variants = build_variants(crop.id, auth.tenant_id, &req.variants, &owned)?;

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(crops::table)
            .values(&crop)
            .execute(conn)?;
        diesel::insert_into(processing_variants::table)
            .values(&variants)
            .execute(conn)?;
        Ok(())
    })?;

    Ok((StatusCode::CREATED, Json(CropResponse { crop, variants })))
}

pub async fn list_crops(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<CropResponse>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Crop> = crops::table
        .filter(crops::tenant_id.eq(auth.tenant_id))
        .order(crops::name.asc())
        .load(&mut conn)?;

    let mut out = Vec::with_capacity(rows.len());
    for crop in rows {
        let variants = load_variants(&mut conn, auth.tenant_id, crop.id)?;
        out.push(CropResponse { crop, variants });
    }
    Ok(Json(out))
}

pub async fn get_crop(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<Json<CropResponse>, ApiError> {
    let mut conn = state.conn.get()?;
    let crop: Crop = crops::table
        .filter(crops::id.eq(id))
        .filter(crops::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("crop".into()))?;
    let variants = load_variants(&mut conn, auth.tenant_id, crop.id)?;
    Ok(Json(CropResponse { crop, variants }))
}

/// Updating variants replaces the whole ordered list. Existing price sheet
/// lines keep their variant ids, so a variant referenced by a line survives
/// under a new id only if the caller re-sends it; the line check on sheet
/// edits catches stale references.
pub async fn update_crop(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCropRequest>,
) -> Result<Json<CropResponse>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut crop: Crop = crops::table
        .filter(crops::id.eq(id))
        .filter(crops::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("crop".into()))?;

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name", "name is required"));
        }
        crop.name = name.trim().to_string();
    }
    if let Some(is_organic) = req.is_organic {
        crop.is_organic = is_organic;
    }

    let new_variants = match &req.variants {
        Some(inputs) => {
            let owned = tenant_packaging_ids(&mut conn, auth.tenant_id)?;
            Some(build_variants(crop.id, auth.tenant_id, inputs, &owned)?)
        }
        None => None,
    };

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::update(crops::table.find(crop.id))
            .set((crops::name.eq(&crop.name), crops::is_organic.eq(crop.is_organic)))
            .execute(conn)?;
        if let Some(variants) = &new_variants {
            diesel::delete(
                processing_variants::table
                    .filter(processing_variants::crop_id.eq(crop.id))
                    .filter(processing_variants::tenant_id.eq(auth.tenant_id)),
            )
            .execute(conn)?;
            diesel::insert_into(processing_variants::table)
                .values(variants)
                .execute(conn)?;
        }
        Ok(())
    })?;

    let variants = load_variants(&mut conn, auth.tenant_id, crop.id)?;
    Ok(Json(CropResponse { crop, variants }))
}

pub async fn delete_crop(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;

    let line_refs: i64 = price_sheet_items::table
        .filter(price_sheet_items::tenant_id.eq(auth.tenant_id))
        .filter(price_sheet_items::crop_id.eq(id))
        .count()
        .get_result(&mut conn)?;
    if line_refs > 0 {
        return Err(ApiError::Conflict(
            "crop is referenced by price sheet lines".into(),
        ));
    }

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::delete(
            processing_variants::table
                .filter(processing_variants::crop_id.eq(id))
                .filter(processing_variants::tenant_id.eq(auth.tenant_id)),
        )
        .execute(conn)?;
        diesel::delete(
            crops::table
                .filter(crops::id.eq(id))
                .filter(crops::tenant_id.eq(auth.tenant_id)),
        )
        .execute(conn)?;
        Ok(())
    })?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, packaging_ids: Vec<Uuid>) -> VariantInput {
        VariantInput {
            name: name.to_string(),
            packaging_ids,
        }
    }

    #[test]
    fn test_build_variants_preserves_order() {
        let crop_id = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let owned = HashSet::new();
        let rows = build_variants(
            crop_id,
            tenant,
            &[input("Whole", vec![]), input("Florets", vec![])],
            &owned,
        )
        .expect("valid");
        assert_eq!(rows[0].position, 0);
        assert_eq!(rows[0].name, "Whole");
        assert_eq!(rows[1].position, 1);
        assert_eq!(rows[1].name, "Florets");
    }

    #[test]
    fn test_build_variants_rejects_foreign_packaging() {
        let owned: HashSet<Uuid> = [Uuid::new_v4()].into_iter().collect();
        let err = build_variants(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[input("Whole", vec![Uuid::new_v4()])],
            &owned,
        )
        .expect_err("foreign packaging must fail");
        assert!(matches!(err, ApiError::InvalidReference(_)));
    }

    #[test]
    fn test_build_variants_rejects_blank_name() {
        let owned = HashSet::new();
        assert!(build_variants(Uuid::new_v4(), Uuid::new_v4(), &[input("  ", vec![])], &owned).is_err());
    }
}
