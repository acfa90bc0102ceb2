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
use crate::shared::models::schema::{price_sheet_items, regions, shipping_points};
use crate::shared::models::{Region, ShippingPoint};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRegionRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRegionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateShippingPointRequest {
    pub region_id: Uuid,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShippingPointRequest {
    pub region_id: Option<Uuid>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

pub async fn create_region(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateRegionRequest>,
) -> Result<(StatusCode, Json<Region>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "name is required"));
    }
    let region = Region {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        name: req.name.trim().to_string(),
        description: req.description,
        pending_delete: false,
        created_at: Utc::now(),
    };
    let mut conn = state.conn.get()?;
    diesel::insert_into(regions::table)
        .values(&region)
        .execute(&mut conn)?;
    Ok((StatusCode::CREATED, Json(region)))
}

pub async fn list_regions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<Region>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Region> = regions::table
        .filter(regions::tenant_id.eq(auth.tenant_id))
        .filter(regions::pending_delete.eq(false))
        .order(regions::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn update_region(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRegionRequest>,
) -> Result<Json<Region>, ApiError> {
    let mut conn = state.conn.get()?;
    let scoped = regions::table
        .filter(regions::id.eq(id))
        .filter(regions::tenant_id.eq(auth.tenant_id));

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name", "name is required"));
        }
        diesel::update(scoped)
            .set(regions::name.eq(name.trim()))
            .execute(&mut conn)?;
    }
    if let Some(description) = &req.description {
        diesel::update(scoped)
            .set(regions::description.eq(description))
            .execute(&mut conn)?;
    }

    let region: Region = scoped
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("region".into()))?;
    Ok(Json(region))
}

/// Refuses while any shipping point or price sheet line still references
/// the region. Otherwise removes in two steps (mark, then delete) inside
/// one transaction so a retried delete is a no-op, not an error.
pub fn remove_region(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<(), ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let exists: Option<Uuid> = regions::table
            .filter(regions::id.eq(id))
            .filter(regions::tenant_id.eq(tenant_id))
            .select(regions::id)
            .first(conn)
            .optional()?;
        if exists.is_none() {
            // Already gone; retried deletes succeed.
            return Ok(());
        }

        let shipping_refs: i64 = shipping_points::table
            .filter(shipping_points::tenant_id.eq(tenant_id))
            .filter(shipping_points::region_id.eq(id))
            .count()
            .get_result(conn)?;
        let line_refs: i64 = price_sheet_items::table
            .filter(price_sheet_items::tenant_id.eq(tenant_id))
            .filter(price_sheet_items::region_id.eq(id))
            .count()
            .get_result(conn)?;
        if shipping_refs > 0 || line_refs > 0 {
            return Err(ApiError::Conflict(
                "region is referenced by shipping points or price sheet lines".into(),
            ));
        }

        diesel::update(
            regions::table
                .filter(regions::id.eq(id))
                .filter(regions::tenant_id.eq(tenant_id)),
        )
        .set(regions::pending_delete.eq(true))
        .execute(conn)?;

        diesel::delete(
            regions::table
                .filter(regions::id.eq(id))
                .filter(regions::tenant_id.eq(tenant_id))
                .filter(regions::pending_delete.eq(true)),
        )
        .execute(conn)?;
        Ok(())
    })
}

pub async fn delete_region(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;
    remove_region(&mut conn, auth.tenant_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_shipping_point(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateShippingPointRequest>,
) -> Result<(StatusCode, Json<ShippingPoint>), ApiError> {
    if req.address.trim().is_empty() {
        return Err(ApiError::validation("address", "address is required"));
    }
    let mut conn = state.conn.get()?;

    let region_owned: Option<Uuid> = regions::table
        .filter(regions::id.eq(req.region_id))
        .filter(regions::tenant_id.eq(auth.tenant_id))
        .select(regions::id)
        .first(&mut conn)
        .optional()?;
    if region_owned.is_none() {
        return Err(ApiError::InvalidReference("region".into()));
    }

    let point = ShippingPoint {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        region_id: req.region_id,
        address: req.address.trim().to_string(),
        city: req.city,
        state: req.state,
        postal_code: req.postal_code,
        created_at: Utc::now(),
    };
    diesel::insert_into(shipping_points::table)
        .values(&point)
        .execute(&mut conn)?;
    Ok((StatusCode::CREATED, Json(point)))
}

pub async fn list_shipping_points(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<ShippingPoint>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<ShippingPoint> = shipping_points::table
        .filter(shipping_points::tenant_id.eq(auth.tenant_id))
        .order(shipping_points::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn update_shipping_point(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateShippingPointRequest>,
) -> Result<Json<ShippingPoint>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut point: ShippingPoint = shipping_points::table
        .filter(shipping_points::id.eq(id))
        .filter(shipping_points::tenant_id.eq(auth.tenant_id))
        .first(&mut conn)
        .map_err(|_| ApiError::NotFound("shipping point".into()))?;

    if let Some(region_id) = req.region_id {
        let region_owned: Option<Uuid> = regions::table
            .filter(regions::id.eq(region_id))
            .filter(regions::tenant_id.eq(auth.tenant_id))
            .select(regions::id)
            .first(&mut conn)
            .optional()?;
        if region_owned.is_none() {
            return Err(ApiError::InvalidReference("region".into()));
        }
        point.region_id = region_id;
    }
    if let Some(address) = &req.address {
        if address.trim().is_empty() {
            return Err(ApiError::validation("address", "address is required"));
        }
        point.address = address.trim().to_string();
    }
    if let Some(city) = &req.city {
        point.city = Some(city.clone());
    }
    if let Some(state_field) = &req.state {
        point.state = Some(state_field.clone());
    }
    if let Some(postal_code) = &req.postal_code {
        point.postal_code = Some(postal_code.clone());
    }

    diesel::update(shipping_points::table.find(point.id))
        .set(&point)
        .execute(&mut conn)?;
    Ok(Json(point))
}

pub async fn delete_shipping_point(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.conn.get()?;
    diesel::delete(
        shipping_points::table
            .filter(shipping_points::id.eq(id))
            .filter(shipping_points::tenant_id.eq(auth.tenant_id)),
    )
    .execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}
