//! Price sheet lifecycle: draft, line item editing, send, clone. Line items
//! are validated against a snapshot of the tenant's catalog before any row
//! is written.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::contacts;
use crate::shared::error::ApiError;
use crate::shared::models::schema::{
    packaging, price_sheet_items, price_sheets, processing_variants, regions,
};
use crate::shared::models::{PriceSheet, PriceSheetItem, SheetStatus};
use crate::shared::money;
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LineItemInput {
    pub crop_id: Uuid,
    pub variant_id: Uuid,
    pub packaging_id: Uuid,
    pub region_id: Uuid,
    /// Decimal dollars, e.g. "4.99". Stored as integer cents.
    pub price: String,
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSheetRequest {
    pub title: String,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct SendSheetRequest {
    pub contact_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LineItemView {
    pub id: Uuid,
    pub position: i32,
    pub crop_id: Uuid,
    pub variant_id: Uuid,
    pub packaging_id: Uuid,
    pub region_id: Uuid,
    pub price: String,
    pub unit: String,
}

impl From<PriceSheetItem> for LineItemView {
    fn from(item: PriceSheetItem) -> Self {
        Self {
            id: item.id,
            position: item.position,
            crop_id: item.crop_id,
            variant_id: item.variant_id,
            packaging_id: item.packaging_id,
            region_id: item.region_id,
            price: money::cents_to_display(item.price_cents),
            unit: item.unit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SheetResponse {
    #[serde(flatten)]
    pub sheet: PriceSheet,
    pub items: Vec<LineItemView>,
}

#[derive(Debug)]
pub struct VariantInfo {
    pub crop_id: Uuid,
    pub allowed_packaging: HashSet<Uuid>,
}

/// The ids a tenant's line items may reference, loaded once per request so
/// validation runs against a single consistent view of the catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub region_ids: HashSet<Uuid>,
    pub packaging_ids: HashSet<Uuid>,
    pub variants: HashMap<Uuid, VariantInfo>,
}

impl CatalogSnapshot {
    pub fn load(conn: &mut PgConnection, tenant_id: Uuid) -> Result<Self, ApiError> {
        let region_ids: Vec<Uuid> = regions::table
            .filter(regions::tenant_id.eq(tenant_id))
            .filter(regions::pending_delete.eq(false))
            .select(regions::id)
            .load(conn)?;
        let packaging_ids: Vec<Uuid> = packaging::table
            .filter(packaging::tenant_id.eq(tenant_id))
            .select(packaging::id)
            .load(conn)?;
        let variant_rows: Vec<(Uuid, Uuid, Vec<Uuid>)> = processing_variants::table
            .filter(processing_variants::tenant_id.eq(tenant_id))
            .select((
                processing_variants::id,
                processing_variants::crop_id,
                processing_variants::packaging_ids,
            ))
            .load(conn)?;

        let variants = variant_rows
            .into_iter()
            .map(|(id, crop_id, allowed)| {
                (
                    id,
                    VariantInfo {
                        crop_id,
                        allowed_packaging: allowed.into_iter().collect(),
                    },
                )
            })
            .collect();

        Ok(Self {
            region_ids: region_ids.into_iter().collect(),
            packaging_ids: packaging_ids.into_iter().collect(),
            variants,
        })
    }
}

/// Checks every line against the snapshot and converts prices to cents.
/// A variant with an empty packaging list accepts any tenant packaging;
/// a non-empty list restricts lines to exactly those options.
pub fn validate_line_items(
    sheet_id: Uuid,
    tenant_id: Uuid,
    inputs: &[LineItemInput],
    snapshot: &CatalogSnapshot,
) -> Result<Vec<PriceSheetItem>, ApiError> {
    let mut rows = Vec::with_capacity(inputs.len());
    for (position, input) in inputs.iter().enumerate() {
        if input.unit.trim().is_empty() {
            return Err(ApiError::validation("unit", "unit is required"));
        }
        if !snapshot.region_ids.contains(&input.region_id) {
            return Err(ApiError::InvalidReference("region".into()));
        }
        let variant = snapshot
            .variants
            .get(&input.variant_id)
            .ok_or_else(|| ApiError::InvalidReference("variant".into()))?;
        if variant.crop_id != input.crop_id {
            return Err(ApiError::InvalidReference("variant".into()));
        }
        if !snapshot.packaging_ids.contains(&input.packaging_id) {
            return Err(ApiError::InvalidReference("packaging".into()));
        }
        if !variant.allowed_packaging.is_empty()
            && !variant.allowed_packaging.contains(&input.packaging_id)
        {
            return Err(ApiError::InvalidReference("packaging".into()));
        }
        let price_cents = money::display_to_cents(&input.price)?;

        rows.push(PriceSheetItem {
            id: Uuid::new_v4(),
            price_sheet_id: sheet_id,
            tenant_id,
            position: position as i32,
            crop_id: input.crop_id,
            variant_id: input.variant_id,
            packaging_id: input.packaging_id,
            region_id: input.region_id,
            price_cents,
            unit: input.unit.trim().to_string(),
        });
    }
    Ok(rows)
}

fn load_sheet(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<PriceSheet, ApiError> {
    price_sheets::table
        .filter(price_sheets::id.eq(id))
        .filter(price_sheets::tenant_id.eq(tenant_id))
        .first(conn)
        .map_err(|_| ApiError::NotFound("price sheet".into()))
}

fn load_items(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    sheet_id: Uuid,
) -> Result<Vec<LineItemView>, ApiError> {
    let rows: Vec<PriceSheetItem> = price_sheet_items::table
        .filter(price_sheet_items::tenant_id.eq(tenant_id))
        .filter(price_sheet_items::price_sheet_id.eq(sheet_id))
        .order(price_sheet_items::position.asc())
        .load(conn)?;
    Ok(rows.into_iter().map(LineItemView::from).collect())
}

pub async fn create_sheet(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateSheetRequest>,
) -> Result<(StatusCode, Json<SheetResponse>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::validation("title", "title is required"));
    }
    let mut conn = state.conn.get()?;

    let now = Utc::now();
    let sheet = PriceSheet {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        title: req.title.trim().to_string(),
        status: SheetStatus::Draft.as_str().to_string(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    let snapshot = CatalogSnapshot::load(&mut conn, auth.tenant_id)?;
    let items = validate_line_items(sheet.id, auth.tenant_id, &req.items, &snapshot)?;

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(price_sheets::table)
            .values(&sheet)
            .execute(conn)?;
        diesel::insert_into(price_sheet_items::table)
            .values(&items)
            .execute(conn)?;
        Ok(())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(SheetResponse {
            sheet,
            items: items.into_iter().map(LineItemView::from).collect(),
        }),
    ))
}

pub async fn list_sheets(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<Vec<PriceSheet>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<PriceSheet> = price_sheets::table
        .filter(price_sheets::tenant_id.eq(auth.tenant_id))
        .order(price_sheets::updated_at.desc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn get_sheet(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<Json<SheetResponse>, ApiError> {
    let mut conn = state.conn.get()?;
    let sheet = load_sheet(&mut conn, auth.tenant_id, id)?;
    let items = load_items(&mut conn, auth.tenant_id, sheet.id)?;
    Ok(Json(SheetResponse { sheet, items }))
}

/// Full replacement of a draft's line items. Sent sheets are immutable.
pub async fn replace_items(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceItemsRequest>,
) -> Result<Json<SheetResponse>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut sheet = load_sheet(&mut conn, auth.tenant_id, id)?;
    if SheetStatus::parse(&sheet.status) != Some(SheetStatus::Draft) {
        return Err(ApiError::Conflict("sent sheets cannot be edited".into()));
    }

    let snapshot = CatalogSnapshot::load(&mut conn, auth.tenant_id)?;
    let items = validate_line_items(sheet.id, auth.tenant_id, &req.items, &snapshot)?;

    let now = Utc::now();
    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::delete(
            price_sheet_items::table
                .filter(price_sheet_items::price_sheet_id.eq(sheet.id))
                .filter(price_sheet_items::tenant_id.eq(auth.tenant_id)),
        )
        .execute(conn)?;
        diesel::insert_into(price_sheet_items::table)
            .values(&items)
            .execute(conn)?;
        diesel::update(price_sheets::table.find(sheet.id))
            .set(price_sheets::updated_at.eq(now))
            .execute(conn)?;
        Ok(())
    })?;
    sheet.updated_at = now;

    Ok(Json(SheetResponse {
        sheet,
        items: items.into_iter().map(LineItemView::from).collect(),
    }))
}

/// Marks a draft as sent and records one delivery per contact. Sending an
/// already-sent sheet to more contacts is allowed; the status transition
/// only ever goes draft to sent.
pub async fn send_sheet(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendSheetRequest>,
) -> Result<Json<SheetResponse>, ApiError> {
    if req.contact_ids.is_empty() {
        return Err(ApiError::validation(
            "contact_ids",
            "at least one contact is required",
        ));
    }
    let mut conn = state.conn.get()?;
    let mut sheet = load_sheet(&mut conn, auth.tenant_id, id)?;

    let line_count: i64 = price_sheet_items::table
        .filter(price_sheet_items::price_sheet_id.eq(sheet.id))
        .filter(price_sheet_items::tenant_id.eq(auth.tenant_id))
        .count()
        .get_result(&mut conn)?;
    if line_count == 0 {
        return Err(ApiError::validation(
            "items",
            "cannot send a sheet with no line items",
        ));
    }

    let now = Utc::now();
    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::update(
            price_sheets::table
                .filter(price_sheets::id.eq(sheet.id))
                .filter(price_sheets::status.eq(SheetStatus::Draft.as_str())),
        )
        .set(price_sheets::status.eq(SheetStatus::Sent.as_str()))
        .execute(conn)?;
        // Re-sends bump updated_at as well.
        diesel::update(price_sheets::table.find(sheet.id))
            .set(price_sheets::updated_at.eq(now))
            .execute(conn)?;
        contacts::record_send(conn, auth.tenant_id, sheet.id, &req.contact_ids)?;
        Ok(())
    })?;
    sheet.status = SheetStatus::Sent.as_str().to_string();
    sheet.updated_at = now;

    info!(
        tenant = %auth.tenant_id,
        sheet = %sheet.id,
        contacts = req.contact_ids.len(),
        "price sheet sent"
    );
    let items = load_items(&mut conn, auth.tenant_id, sheet.id)?;
    Ok(Json(SheetResponse { sheet, items }))
}

/// Copies a sheet into a fresh draft at version + 1 with the same lines.
pub async fn clone_sheet(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SheetResponse>), ApiError> {
    let mut conn = state.conn.get()?;
    let source = load_sheet(&mut conn, auth.tenant_id, id)?;

    let now = Utc::now();
    let copy = PriceSheet {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id,
        title: source.title.clone(),
        status: SheetStatus::Draft.as_str().to_string(),
        version: source.version + 1,
        created_at: now,
        updated_at: now,
    };

    let source_items: Vec<PriceSheetItem> = price_sheet_items::table
        .filter(price_sheet_items::price_sheet_id.eq(source.id))
        .filter(price_sheet_items::tenant_id.eq(auth.tenant_id))
        .order(price_sheet_items::position.asc())
        .load(&mut conn)?;
    let copied: Vec<PriceSheetItem> = source_items
        .into_iter()
        .map(|item| PriceSheetItem {
            id: Uuid::new_v4(),
            price_sheet_id: copy.id,
            ..item
        })
        .collect();

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(price_sheets::table)
            .values(&copy)
            .execute(conn)?;
        diesel::insert_into(price_sheet_items::table)
            .values(&copied)
            .execute(conn)?;
        Ok(())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(SheetResponse {
            sheet: copy,
            items: copied.into_iter().map(LineItemView::from).collect(),
        }),
    ))
}
