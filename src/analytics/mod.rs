//! Open tracking and engagement rollups. The tracking pixel endpoint is
//! public and unauthenticated; everything it learns is keyed by the
//! unguessable delivery id.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::shared::error::ApiError;
use crate::shared::models::schema::{deliveries, price_sheets};
use crate::shared::models::{PriceSheet, SheetStatus};
use crate::shared::state::AppState;

/// Smallest valid transparent GIF89a, served for every pixel request so the
/// response is identical whether or not the delivery id matched anything.
const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;
const DEFAULT_RECENT_LIMIT: i64 = 10;
const MAX_RECENT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct EngagementQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EngagementSummary {
    pub days: i64,
    pub sent: i64,
    pub opened: i64,
    pub engagement_percent: i64,
}

#[derive(Debug, Serialize)]
pub struct RecentSheetActivity {
    #[serde(flatten)]
    pub sheet: PriceSheet,
    pub deliveries: i64,
    pub opened: i64,
    pub engagement_percent: i64,
}

/// Share of deliveries opened at least once, rounded to the nearest whole
/// percent. Zero sent means zero percent, not a division error.
pub fn engagement_percent(opened: i64, sent: i64) -> i64 {
    if sent <= 0 {
        return 0;
    }
    (opened * 100 + sent / 2) / sent
}

fn clamp(value: Option<i64>, default: i64, max: i64) -> i64 {
    value.unwrap_or(default).clamp(1, max)
}

/// Every open bumps the counter; only the first sets `opened_at`. Both
/// updates land in one transaction.
pub fn record_open(conn: &mut PgConnection, delivery_id: Uuid) -> Result<(), ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::update(deliveries::table.find(delivery_id))
            .set(deliveries::open_count.eq(deliveries::open_count + 1))
            .execute(conn)?;
        diesel::update(
            deliveries::table
                .filter(deliveries::id.eq(delivery_id))
                .filter(deliveries::opened_at.is_null()),
        )
        .set(deliveries::opened_at.eq(Utc::now()))
        .execute(conn)?;
        Ok(())
    })
}

/// Records an open and returns the pixel. Unknown ids still get the pixel.
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Path(delivery_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.conn.get()?;
    record_open(&mut conn, delivery_id)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        TRACKING_PIXEL,
    ))
}

pub async fn engagement(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<EngagementQuery>,
) -> Result<Json<EngagementSummary>, ApiError> {
    let days = clamp(query.days, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS);
    let since = Utc::now() - Duration::days(days);
    let mut conn = state.conn.get()?;

    let sent: i64 = deliveries::table
        .inner_join(price_sheets::table)
        .filter(price_sheets::tenant_id.eq(auth.tenant_id))
        .filter(deliveries::sent_at.ge(since))
        .count()
        .get_result(&mut conn)?;
    let opened: i64 = deliveries::table
        .inner_join(price_sheets::table)
        .filter(price_sheets::tenant_id.eq(auth.tenant_id))
        .filter(deliveries::sent_at.ge(since))
        .filter(deliveries::opened_at.is_not_null())
        .count()
        .get_result(&mut conn)?;

    Ok(Json(EngagementSummary {
        days,
        sent,
        opened,
        engagement_percent: engagement_percent(opened, sent),
    }))
}

pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<RecentSheetActivity>>, ApiError> {
    let limit = clamp(query.limit, DEFAULT_RECENT_LIMIT, MAX_RECENT_LIMIT);
    let mut conn = state.conn.get()?;

    let sheets: Vec<PriceSheet> = price_sheets::table
        .filter(price_sheets::tenant_id.eq(auth.tenant_id))
        .filter(price_sheets::status.eq(SheetStatus::Sent.as_str()))
        .order(price_sheets::updated_at.desc())
        .limit(limit)
        .load(&mut conn)?;

    let mut out = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let sent: i64 = deliveries::table
            .filter(deliveries::price_sheet_id.eq(sheet.id))
            .count()
            .get_result(&mut conn)?;
        let opened: i64 = deliveries::table
            .filter(deliveries::price_sheet_id.eq(sheet.id))
            .filter(deliveries::opened_at.is_not_null())
            .count()
            .get_result(&mut conn)?;
        out.push(RecentSheetActivity {
            sheet,
            deliveries: sent,
            opened,
            engagement_percent: engagement_percent(opened, sent),
        });
    }
    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_percent_rounds_to_nearest() {
        assert_eq!(engagement_percent(1, 3), 33);
        assert_eq!(engagement_percent(2, 3), 67);
        assert_eq!(engagement_percent(1, 2), 50);
        assert_eq!(engagement_percent(5, 5), 100);
    }

    #[test]
    fn test_engagement_percent_zero_sent() {
        assert_eq!(engagement_percent(0, 0), 0);
        assert_eq!(engagement_percent(3, 0), 0);
    }

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(clamp(None, 30, 365), 30);
        assert_eq!(clamp(Some(0), 30, 365), 1);
        assert_eq!(clamp(Some(9999), 30, 365), 365);
        assert_eq!(clamp(Some(7), 30, 365), 7);
    }

    #[test]
    fn test_pixel_is_a_gif() {
        assert_eq!(&TRACKING_PIXEL[..6], b"GIF89a");
        assert_eq!(*TRACKING_PIXEL.last().expect("non-empty"), 0x3b);
    }
}
