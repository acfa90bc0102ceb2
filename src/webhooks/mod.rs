//! Inbound webhook gateway. Each source (billing provider, email provider)
//! has its own shared secret; the raw body is verified before it is parsed,
//! and every event id is recorded so replays become no-ops.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics;
use crate::contacts;
use crate::security::webhook::{SignatureCheck, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::shared::error::ApiError;
use crate::shared::models::schema::{contacts as contacts_table, users, webhook_events};
use crate::shared::models::{SubscriptionTier, WebhookEventRecord};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// The state change a verified event asks for. Unknown event types map to
/// `Ignore` and are acknowledged without effect, so providers adding new
/// types do not see delivery failures.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookAction {
    SetTier { tenant_id: Uuid, tier: SubscriptionTier },
    DeactivateContact { contact_id: Uuid },
    RecordOpen { delivery_id: Uuid },
    Ignore,
}

fn field_uuid(data: &serde_json::Value, field: &str) -> Result<Uuid, ApiError> {
    data.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::validation(field, "missing or not a uuid"))
}

pub fn map_event(
    source: &str,
    event_type: &str,
    data: &serde_json::Value,
) -> Result<WebhookAction, ApiError> {
    match (source, event_type) {
        ("billing", "subscription.updated") => {
            let tenant_id = field_uuid(data, "tenant_id")?;
            let tier = data
                .get("tier")
                .and_then(|v| v.as_str())
                .and_then(SubscriptionTier::parse)
                .ok_or_else(|| ApiError::validation("tier", "unknown subscription tier"))?;
            Ok(WebhookAction::SetTier { tenant_id, tier })
        }
        ("billing", "subscription.canceled") => Ok(WebhookAction::SetTier {
            tenant_id: field_uuid(data, "tenant_id")?,
            tier: SubscriptionTier::Free,
        }),
        ("email", "delivery.bounced") => Ok(WebhookAction::DeactivateContact {
            contact_id: field_uuid(data, "contact_id")?,
        }),
        ("email", "delivery.opened") => Ok(WebhookAction::RecordOpen {
            delivery_id: field_uuid(data, "delivery_id")?,
        }),
        _ => Ok(WebhookAction::Ignore),
    }
}

fn apply_action(conn: &mut PgConnection, action: &WebhookAction) -> Result<(), ApiError> {
    match action {
        WebhookAction::SetTier { tenant_id, tier } => {
            diesel::update(users::table.find(*tenant_id))
                .set((
                    users::subscription_tier.eq(tier.as_str()),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
        }
        WebhookAction::DeactivateContact { contact_id } => {
            diesel::update(contacts_table::table.find(*contact_id))
                .set(contacts_table::status.eq(contacts::STATUS_INACTIVE))
                .execute(conn)?;
        }
        WebhookAction::RecordOpen { delivery_id } => {
            analytics::record_open(conn, *delivery_id)?;
        }
        WebhookAction::Ignore => {}
    }
    Ok(())
}

/// Marks the event id processed and applies its effect in one transaction.
/// Returns true for a replay: the first delivery wins the insert, a replay
/// inserts zero rows and skips the effect entirely.
pub fn record_and_apply(
    conn: &mut PgConnection,
    record: &WebhookEventRecord,
    action: &WebhookAction,
) -> Result<bool, ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let inserted = diesel::insert_into(webhook_events::table)
            .values(record)
            .on_conflict(webhook_events::event_id)
            .do_nothing()
            .execute(conn)?;
        if inserted == 0 {
            return Ok(true);
        }
        apply_action(conn, action)?;
        Ok(false)
    })
}

pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let secret = state
        .config
        .webhook_secret(&source)
        .ok_or_else(|| ApiError::NotFound("webhook source".into()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match SignatureVerifier::default().verify(&body, signature, timestamp, secret) {
        SignatureCheck::Valid => {}
        check => {
            warn!(source = %source, ?check, "rejected webhook");
            return Err(ApiError::InvalidSignature);
        }
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|_| ApiError::validation("body", "not a valid event envelope"))?;
    if envelope.id.trim().is_empty() {
        return Err(ApiError::validation("id", "event id is required"));
    }
    let action = map_event(&source, &envelope.event_type, &envelope.data)?;

    let mut conn = state.conn.get()?;
    let record = WebhookEventRecord {
        event_id: envelope.id.clone(),
        source: source.clone(),
        processed_at: Utc::now(),
    };
    let replay = record_and_apply(&mut conn, &record, &action)?;

    if replay {
        info!(source = %source, event = %envelope.id, "replayed webhook ignored");
    } else {
        info!(source = %source, event = %envelope.id, kind = %envelope.event_type, "webhook processed");
    }
    Ok(Json(serde_json::json!({ "received": true, "replay": replay })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_billing_update_maps_to_tier_change() {
        let tenant = Uuid::new_v4();
        let action = map_event(
            "billing",
            "subscription.updated",
            &json!({ "tenant_id": tenant.to_string(), "tier": "premium" }),
        )
        .expect("valid event");
        assert_eq!(
            action,
            WebhookAction::SetTier {
                tenant_id: tenant,
                tier: SubscriptionTier::Premium
            }
        );
    }

    #[test]
    fn test_billing_cancel_drops_to_free() {
        let tenant = Uuid::new_v4();
        let action = map_event(
            "billing",
            "subscription.canceled",
            &json!({ "tenant_id": tenant.to_string() }),
        )
        .expect("valid event");
        assert_eq!(
            action,
            WebhookAction::SetTier {
                tenant_id: tenant,
                tier: SubscriptionTier::Free
            }
        );
    }

    #[test]
    fn test_unknown_tier_rejected() {
        let result = map_event(
            "billing",
            "subscription.updated",
            &json!({ "tenant_id": Uuid::new_v4().to_string(), "tier": "platinum" }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_email_bounce_deactivates_contact() {
        let contact = Uuid::new_v4();
        let action = map_event(
            "email",
            "delivery.bounced",
            &json!({ "contact_id": contact.to_string() }),
        )
        .expect("valid event");
        assert_eq!(action, WebhookAction::DeactivateContact { contact_id: contact });
    }

    #[test]
    fn test_unknown_event_type_is_ignored() {
        let action = map_event("billing", "invoice.finalized", &json!({})).expect("ignored");
        assert_eq!(action, WebhookAction::Ignore);

        let action = map_event("email", "delivery.deferred", &json!({})).expect("ignored");
        assert_eq!(action, WebhookAction::Ignore);
    }

    #[test]
    fn test_missing_field_rejected() {
        assert!(map_event("email", "delivery.bounced", &json!({})).is_err());
        assert!(map_event(
            "email",
            "delivery.bounced",
            &json!({ "contact_id": "not-a-uuid" })
        )
        .is_err());
    }
}
