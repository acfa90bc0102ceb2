//! Per-tenant chatbot widget settings. The config row is created lazily on
//! first read, disabled, so tenants who never touch the feature still get a
//! stable shape back.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::shared::error::ApiError;
use crate::shared::models::schema::chatbot_configs;
use crate::shared::models::ChatbotConfig;
use crate::shared::state::AppState;

pub const KNOWN_TONES: &[&str] = &["friendly", "formal", "concise"];
const DEFAULT_TONE: &str = "friendly";

#[derive(Debug, Deserialize)]
pub struct UpdateChatbotRequest {
    pub enabled: Option<bool>,
    pub tone: Option<String>,
    pub knowledge: Option<serde_json::Value>,
}

/// What the embeddable widget may see: no knowledge base, no timestamps.
#[derive(Debug, Serialize)]
pub struct WidgetConfig {
    pub enabled: bool,
    pub tone: String,
}

fn default_config(tenant_id: Uuid) -> ChatbotConfig {
    let now = Utc::now();
    ChatbotConfig {
        tenant_id,
        enabled: false,
        knowledge: serde_json::json!([]),
        tone: DEFAULT_TONE.to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn load_or_create(conn: &mut PgConnection, tenant_id: Uuid) -> Result<ChatbotConfig, ApiError> {
    diesel::insert_into(chatbot_configs::table)
        .values(&default_config(tenant_id))
        .on_conflict(chatbot_configs::tenant_id)
        .do_nothing()
        .execute(conn)?;
    let config: ChatbotConfig = chatbot_configs::table.find(tenant_id).first(conn)?;
    Ok(config)
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<ChatbotConfig>, ApiError> {
    let mut conn = state.conn.get()?;
    let config = load_or_create(&mut conn, auth.tenant_id)?;
    Ok(Json(config))
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<UpdateChatbotRequest>,
) -> Result<Json<ChatbotConfig>, ApiError> {
    if let Some(tone) = &req.tone {
        if !KNOWN_TONES.contains(&tone.as_str()) {
            return Err(ApiError::validation("tone", "unknown tone"));
        }
    }
    if let Some(knowledge) = &req.knowledge {
        if !knowledge.is_array() {
            return Err(ApiError::validation(
                "knowledge",
                "must be an array of snippets",
            ));
        }
    }

    let mut conn = state.conn.get()?;
    let mut config = load_or_create(&mut conn, auth.tenant_id)?;
    if let Some(enabled) = req.enabled {
        config.enabled = enabled;
    }
    if let Some(tone) = req.tone {
        config.tone = tone;
    }
    if let Some(knowledge) = req.knowledge {
        config.knowledge = knowledge;
    }
    config.updated_at = Utc::now();

    diesel::update(chatbot_configs::table.find(auth.tenant_id))
        .set((
            chatbot_configs::enabled.eq(config.enabled),
            chatbot_configs::tone.eq(&config.tone),
            chatbot_configs::knowledge.eq(&config.knowledge),
            chatbot_configs::updated_at.eq(config.updated_at),
        ))
        .execute(&mut conn)?;
    Ok(Json(config))
}

/// Unauthenticated endpoint backing the embeddable widget. Tenants without
/// a config row read as disabled.
pub async fn widget_config(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<WidgetConfig>, ApiError> {
    let mut conn = state.conn.get()?;
    let config: Option<ChatbotConfig> = chatbot_configs::table
        .find(tenant_id)
        .first(&mut conn)
        .optional()?;

    Ok(Json(match config {
        Some(config) => WidgetConfig {
            enabled: config.enabled,
            tone: config.tone,
        },
        None => WidgetConfig {
            enabled: false,
            tone: DEFAULT_TONE.to_string(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = default_config(Uuid::new_v4());
        assert!(!config.enabled);
        assert_eq!(config.tone, DEFAULT_TONE);
        assert!(config.knowledge.is_array());
    }

    #[test]
    fn test_known_tones() {
        assert!(KNOWN_TONES.contains(&DEFAULT_TONE));
        assert!(!KNOWN_TONES.contains(&"sarcastic"));
    }
}
