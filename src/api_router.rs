//! Route table for the whole service. Public endpoints (health, tracking
//! pixel, widget config, webhooks, register/login) are merged with the
//! session-guarded API; the guard runs before any protected handler.

use axum::extract::State;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::analytics;
use crate::auth;
use crate::catalog::{crops, packaging, regions};
use crate::chatbot;
use crate::contacts;
use crate::price_sheets;
use crate::security::cors::cors_layer_for;
use crate::security::headers::apply_security_headers;
use crate::shared::state::AppState;
use crate::users;
use crate::webhooks;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/public/track/open/:delivery_id", get(analytics::track_open))
        .route("/api/public/chatbot/:tenant_id", get(chatbot::widget_config))
        .route("/api/webhooks/:source", post(webhooks::receive));

    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/me/profile", put(users::update_profile))
        .route("/api/users/me/billing", put(users::update_billing))
        .route("/api/users/me", delete(users::deactivate))
        .route(
            "/api/regions",
            post(regions::create_region).get(regions::list_regions),
        )
        .route(
            "/api/regions/:id",
            put(regions::update_region).delete(regions::delete_region),
        )
        .route(
            "/api/shipping-points",
            post(regions::create_shipping_point).get(regions::list_shipping_points),
        )
        .route(
            "/api/shipping-points/:id",
            put(regions::update_shipping_point).delete(regions::delete_shipping_point),
        )
        .route("/api/crops", post(crops::create_crop).get(crops::list_crops))
        .route(
            "/api/crops/:id",
            get(crops::get_crop)
                .put(crops::update_crop)
                .delete(crops::delete_crop),
        )
        .route(
            "/api/packaging",
            post(packaging::create_packaging).get(packaging::list_packaging),
        )
        .route(
            "/api/packaging/:id",
            put(packaging::update_packaging).delete(packaging::delete_packaging),
        )
        .route(
            "/api/certifications",
            post(packaging::create_certification).get(packaging::list_certifications),
        )
        .route(
            "/api/certifications/:id",
            put(packaging::update_certification).delete(packaging::delete_certification),
        )
        .route(
            "/api/price-sheets",
            post(price_sheets::create_sheet).get(price_sheets::list_sheets),
        )
        .route("/api/price-sheets/:id", get(price_sheets::get_sheet))
        .route("/api/price-sheets/:id/items", put(price_sheets::replace_items))
        .route("/api/price-sheets/:id/send", post(price_sheets::send_sheet))
        .route("/api/price-sheets/:id/clone", post(price_sheets::clone_sheet))
        .route(
            "/api/contacts",
            post(contacts::create_contact).get(contacts::list_contacts),
        )
        .route(
            "/api/contacts/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route("/api/analytics/engagement", get(analytics::engagement))
        .route("/api/analytics/recent", get(analytics::recent_activity))
        .route(
            "/api/chatbot-config",
            get(chatbot::get_config).put(chatbot::update_config),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(middleware::from_fn(apply_security_headers))
        .layer(cors_layer_for(&state.config))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

/// Liveness probe. Always 200; database reachability is reported in the
/// body so a degraded pool does not flap the load balancer.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let database = if state.database_connected() {
        "connected"
    } else {
        "disconnected"
    };
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "database": database,
    }))
}
