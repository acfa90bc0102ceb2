use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl CorsConfig {
    /// Production policy: only the configured product origins may call the
    /// API; credentialed requests allowed.
    pub fn production(allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_origins,
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ],
            allow_credentials: true,
            max_age_secs: 7200,
        }
    }

    /// Development policy: reflect whatever origin asks. Never used when
    /// APP_ENV=production.
    pub fn development() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }

    pub fn build(self) -> CorsLayer {
        let mut cors = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            cors = cors.allow_origin(AllowOrigin::mirror_request());
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            info!("CORS restricted to {} configured origins", origins.len());
            cors = cors.allow_origin(origins);
        }

        cors = cors
            .allow_methods(self.allowed_methods)
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                axum::http::header::ACCEPT,
            ])
            .max_age(std::time::Duration::from_secs(self.max_age_secs));

        if self.allow_credentials {
            cors = cors.allow_credentials(true);
        }

        cors
    }
}

pub fn cors_layer_for(config: &AppConfig) -> CorsLayer {
    if config.is_production() {
        CorsConfig::production(config.cors_allowed_origins.clone()).build()
    } else {
        CorsConfig::development().build()
    }
}
