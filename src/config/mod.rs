use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub environment: Environment,
    pub cors_allowed_origins: Vec<String>,
    /// Shared HMAC secrets keyed by webhook source name.
    pub webhook_secrets: HashMap<String, String>,
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://sheets:@localhost:5432/sheetserver".to_string());

        let environment = match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| parse_csv(&v))
            .unwrap_or_default();

        let webhook_secrets = std::env::var("WEBHOOK_SECRETS")
            .map(|v| parse_secret_map(&v))
            .unwrap_or_default();

        Ok(AppConfig {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database_url,
            environment,
            cors_allowed_origins,
            webhook_secrets,
            session_ttl_hours: std::env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn webhook_secret(&self, source: &str) -> Option<&str> {
        self.webhook_secrets.get(source).map(String::as_str)
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses "billing=whsec_abc,email=whsec_def" into a source -> secret map.
fn parse_secret_map(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| {
            let (source, secret) = pair.split_once('=')?;
            let source = source.trim();
            let secret = secret.trim();
            if source.is_empty() || secret.is_empty() {
                None
            } else {
                Some((source.to_string(), secret.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        assert_eq!(
            parse_csv("https://a.example, https://b.example ,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn test_parse_secret_map() {
        let map = parse_secret_map("billing=whsec_abc, email=whsec_def,broken");
        assert_eq!(map.get("billing").map(String::as_str), Some("whsec_abc"));
        assert_eq!(map.get("email").map(String::as_str), Some("whsec_def"));
        assert_eq!(map.len(), 2);
    }
}
