pub mod analytics;
pub mod api_router;
pub mod auth;
pub mod catalog;
pub mod chatbot;
pub mod config;
pub mod contacts;
pub mod price_sheets;
pub mod security;
pub mod shared;
pub mod users;
pub mod webhooks;
