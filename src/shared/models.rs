use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use self::schema::{
    certifications, chatbot_configs, contacts, crops, deliveries, packaging, price_sheet_items,
    price_sheets, processing_variants, regions, sessions, shipping_points, users, webhook_events,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Premium,
    Enterprise,
    Admin,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "premium" => Some(Self::Premium),
            "enterprise" => Some(Self::Enterprise),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetStatus {
    Draft,
    Sent,
}

impl SheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub subscription_tier: String,
    pub company_name: Option<String>,
    pub preferences: serde_json::Value,
    pub billing_plan: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = sessions)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = regions)]
pub struct Region {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub pending_delete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = shipping_points)]
pub struct ShippingPoint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub region_id: Uuid,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crops)]
pub struct Crop {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_organic: bool,
    pub created_at: DateTime<Utc>,
}

/// A named preparation of a crop (e.g. "Florets") constraining the packaging
/// options a price sheet line may reference.
#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = processing_variants)]
pub struct ProcessingVariant {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub position: i32,
    pub packaging_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = certifications)]
pub struct Certification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = packaging)]
pub struct Packaging {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize)]
#[diesel(table_name = price_sheets)]
pub struct PriceSheet {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub status: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize)]
#[diesel(table_name = price_sheet_items)]
pub struct PriceSheetItem {
    pub id: Uuid,
    pub price_sheet_id: Uuid,
    pub tenant_id: Uuid,
    pub position: i32,
    pub crop_id: Uuid,
    pub variant_id: Uuid,
    pub packaging_id: Uuid,
    pub region_id: Uuid,
    pub price_cents: i64,
    pub unit: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = contacts)]
pub struct Contact {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub status: String,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One price sheet sent to one contact. Unique per (price_sheet_id,
/// contact_id); open tracking mutates it, nothing deletes it while the
/// parent sheet exists.
#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize)]
#[diesel(table_name = deliveries)]
pub struct Delivery {
    pub id: Uuid,
    pub price_sheet_id: Uuid,
    pub contact_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub open_count: i32,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize)]
#[diesel(table_name = chatbot_configs)]
pub struct ChatbotConfig {
    pub tenant_id: Uuid,
    pub enabled: bool,
    pub knowledge: serde_json::Value,
    pub tone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub source: String,
    pub processed_at: DateTime<Utc>,
}

pub mod schema {
    diesel::table! {
        users (id) {
            id -> Uuid,
            email -> Text,
            password_hash -> Text,
            subscription_tier -> Text,
            company_name -> Nullable<Text>,
            preferences -> Jsonb,
            billing_plan -> Text,
            is_active -> Bool,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        sessions (token) {
            token -> Text,
            user_id -> Uuid,
            created_at -> Timestamptz,
            expires_at -> Timestamptz,
            revoked -> Bool,
        }
    }

    diesel::table! {
        regions (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            name -> Text,
            description -> Nullable<Text>,
            pending_delete -> Bool,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        shipping_points (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            region_id -> Uuid,
            address -> Text,
            city -> Nullable<Text>,
            state -> Nullable<Text>,
            postal_code -> Nullable<Text>,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        crops (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            name -> Text,
            is_organic -> Bool,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        processing_variants (id) {
            id -> Uuid,
            crop_id -> Uuid,
            tenant_id -> Uuid,
            name -> Text,
            position -> Int4,
            packaging_ids -> Array<Uuid>,
        }
    }

    diesel::table! {
        certifications (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            name -> Text,
            attributes -> Jsonb,
        }
    }

    diesel::table! {
        packaging (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            name -> Text,
            attributes -> Jsonb,
        }
    }

    diesel::table! {
        price_sheets (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            title -> Text,
            status -> Text,
            version -> Int4,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        price_sheet_items (id) {
            id -> Uuid,
            price_sheet_id -> Uuid,
            tenant_id -> Uuid,
            position -> Int4,
            crop_id -> Uuid,
            variant_id -> Uuid,
            packaging_id -> Uuid,
            region_id -> Uuid,
            price_cents -> Int8,
            unit -> Text,
        }
    }

    diesel::table! {
        contacts (id) {
            id -> Uuid,
            tenant_id -> Uuid,
            name -> Text,
            email -> Text,
            company -> Nullable<Text>,
            status -> Text,
            last_contact_at -> Nullable<Timestamptz>,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        deliveries (id) {
            id -> Uuid,
            price_sheet_id -> Uuid,
            contact_id -> Uuid,
            sent_at -> Timestamptz,
            opened_at -> Nullable<Timestamptz>,
            open_count -> Int4,
        }
    }

    diesel::table! {
        chatbot_configs (tenant_id) {
            tenant_id -> Uuid,
            enabled -> Bool,
            knowledge -> Jsonb,
            tone -> Text,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        webhook_events (event_id) {
            event_id -> Text,
            source -> Text,
            processed_at -> Timestamptz,
        }
    }

    diesel::joinable!(deliveries -> price_sheets (price_sheet_id));
    diesel::joinable!(deliveries -> contacts (contact_id));
    diesel::joinable!(shipping_points -> regions (region_id));
    diesel::joinable!(processing_variants -> crops (crop_id));
    diesel::joinable!(price_sheet_items -> price_sheets (price_sheet_id));

    diesel::allow_tables_to_appear_in_same_query!(
        users,
        sessions,
        regions,
        shipping_points,
        crops,
        processing_variants,
        certifications,
        packaging,
        price_sheets,
        price_sheet_items,
        contacts,
        deliveries,
        chatbot_configs,
        webhook_events,
    );
}
