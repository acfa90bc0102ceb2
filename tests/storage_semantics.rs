//! Storage-level guarantees that need a live Postgres: the delivery upsert,
//! first-open tracking, region removal, and webhook replay protection.
//! Each test runs inside a test transaction against `TEST_DATABASE_URL`
//! and is a no-op when that variable is unset.

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use serde_json::json;
use uuid::Uuid;

use sheetserver::analytics::record_open;
use sheetserver::catalog::regions::remove_region;
use sheetserver::contacts::record_send;
use sheetserver::shared::error::ApiError;
use sheetserver::shared::models::schema::{
    contacts, deliveries, price_sheets, regions, shipping_points, users,
};
use sheetserver::shared::models::{
    Contact, Delivery, PriceSheet, Region, ShippingPoint, SubscriptionTier, User,
    WebhookEventRecord,
};
use sheetserver::shared::utils::{create_conn, run_migrations};
use sheetserver::webhooks::{record_and_apply, WebhookAction};

type TestConn = PooledConnection<ConnectionManager<PgConnection>>;

static MIGRATE: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn test_conn() -> Option<TestConn> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = create_conn(&url).expect("connect to test database");
    {
        let _guard = MIGRATE.lock().expect("migration lock");
        run_migrations(&pool).expect("run migrations");
    }
    let mut conn = pool.get().expect("check out connection");
    conn.begin_test_transaction().expect("begin test transaction");
    Some(conn)
}

fn new_tenant(conn: &mut PgConnection) -> Uuid {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", Uuid::new_v4()),
        password_hash: "unused".to_string(),
        subscription_tier: SubscriptionTier::Free.as_str().to_string(),
        company_name: None,
        preferences: json!({}),
        billing_plan: "starter".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(conn)
        .expect("insert tenant");
    user.id
}

fn new_contact(conn: &mut PgConnection, tenant_id: Uuid) -> Uuid {
    let contact = Contact {
        id: Uuid::new_v4(),
        tenant_id,
        name: "Buyer".to_string(),
        email: format!("{}@buyer.example", Uuid::new_v4()),
        company: None,
        status: "active".to_string(),
        last_contact_at: None,
        created_at: Utc::now(),
    };
    diesel::insert_into(contacts::table)
        .values(&contact)
        .execute(conn)
        .expect("insert contact");
    contact.id
}

fn new_sheet(conn: &mut PgConnection, tenant_id: Uuid) -> Uuid {
    let now = Utc::now();
    let sheet = PriceSheet {
        id: Uuid::new_v4(),
        tenant_id,
        title: "Weekly availability".to_string(),
        status: "sent".to_string(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(price_sheets::table)
        .values(&sheet)
        .execute(conn)
        .expect("insert sheet");
    sheet.id
}

fn load_deliveries(conn: &mut PgConnection, sheet_id: Uuid) -> Vec<Delivery> {
    deliveries::table
        .filter(deliveries::price_sheet_id.eq(sheet_id))
        .load(conn)
        .expect("load deliveries")
}

#[test]
fn resending_a_sheet_keeps_one_delivery_per_contact() {
    let Some(mut conn) = test_conn() else { return };
    let tenant = new_tenant(&mut conn);
    let contact = new_contact(&mut conn, tenant);
    let sheet = new_sheet(&mut conn, tenant);

    record_send(&mut conn, tenant, sheet, &[contact]).expect("first send");
    let delivery_id = load_deliveries(&mut conn, sheet)[0].id;
    record_open(&mut conn, delivery_id).expect("open");
    record_send(&mut conn, tenant, sheet, &[contact]).expect("second send");

    let rows = load_deliveries(&mut conn, sheet);
    assert_eq!(rows.len(), 1, "re-send must not add a second delivery");
    assert_eq!(rows[0].open_count, 1, "re-send must keep the open count");
    assert!(rows[0].opened_at.is_some());
}

#[test]
fn only_the_first_open_sets_opened_at() {
    let Some(mut conn) = test_conn() else { return };
    let tenant = new_tenant(&mut conn);
    let contact = new_contact(&mut conn, tenant);
    let sheet = new_sheet(&mut conn, tenant);
    record_send(&mut conn, tenant, sheet, &[contact]).expect("send");
    let delivery_id = load_deliveries(&mut conn, sheet)[0].id;

    record_open(&mut conn, delivery_id).expect("first open");
    let first_opened_at = load_deliveries(&mut conn, sheet)[0]
        .opened_at
        .expect("opened_at set");

    record_open(&mut conn, delivery_id).expect("second open");
    let row = &load_deliveries(&mut conn, sheet)[0];
    assert_eq!(row.open_count, 2);
    assert_eq!(row.opened_at, Some(first_opened_at), "opened_at is set once");
}

#[test]
fn record_send_refuses_contacts_of_another_tenant() {
    let Some(mut conn) = test_conn() else { return };
    let tenant_a = new_tenant(&mut conn);
    let tenant_b = new_tenant(&mut conn);
    let foreign_contact = new_contact(&mut conn, tenant_a);
    let sheet = new_sheet(&mut conn, tenant_b);

    let err = record_send(&mut conn, tenant_b, sheet, &[foreign_contact])
        .expect_err("foreign contact must fail");
    assert!(matches!(err, ApiError::InvalidReference(_)));
    assert!(load_deliveries(&mut conn, sheet).is_empty());
}

#[test]
fn referenced_region_survives_a_remove_attempt() {
    let Some(mut conn) = test_conn() else { return };
    let tenant = new_tenant(&mut conn);
    let region = Region {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        name: "Salinas Valley".to_string(),
        description: None,
        pending_delete: false,
        created_at: Utc::now(),
    };
    diesel::insert_into(regions::table)
        .values(&region)
        .execute(&mut conn)
        .expect("insert region");
    let point = ShippingPoint {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        region_id: region.id,
        address: "1 Field Rd".to_string(),
        city: None,
        state: None,
        postal_code: None,
        created_at: Utc::now(),
    };
    diesel::insert_into(shipping_points::table)
        .values(&point)
        .execute(&mut conn)
        .expect("insert shipping point");

    let err = remove_region(&mut conn, tenant, region.id).expect_err("referenced region");
    assert!(matches!(err, ApiError::Conflict(_)));
    let still_there: i64 = regions::table
        .filter(regions::id.eq(region.id))
        .count()
        .get_result(&mut conn)
        .expect("count");
    assert_eq!(still_there, 1, "failed remove must leave the region intact");

    diesel::delete(shipping_points::table.find(point.id))
        .execute(&mut conn)
        .expect("drop reference");
    remove_region(&mut conn, tenant, region.id).expect("unreferenced remove");
    // Retrying the same delete is a no-op, not an error.
    remove_region(&mut conn, tenant, region.id).expect("idempotent retry");
}

#[test]
fn duplicate_webhook_event_changes_nothing() {
    let Some(mut conn) = test_conn() else { return };
    let tenant = new_tenant(&mut conn);
    let event_id = format!("evt_{}", Uuid::new_v4());

    let first = WebhookEventRecord {
        event_id: event_id.clone(),
        source: "billing".to_string(),
        processed_at: Utc::now(),
    };
    let replay = record_and_apply(
        &mut conn,
        &first,
        &WebhookAction::SetTier {
            tenant_id: tenant,
            tier: SubscriptionTier::Premium,
        },
    )
    .expect("first delivery");
    assert!(!replay);

    // Same event id again, asking for a different tier.
    let second = WebhookEventRecord {
        event_id,
        source: "billing".to_string(),
        processed_at: Utc::now(),
    };
    let replay = record_and_apply(
        &mut conn,
        &second,
        &WebhookAction::SetTier {
            tenant_id: tenant,
            tier: SubscriptionTier::Enterprise,
        },
    )
    .expect("replayed delivery");
    assert!(replay);

    let tier: String = users::table
        .find(tenant)
        .select(users::subscription_tier)
        .first(&mut conn)
        .expect("load tier");
    assert_eq!(tier, "premium", "replay must not reapply the effect");
}
