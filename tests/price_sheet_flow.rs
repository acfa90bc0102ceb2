//! End-to-end checks of the sheet building pipeline that run without a
//! database: catalog validation, price conversion, and engagement math.

use std::collections::HashSet;
use uuid::Uuid;

use sheetserver::analytics::engagement_percent;
use sheetserver::price_sheets::{
    validate_line_items, CatalogSnapshot, LineItemInput, VariantInfo,
};
use sheetserver::shared::error::ApiError;
use sheetserver::shared::money;

struct Fixture {
    region: Uuid,
    packaging: Uuid,
    variant: Uuid,
    crop: Uuid,
    snapshot: CatalogSnapshot,
}

fn fixture() -> Fixture {
    let region = Uuid::new_v4();
    let packaging = Uuid::new_v4();
    let variant = Uuid::new_v4();
    let crop = Uuid::new_v4();

    let mut snapshot = CatalogSnapshot::default();
    snapshot.region_ids.insert(region);
    snapshot.packaging_ids.insert(packaging);
    snapshot.variants.insert(
        variant,
        VariantInfo {
            crop_id: crop,
            allowed_packaging: [packaging].into_iter().collect::<HashSet<_>>(),
        },
    );

    Fixture {
        region,
        packaging,
        variant,
        crop,
        snapshot,
    }
}

fn line(f: &Fixture, price: &str) -> LineItemInput {
    LineItemInput {
        crop_id: f.crop,
        variant_id: f.variant,
        packaging_id: f.packaging,
        region_id: f.region,
        price: price.to_string(),
        unit: "case".to_string(),
    }
}

#[test]
fn builds_a_sheet_from_valid_lines() {
    let f = fixture();
    let sheet_id = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    let rows = validate_line_items(
        sheet_id,
        tenant,
        &[line(&f, "12.00"), line(&f, "4.5"), line(&f, "0.99")],
        &f.snapshot,
    )
    .expect("all lines valid");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].price_cents, 1200);
    assert_eq!(rows[1].price_cents, 450);
    assert_eq!(rows[2].price_cents, 99);
    assert!(rows.iter().all(|r| r.price_sheet_id == sheet_id));
    assert!(rows.iter().all(|r| r.tenant_id == tenant));
}

#[test]
fn one_bad_line_rejects_the_whole_batch() {
    let f = fixture();
    let mut bad = line(&f, "3.00");
    bad.region_id = Uuid::new_v4();

    let err = validate_line_items(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &[line(&f, "1.00"), bad],
        &f.snapshot,
    )
    .expect_err("foreign region must fail");
    assert!(matches!(err, ApiError::InvalidReference(_)));
}

#[test]
fn prices_survive_the_display_round_trip() {
    let f = fixture();
    for price in ["0.01", "4.99", "150.00", "0.10"] {
        let rows = validate_line_items(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[line(&f, price)],
            &f.snapshot,
        )
        .expect("valid price");
        assert_eq!(money::cents_to_display(rows[0].price_cents), price);
    }
}

#[test]
fn malformed_prices_are_rejected() {
    let f = fixture();
    for price in ["-1.00", "1.999", "abc", ""] {
        assert!(
            validate_line_items(
                Uuid::new_v4(),
                Uuid::new_v4(),
                &[line(&f, price)],
                &f.snapshot,
            )
            .is_err(),
            "price {price:?} should be rejected"
        );
    }
}

#[test]
fn engagement_math_matches_delivery_counts() {
    // 3 of 8 deliveries opened.
    assert_eq!(engagement_percent(3, 8), 38);
    // Nothing sent yet.
    assert_eq!(engagement_percent(0, 0), 0);
    // Everyone opened.
    assert_eq!(engagement_percent(8, 8), 100);
}
