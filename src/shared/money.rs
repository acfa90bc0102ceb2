//! Money helpers. Prices are integer cents everywhere in storage and
//! arithmetic; decimal strings exist only at the presentation boundary.

use crate::shared::error::ApiError;

pub fn cents_to_display(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

pub fn display_to_cents(display: &str) -> Result<i64, ApiError> {
    let trimmed = display.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("price", "price is required"));
    }
    if trimmed.starts_with('-') {
        return Err(ApiError::validation("price", "price must not be negative"));
    }
    let (dollars, cents) = match trimmed.split_once('.') {
        Some((d, c)) => (d, c),
        None => (trimmed, "0"),
    };
    if cents.len() > 2 || !cents.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ApiError::validation("price", "at most two decimal places"));
    }
    let dollars: i64 = dollars
        .parse()
        .map_err(|_| ApiError::validation("price", "not a valid amount"))?;
    if dollars < 0 {
        return Err(ApiError::validation("price", "price must not be negative"));
    }
    let cents_part: i64 = if cents.is_empty() {
        0
    } else {
        // "5" means 50 cents, "05" means 5 cents
        let parsed: i64 = cents
            .parse()
            .map_err(|_| ApiError::validation("price", "not a valid amount"))?;
        if cents.len() == 1 {
            parsed * 10
        } else {
            parsed
        }
    };
    dollars
        .checked_mul(100)
        .and_then(|d| d.checked_add(cents_part))
        .ok_or_else(|| ApiError::validation("price", "amount out of range"))
}
