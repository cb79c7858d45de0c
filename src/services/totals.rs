//! Order total derivation.
//!
//! Totals are recomputed from the live price table by role, at creation
//! and at every amend. The per-item price snapshot stored on selections
//! is display data and is deliberately ignored here.

use crate::errors::ServiceError;
use crate::models::{DaySelection, MealCategory, UserRole};
use crate::services::pricing::PriceTable;

/// Computes the order total in the smallest currency unit.
pub fn compute(
    selections: &[DaySelection],
    role: UserRole,
    prices: &PriceTable,
) -> Result<i64, ServiceError> {
    let mut total = 0i64;
    for selection in selections {
        if selection.lunch.is_some() {
            total += prices.price(role, MealCategory::Lunch);
        }
        if selection.snack.is_some() {
            total += prices.price(role, MealCategory::Snack);
        }
    }

    if total <= 0 {
        return Err(ServiceError::ValidationError(
            "order total must be positive".to_string(),
        ));
    }

    Ok(total)
}
