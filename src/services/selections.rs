//! Normalization of raw day-level selections into their canonical form.
//!
//! Everything here is pure; the sanitizer neither reads nor writes the
//! store. The UI submits a full week grid in which empty rows are
//! expected, so dropping is silent; an input that leaves nothing behind
//! is an error the user has to see.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::{date_in_week, DaySelection, MenuItem, UserRole};

/// A menu item as submitted by the UI, before normalization.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RawMenuItem {
    pub code: String,
    pub name: String,
    /// Display snapshot of the catalog price at selection time.
    #[serde(default)]
    pub price: i64,
}

/// One submitted day row, possibly incomplete.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RawDaySelection {
    pub date: NaiveDate,
    #[serde(default)]
    pub child_ref: Option<String>,
    #[serde(default)]
    pub lunch: Option<RawMenuItem>,
    #[serde(default)]
    pub snack: Option<RawMenuItem>,
}

/// Sanitizes a raw selection list for the given role and ordering week.
///
/// Drops entries with neither lunch nor snack, entries dated outside the
/// week, and (for guardians) entries without a child reference. Staff
/// entries have their child reference cleared. Fails when nothing
/// survives.
pub fn sanitize(
    raw: &[RawDaySelection],
    role: UserRole,
    week_start: NaiveDate,
) -> Result<Vec<DaySelection>, ServiceError> {
    let mut sanitized = Vec::with_capacity(raw.len());

    for entry in raw {
        if !date_in_week(week_start, entry.date) {
            continue;
        }

        let child_ref = match role {
            UserRole::Guardian => match normalize_ref(entry.child_ref.as_deref()) {
                Some(child) => Some(child),
                None => continue,
            },
            UserRole::Staff => None,
        };

        let lunch = entry.lunch.as_ref().and_then(normalize_item);
        let snack = entry.snack.as_ref().and_then(normalize_item);
        if lunch.is_none() && snack.is_none() {
            continue;
        }

        sanitized.push(DaySelection {
            date: entry.date,
            child_ref,
            lunch,
            snack,
        });
    }

    if sanitized.is_empty() {
        return Err(ServiceError::ValidationError(
            "must select at least one lunch or snack".to_string(),
        ));
    }

    Ok(sanitized)
}

fn normalize_ref(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Items without a code are treated as absent.
fn normalize_item(raw: &RawMenuItem) -> Option<MenuItem> {
    let code = raw.code.trim();
    if code.is_empty() {
        return None;
    }
    let name = raw.name.trim();
    Some(MenuItem {
        code: code.to_string(),
        name: if name.is_empty() {
            code.to_string()
        } else {
            name.to_string()
        },
        price: raw.price,
    })
}
