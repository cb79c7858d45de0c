//! Protection against paying twice for the same slot.
//!
//! Guardians and staff may legitimately submit several orders for one
//! week (ordering more days later), so the guard compares candidate
//! selections against what has already been *paid*, never against
//! pending, processing or cancelled orders, and rejects only the exact
//! (date, child-or-staff, category) slots that would be charged twice.
//!
//! The paid snapshot is taken at checkout time; a webhook racing the
//! check can in principle slip one duplicate through. Accepted: the
//! conflict is rare, visible and repaired administratively.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::errors::ServiceError;
use crate::models::{DaySelection, MealCategory, Order, SlotConflict, SlotOwner};
use crate::services::legacy_import;

#[derive(Debug, Default)]
struct PaidSlot {
    lunch: Option<String>,
    snack: Option<String>,
}

/// Item names already paid, keyed by slot.
#[derive(Debug, Default)]
pub struct PaidSlots {
    slots: HashMap<(NaiveDate, SlotOwner), PaidSlot>,
}

impl PaidSlots {
    /// Builds the paid map from already-paid orders. Orders whose
    /// structured selections are missing (historical rows) contribute
    /// through the legacy import adapter.
    pub fn from_paid_orders(orders: &[Order]) -> Self {
        let mut paid = Self::default();
        for order in orders {
            if order.selections.is_empty() {
                if let Some(description) = &order.legacy_description {
                    let import = legacy_import::selections_from_description(
                        description,
                        order.week_start,
                    );
                    for selection in &import.selections {
                        paid.insert(selection);
                    }
                }
            } else {
                for selection in &order.selections {
                    paid.insert(selection);
                }
            }
        }
        paid
    }

    fn insert(&mut self, selection: &DaySelection) {
        let slot = self
            .slots
            .entry((selection.date, selection.owner()))
            .or_default();
        if let Some(lunch) = &selection.lunch {
            slot.lunch = Some(lunch.name.clone());
        }
        if let Some(snack) = &selection.snack {
            slot.snack = Some(snack.name.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Returns every candidate item that is already paid for its slot.
pub fn find_conflicts(candidates: &[DaySelection], paid: &PaidSlots) -> Vec<SlotConflict> {
    let mut conflicts = Vec::new();
    for candidate in candidates {
        let owner = candidate.owner();
        let Some(slot) = paid.slots.get(&(candidate.date, owner.clone())) else {
            continue;
        };
        if candidate.lunch.is_some() {
            if let Some(paid_item) = &slot.lunch {
                conflicts.push(SlotConflict {
                    date: candidate.date,
                    owner: owner.clone(),
                    category: MealCategory::Lunch,
                    paid_item: paid_item.clone(),
                });
            }
        }
        if candidate.snack.is_some() {
            if let Some(paid_item) = &slot.snack {
                conflicts.push(SlotConflict {
                    date: candidate.date,
                    owner,
                    category: MealCategory::Snack,
                    paid_item: paid_item.clone(),
                });
            }
        }
    }
    conflicts
}

/// Fails checkout when any candidate slot is already paid.
pub fn ensure_no_conflicts(
    candidates: &[DaySelection],
    paid: &PaidSlots,
) -> Result<(), ServiceError> {
    let conflicts = find_conflicts(candidates, paid);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::DuplicateSelection(conflicts))
    }
}
