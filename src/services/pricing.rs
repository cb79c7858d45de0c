use crate::config::PricingConfig;
use crate::models::{MealCategory, UserRole};

/// Role-based price lookup. Prices are configuration, not menu data:
/// whatever a menu item's stored snapshot says, orders are always priced
/// through this table.
#[derive(Clone, Debug)]
pub struct PriceTable {
    guardian_lunch: i64,
    guardian_snack: i64,
    staff_lunch: i64,
    staff_snack: i64,
}

impl PriceTable {
    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            guardian_lunch: config.guardian_lunch,
            guardian_snack: config.guardian_snack,
            staff_lunch: config.staff_lunch,
            staff_snack: config.staff_snack,
        }
    }

    /// Price of one item of `category` for `role`, in the smallest
    /// currency unit.
    pub fn price(&self, role: UserRole, category: MealCategory) -> i64 {
        match (role, category) {
            (UserRole::Guardian, MealCategory::Lunch) => self.guardian_lunch,
            (UserRole::Guardian, MealCategory::Snack) => self.guardian_snack,
            (UserRole::Staff, MealCategory::Lunch) => self.staff_lunch,
            (UserRole::Staff, MealCategory::Snack) => self.staff_snack,
        }
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::from_config(&PricingConfig::default())
    }
}
