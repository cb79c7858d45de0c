use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Enum representing the possible statuses of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing_payment")]
    ProcessingPayment,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Terminal for the normal ordering flow. Admin overrides can still
    /// leave these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

/// Pricing tier and ownership semantics of the ordering user.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    /// Parent/caregiver ordering on behalf of one or more registered children.
    #[sea_orm(string_value = "guardian")]
    Guardian,
    /// Staff member ordering for themselves only.
    #[sea_orm(string_value = "staff")]
    Staff,
}

/// The two orderable categories within a day.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MealCategory {
    Lunch,
    Snack,
}

/// A menu item as captured at selection time.
///
/// `price` is a historical display snapshot; order totals are always
/// recomputed from the live price table and never read this field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuItem {
    pub code: String,
    pub name: String,
    pub price: i64,
}

/// One day's worth of selections inside an order week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DaySelection {
    pub date: NaiveDate,
    /// Present for guardian orders (which registered child the meal is for);
    /// always `None` for staff.
    pub child_ref: Option<String>,
    pub lunch: Option<MenuItem>,
    pub snack: Option<MenuItem>,
}

impl DaySelection {
    pub fn is_empty(&self) -> bool {
        self.lunch.is_none() && self.snack.is_none()
    }

    pub fn owner(&self) -> SlotOwner {
        match &self.child_ref {
            Some(child) => SlotOwner::Child(child.clone()),
            None => SlotOwner::Staff,
        }
    }
}

/// Who a slot belongs to: a registered child, or the staff member themself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotOwner {
    Child(String),
    Staff,
}

impl std::fmt::Display for SlotOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotOwner::Child(name) => write!(f, "child {}", name),
            SlotOwner::Staff => write!(f, "staff"),
        }
    }
}

/// A slot that a new checkout would pay for a second time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SlotConflict {
    pub date: NaiveDate,
    pub owner: SlotOwner,
    pub category: MealCategory,
    /// Name of the item already paid for this slot.
    pub paid_item: String,
}

impl std::fmt::Display for SlotConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}: {} already paid as {}",
            self.date, self.owner, self.category, self.paid_item
        )
    }
}

/// The order aggregate as seen by services and API consumers.
///
/// Assembled by the store from the `orders` row plus its
/// `order_selections` children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub week_start: NaiveDate,
    pub selections: Vec<DaySelection>,
    /// Amount in the smallest currency unit.
    pub total: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_transaction_id: Option<String>,
    /// Audit trail for callback outcomes that did not change status.
    #[schema(value_type = Object)]
    pub gateway_metadata: Option<serde_json::Value>,
    /// Free-text carried over from historical records; read only by the
    /// legacy import adapter when `selections` is empty.
    pub legacy_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Order {
    /// Selections are only mutable before payment starts.
    pub fn is_amendable(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

/// Returns true when `date` falls inside the 7-day span starting at
/// `week_start`.
pub fn date_in_week(week_start: NaiveDate, date: NaiveDate) -> bool {
    date >= week_start && date < week_start + Duration::days(7)
}

/// Ordering weeks always start on a Monday.
pub fn is_week_start(date: NaiveDate) -> bool {
    date.weekday() == chrono::Weekday::Mon
}
