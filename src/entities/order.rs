use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OrderStatus, UserRole};

/// The `orders` table. Day-level selections live in `order_selections`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing reference, unique.
    #[sea_orm(unique)]
    pub order_number: String,

    pub user_id: Uuid,
    pub user_role: UserRole,

    /// Monday of the ordering week.
    pub week_start: NaiveDate,

    /// Amount in the smallest currency unit; recomputed on every
    /// selection change, never written directly by callers.
    pub total_amount: i64,
    pub currency: String,

    pub status: OrderStatus,

    /// Provider transaction reference once an intent/callback is associated.
    pub payment_transaction_id: Option<String>,

    /// Raw callback outcomes that did not change status, kept for audit.
    pub gateway_metadata: Option<Json>,

    /// Free-text selection summary on historical rows that predate the
    /// structured `order_selections` table.
    #[sea_orm(column_type = "Text", nullable)]
    pub legacy_description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Monotonic counter; updates are conditional on the expected value.
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_selection::Entity")]
    OrderSelection,
}

impl Related<super::order_selection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderSelection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
