use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One day-level selection row belonging to an order.
///
/// Item columns are nullable in pairs: a day may carry a lunch, a snack,
/// or both. Prices are the historical snapshot captured at selection time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_selections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,

    pub menu_date: NaiveDate,

    /// Registered child this selection is for; NULL on staff orders.
    pub child_ref: Option<String>,

    pub lunch_code: Option<String>,
    pub lunch_name: Option<String>,
    pub lunch_price: Option<i64>,

    pub snack_code: Option<String>,
    pub snack_name: Option<String>,
    pub snack_price: Option<i64>,

    /// Preserves the submitted ordering of the selection list.
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
