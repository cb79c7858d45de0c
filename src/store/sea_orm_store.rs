use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::error;
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as OrderEntity, Model as OrderModel,
};
use crate::entities::order_selection::{
    ActiveModel as SelectionActiveModel, Column as SelectionColumn,
    Entity as SelectionEntity, Model as SelectionModel,
};
use crate::errors::ServiceError;
use crate::models::{DaySelection, MenuItem, Order, OrderStatus};

use super::{order_number_for, NewOrder, OrderFilter, OrderPatch, OrderStore};

/// SQL-backed order store. Creation and updates are transactional so the
/// order row and its selection rows never diverge.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn assemble(order: OrderModel, mut rows: Vec<SelectionModel>) -> Order {
        rows.sort_by_key(|row| row.position);
        Order {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            user_role: order.user_role,
            week_start: order.week_start,
            selections: rows.into_iter().map(selection_from_row).collect(),
            total: order.total_amount,
            currency: order.currency,
            status: order.status,
            payment_transaction_id: order.payment_transaction_id,
            gateway_metadata: order.gateway_metadata,
            legacy_description: order.legacy_description,
            created_at: order.created_at,
            updated_at: order.updated_at,
            paid_at: order.paid_at,
            cancelled_at: order.cancelled_at,
            version: order.version,
        }
    }

    async fn load_selections(
        &self,
        order: OrderModel,
    ) -> Result<Order, ServiceError> {
        let rows = SelectionEntity::find()
            .filter(SelectionColumn::OrderId.eq(order.id))
            .order_by_asc(SelectionColumn::Position)
            .all(&*self.db)
            .await?;
        Ok(Self::assemble(order, rows))
    }

    async fn insert_selection_rows(
        txn: &DatabaseTransaction,
        order_id: Uuid,
        selections: &[DaySelection],
    ) -> Result<(), ServiceError> {
        for (position, selection) in selections.iter().enumerate() {
            let row = SelectionActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_date: Set(selection.date),
                child_ref: Set(selection.child_ref.clone()),
                lunch_code: Set(selection.lunch.as_ref().map(|i| i.code.clone())),
                lunch_name: Set(selection.lunch.as_ref().map(|i| i.name.clone())),
                lunch_price: Set(selection.lunch.as_ref().map(|i| i.price)),
                snack_code: Set(selection.snack.as_ref().map(|i| i.code.clone())),
                snack_name: Set(selection.snack.as_ref().map(|i| i.name.clone())),
                snack_price: Set(selection.snack.as_ref().map(|i| i.price)),
                position: Set(position as i32),
            };
            row.insert(txn).await.map_err(|e| {
                error!(error = %e, %order_id, "failed to insert order selection row");
                ServiceError::DatabaseError(e)
            })?;
        }
        Ok(())
    }

    fn apply_filter(
        mut query: sea_orm::Select<OrderEntity>,
        filter: &OrderFilter,
    ) -> sea_orm::Select<OrderEntity> {
        if let Some(user_id) = filter.user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        if let Some(week_start) = filter.week_start {
            query = query.filter(Column::WeekStart.eq(week_start));
        }
        if let Some(statuses) = &filter.statuses {
            query = query.filter(Column::Status.is_in(statuses.iter().copied()));
        }
        if let Some(transaction_ref) = &filter.transaction_ref {
            query = query.filter(Column::PaymentTransactionId.eq(transaction_ref.clone()));
        }
        if let Some(from) = filter.created_from {
            query = query.filter(Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_to {
            query = query.filter(Column::CreatedAt.lte(to));
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        query
    }
}

fn selection_from_row(row: SelectionModel) -> DaySelection {
    DaySelection {
        date: row.menu_date,
        child_ref: row.child_ref,
        lunch: menu_item(row.lunch_code, row.lunch_name, row.lunch_price),
        snack: menu_item(row.snack_code, row.snack_name, row.snack_price),
    }
}

fn menu_item(
    code: Option<String>,
    name: Option<String>,
    price: Option<i64>,
) -> Option<MenuItem> {
    let code = code?;
    Some(MenuItem {
        name: name.unwrap_or_else(|| code.clone()),
        code,
        price: price.unwrap_or(0),
    })
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError> {
        if order.selections.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one selection".to_string(),
            ));
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_row = OrderActiveModel {
            id: Set(order_id),
            order_number: Set(order_number_for(order_id)),
            user_id: Set(order.user_id),
            user_role: Set(order.user_role),
            week_start: Set(order.week_start),
            total_amount: Set(order.total),
            currency: Set(order.currency),
            status: Set(OrderStatus::Pending),
            payment_transaction_id: Set(None),
            gateway_metadata: Set(None),
            legacy_description: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            paid_at: Set(None),
            cancelled_at: Set(None),
            version: Set(1),
        };

        let inserted = order_row.insert(&txn).await.map_err(|e| {
            error!(error = %e, %order_id, "failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        Self::insert_selection_rows(&txn, order_id, &order.selections).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        Ok(Self::assemble_from_parts(inserted, order.selections))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        match OrderEntity::find_by_id(id).one(&*self.db).await? {
            Some(order) => Ok(Some(self.load_selections(order).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, ServiceError> {
        let found = OrderEntity::find()
            .filter(Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?;
        match found {
            Some(order) => Ok(Some(self.load_selections(order).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_user_and_week(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Order>, ServiceError> {
        let found = OrderEntity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::WeekStart.eq(week_start))
            .filter(
                Column::Status.is_in([OrderStatus::Pending, OrderStatus::ProcessingPayment]),
            )
            .order_by_desc(Column::CreatedAt)
            .one(&*self.db)
            .await?;
        match found {
            Some(order) => Ok(Some(self.load_selections(order).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let orders = Self::apply_filter(
            OrderEntity::find().order_by_desc(Column::CreatedAt),
            filter,
        )
        .all(&*self.db)
        .await?;

        let mut assembled = Vec::with_capacity(orders.len());
        for order in orders {
            assembled.push(self.load_selections(order).await?);
        }
        Ok(assembled)
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, ServiceError> {
        if let Some(selections) = &patch.selections {
            if selections.is_empty() {
                return Err(ServiceError::ValidationError(
                    "order must contain at least one selection".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, order_id = %id, "failed to start transaction for order update");
            ServiceError::DatabaseError(e)
        })?;

        let existing = OrderEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        if let Some(expected) = patch.expected_version {
            if existing.version != expected {
                return Err(ServiceError::ConcurrentModification(id));
            }
        }

        let current_version = existing.version;
        let mut active: OrderActiveModel = existing.into();

        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(paid_at) = patch.paid_at {
            active.paid_at = Set(paid_at);
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            active.cancelled_at = Set(cancelled_at);
        }
        if let Some(transaction_ref) = patch.payment_transaction_id {
            active.payment_transaction_id = Set(transaction_ref);
        }
        if let Some(metadata) = patch.gateway_metadata {
            active.gateway_metadata = Set(Some(metadata));
        }
        if let Some(total) = patch.total {
            active.total_amount = Set(total);
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(current_version + 1);

        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %id, "failed to update order");
            ServiceError::DatabaseError(e)
        })?;

        let selections = if let Some(selections) = patch.selections {
            SelectionEntity::delete_many()
                .filter(SelectionColumn::OrderId.eq(id))
                .exec(&txn)
                .await?;
            Self::insert_selection_rows(&txn, id, &selections).await?;
            Some(selections)
        } else {
            None
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %id, "failed to commit order update");
            ServiceError::DatabaseError(e)
        })?;

        match selections {
            Some(selections) => Ok(Self::assemble_from_parts(updated, selections)),
            None => self.load_selections(updated).await,
        }
    }
}

impl SeaOrmOrderStore {
    fn assemble_from_parts(order: OrderModel, selections: Vec<DaySelection>) -> Order {
        Order {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            user_role: order.user_role,
            week_start: order.week_start,
            selections,
            total: order.total_amount,
            currency: order.currency,
            status: order.status,
            payment_transaction_id: order.payment_transaction_id,
            gateway_metadata: order.gateway_metadata,
            legacy_description: order.legacy_description,
            created_at: order.created_at,
            updated_at: order.updated_at,
            paid_at: order.paid_at,
            cancelled_at: order.cancelled_at,
            version: order.version,
        }
    }
}
