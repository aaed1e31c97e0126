use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::order_status::OrderStatus;

use super::{NewOrder, OrderRecord, OrderStore};

/// sea-orm backed order store.
#[derive(Clone)]
pub struct DatabaseOrderStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for DatabaseOrderStore {
    #[instrument(skip(self, new_order), fields(order_id = %new_order.id, user_id = %new_order.user_id))]
    async fn create(&self, new_order: NewOrder) -> Result<OrderRecord, ServiceError> {
        let now = Utc::now();

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = order::ActiveModel {
            id: Set(new_order.id),
            user_id: Set(new_order.user_id),
            status: Set(OrderStatus::Pending.to_string()),
            total_amount: Set(new_order.total_amount),
            freight_amount: Set(new_order.freight_amount),
            currency: Set(new_order.currency),
            payment_method: Set(new_order.payment_method),
            payment_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in new_order.items {
            let item_model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(new_order.id),
                product_id: Set(item.product_id),
                name: Set(item.name),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
            }
            .insert(&txn)
            .await?;
            items.push(item_model);
        }

        txn.commit().await?;

        Ok(OrderRecord {
            order: order_model,
            items,
        })
    }

    async fn find(&self, id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        let Some(order_model) = order::Entity::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .all(&*self.db)
            .await?;

        Ok(Some(OrderRecord {
            order: order_model,
            items,
        }))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, ServiceError> {
        // "set status = next where status = expected" in a single statement;
        // the row count tells us whether this reconciliation won the write.
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(to.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Status.eq(from.to_string()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn set_payment_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<(), ServiceError> {
        order::Entity::update_many()
            .col_expr(
                order::Column::PaymentReference,
                Expr::value(reference.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }
}
