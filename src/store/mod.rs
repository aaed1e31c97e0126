//! Order persistence capability.
//!
//! Components receive an `Arc<dyn OrderStore>` instead of reaching for a
//! global database handle. The trait is the complete contract the
//! reconciliation core needs: create, read, and a conditional status write
//! that is atomic at the store level.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::order_status::OrderStatus;

pub mod database;
pub mod memory;

pub use database::DatabaseOrderStore;
pub use memory::InMemoryOrderStore;

/// A fully materialized order: the row plus its line items.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Input for creating an order at checkout-intent time.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub payment_method: Option<String>,
    pub freight_amount: Decimal,
    pub total_amount: Decimal,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and its line items with the initial pending status.
    async fn create(&self, new_order: NewOrder) -> Result<OrderRecord, ServiceError>;

    /// Loads an order with its line items.
    async fn find(&self, id: Uuid) -> Result<Option<OrderRecord>, ServiceError>;

    /// Conditional status write: set status to `to` only where the current
    /// status equals `from`. Returns whether a row was affected, so two
    /// reconciliations racing on stale reads can never both apply.
    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, ServiceError>;

    /// Records the processor-side session id on the order.
    async fn set_payment_reference(&self, id: Uuid, reference: &str)
        -> Result<(), ServiceError>;
}
