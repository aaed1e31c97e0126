use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::order_status::OrderStatus;

use super::{NewOrder, OrderRecord, OrderStore};

/// In-memory order store with the same compare-and-set semantics as the
/// database-backed one. Used by the test suite and local demos.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, OrderRecord>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every order belonging to a user. Test support.
    pub async fn all_for_user(&self, user_id: Uuid) -> Vec<OrderRecord> {
        self.orders
            .lock()
            .await
            .values()
            .filter(|record| record.order.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, new_order: NewOrder) -> Result<OrderRecord, ServiceError> {
        let now = Utc::now();

        let items = new_order
            .items
            .into_iter()
            .map(|item| order_item::Model {
                id: Uuid::new_v4(),
                order_id: new_order.id,
                product_id: item.product_id,
                name: item.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        let record = OrderRecord {
            order: order::Model {
                id: new_order.id,
                user_id: new_order.user_id,
                status: OrderStatus::Pending.to_string(),
                total_amount: new_order.total_amount,
                freight_amount: new_order.freight_amount,
                currency: new_order.currency,
                payment_method: new_order.payment_method,
                payment_reference: None,
                created_at: now,
                updated_at: Some(now),
                version: 1,
            },
            items,
        };

        self.orders
            .lock()
            .await
            .insert(new_order.id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: Uuid) -> Result<Option<OrderRecord>, ServiceError> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, ServiceError> {
        let mut orders = self.orders.lock().await;
        let Some(record) = orders.get_mut(&id) else {
            return Ok(false);
        };

        if record.order.status != from.to_string() {
            return Ok(false);
        }

        record.order.status = to.to_string();
        record.order.updated_at = Some(Utc::now());
        record.order.version += 1;
        Ok(true)
    }

    async fn set_payment_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<(), ServiceError> {
        let mut orders = self.orders.lock().await;
        if let Some(record) = orders.get_mut(&id) {
            record.order.payment_reference = Some(reference.to_string());
            record.order.updated_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewOrderItem;
    use rust_decimal_macros::dec;

    fn sample_order(id: Uuid) -> NewOrder {
        NewOrder {
            id,
            user_id: Uuid::new_v4(),
            currency: "BRL".into(),
            payment_method: Some("checkout_pro".into()),
            freight_amount: dec!(5.00),
            total_amount: dec!(49.00),
            items: vec![NewOrderItem {
                product_id: "banana-prata".into(),
                name: "Banana Prata 1kg".into(),
                quantity: 2,
                unit_price: dec!(22.00),
            }],
        }
    }

    #[tokio::test]
    async fn transition_applies_only_from_the_expected_status() {
        let store = InMemoryOrderStore::new();
        let id = Uuid::new_v4();
        store.create(sample_order(id)).await.unwrap();

        assert!(store
            .transition(id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap());

        // A second writer still holding the stale PENDING read loses
        assert!(!store
            .transition(id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap());

        let record = store.find(id).await.unwrap().unwrap();
        assert_eq!(record.order.status, "CONFIRMED");
        assert_eq!(record.order.version, 2);
    }

    #[tokio::test]
    async fn transition_on_unknown_order_is_a_clean_miss() {
        let store = InMemoryOrderStore::new();
        assert!(!store
            .transition(Uuid::new_v4(), OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap());
    }
}
