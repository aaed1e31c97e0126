use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::order_status::OrderStatus;

/// Events emitted by the order core. Consumers are decoupled from the
/// request path; a slow consumer can never delay a webhook acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer. Confirmation events are the hand-off point for
/// downstream systems (fulfillment, inventory sync); for now they are
/// logged so operators can trace every transition.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "order status changed"
                );
                if *new_status == OrderStatus::Confirmed {
                    info!(order_id = %order_id, "order released to fulfillment");
                }
            }
        }
        debug!(?event, "event processed");
    }
    info!("event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_cleanly_when_the_processor_is_gone() {
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        drop(rx);

        let result = sender.send(Event::OrderCreated(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
