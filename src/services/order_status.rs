use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    store::OrderStore,
};

/// Persisted order lifecycle status, exposed verbatim on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// An order counts as paid from confirmation onwards.
    pub fn is_paid(self) -> bool {
        matches!(self, Self::Confirmed | Self::Shipped | Self::Delivered)
    }
}

/// An inbound signal that may advance an order's status: a processor
/// webhook, or a manual fulfillment action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    PaymentConfirmed,
    PaymentCancelled,
    MarkShipped,
    MarkDelivered,
}

/// The entire transition table. `None` means the signal does not apply to
/// the current status and must degrade to a no-op: duplicates, reordered
/// deliveries, and anything arriving after a terminal state all land here.
/// Transitions only ever move forward, so applying any sequence of signals
/// is idempotent and order-insensitive.
pub fn next_status(current: OrderStatus, signal: StatusSignal) -> Option<OrderStatus> {
    use OrderStatus::*;
    use StatusSignal::*;

    match (current, signal) {
        (Pending, PaymentConfirmed) => Some(Confirmed),
        (Pending | Confirmed, PaymentCancelled) => Some(Cancelled),
        (Confirmed, MarkShipped) => Some(Shipped),
        (Shipped, MarkDelivered) => Some(Delivered),
        _ => None,
    }
}

/// Result of folding one signal into an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        from: OrderStatus,
        to: OrderStatus,
    },
    /// The signal does not apply to the stored status; nothing changed.
    NoOp {
        current: OrderStatus,
    },
    /// The referenced order does not exist; nothing was created or changed.
    UnknownOrder,
}

/// Applies status signals to stored orders.
///
/// Holds no state of its own: every decision derives from the stored
/// status and the signal, so the service is restart-safe by construction.
#[derive(Clone)]
pub struct OrderStatusService {
    store: Arc<dyn OrderStore>,
    event_sender: Option<EventSender>,
}

impl OrderStatusService {
    pub fn new(store: Arc<dyn OrderStore>, event_sender: Option<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Folds one signal into the order's stored status.
    ///
    /// The write is a store-level compare-and-set; losing a race against a
    /// concurrent reconciliation re-reads and retries. The loop terminates
    /// because the status only ever advances along a finite chain.
    #[instrument(skip(self), fields(order_id = %order_id, signal = ?signal))]
    pub async fn apply_signal(
        &self,
        order_id: Uuid,
        signal: StatusSignal,
    ) -> Result<ReconcileOutcome, ServiceError> {
        loop {
            let record = match self.store.find(order_id).await? {
                Some(record) => record,
                None => {
                    warn!(order_id = %order_id, "signal references an unknown order");
                    return Ok(ReconcileOutcome::UnknownOrder);
                }
            };

            let current: OrderStatus = record.order.status.parse().map_err(|_| {
                ServiceError::InternalError(format!(
                    "order {} has unrecognized status '{}'",
                    order_id, record.order.status
                ))
            })?;

            let Some(next) = next_status(current, signal) else {
                info!(
                    order_id = %order_id,
                    current = %current,
                    "signal does not apply to current status; ignoring"
                );
                return Ok(ReconcileOutcome::NoOp { current });
            };

            if self.store.transition(order_id, current, next).await? {
                info!(
                    order_id = %order_id,
                    from = %current,
                    to = %next,
                    "order status advanced"
                );
                if let Some(event_sender) = &self.event_sender {
                    if let Err(e) = event_sender
                        .send(Event::OrderStatusChanged {
                            order_id,
                            old_status: current,
                            new_status: next,
                        })
                        .await
                    {
                        warn!(error = %e, order_id = %order_id, "failed to send status changed event");
                    }
                }
                return Ok(ReconcileOutcome::Applied {
                    from: current,
                    to: next,
                });
            }

            // Lost a race against a concurrent transition; re-read and retry
            info!(order_id = %order_id, "conditional status write lost a race; retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use OrderStatus::*;
    use StatusSignal::*;

    #[test]
    fn happy_path_advances_through_the_full_lifecycle() {
        assert_eq!(next_status(Pending, PaymentConfirmed), Some(Confirmed));
        assert_eq!(next_status(Confirmed, MarkShipped), Some(Shipped));
        assert_eq!(next_status(Shipped, MarkDelivered), Some(Delivered));
    }

    #[test]
    fn cancellation_applies_before_shipment_only() {
        assert_eq!(next_status(Pending, PaymentCancelled), Some(Cancelled));
        assert_eq!(next_status(Confirmed, PaymentCancelled), Some(Cancelled));
        assert_eq!(next_status(Shipped, PaymentCancelled), None);
        assert_eq!(next_status(Delivered, PaymentCancelled), None);
    }

    #[test]
    fn terminal_states_absorb_every_signal() {
        for terminal in [Delivered, Cancelled] {
            for signal in [PaymentConfirmed, PaymentCancelled, MarkShipped, MarkDelivered] {
                assert_eq!(next_status(terminal, signal), None);
            }
        }
    }

    #[test]
    fn no_transition_ever_moves_backward() {
        // Position in the forward chain; Cancelled is a terminal side exit
        fn rank(status: OrderStatus) -> u8 {
            match status {
                Pending => 0,
                Confirmed => 1,
                Shipped => 2,
                Delivered => 3,
                Cancelled => 4,
            }
        }

        for current in OrderStatus::iter() {
            for signal in [PaymentConfirmed, PaymentCancelled, MarkShipped, MarkDelivered] {
                if let Some(next) = next_status(current, signal) {
                    assert!(rank(next) > rank(current), "{current} -> {next} regressed");
                }
            }
        }
    }

    #[test]
    fn paid_flag_tracks_confirmation() {
        assert!(!Pending.is_paid());
        assert!(Confirmed.is_paid());
        assert!(Shipped.is_paid());
        assert!(Delivered.is_paid());
        assert!(!Cancelled.is_paid());
    }

    #[test]
    fn status_round_trips_through_its_wire_form() {
        for status in OrderStatus::iter() {
            let rendered = status.to_string();
            assert_eq!(rendered, rendered.to_uppercase());
            assert_eq!(rendered.parse::<OrderStatus>(), Ok(status));
        }
    }
}
