use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// In-process event bus. Services emit lifecycle events after their database
/// work commits; the processor task logs them and is the seam where outbound
/// notifications (email, push) would attach.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order lifecycle
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderCompleted(Uuid),
    OrderCanceled(Uuid),
    OrderExpired(Uuid),

    // Payment signals that do not change the order
    PaymentHeldForReview(Uuid),

    // Fulfillment
    DeliveryDeferred {
        order_id: Uuid,
        requested: i32,
        available: u64,
    },
    StockReplenished {
        product_id: Uuid,
        count: usize,
    },
}

/// Consumes events off the channel until all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::DeliveryDeferred {
                order_id,
                requested,
                available,
            } => {
                warn!(
                    order_id = %order_id,
                    requested,
                    available,
                    "delivery deferred: insufficient stock, order left awaiting fulfillment"
                );
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    info!("Event channel closed; event processor exiting");
}
