use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::quote::QuoteStatus;

/// Domain events, published only after the corresponding change has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    QuoteCreated(Uuid),
    QuoteUpdated(Uuid),
    QuoteStatusChanged {
        quote_id: Uuid,
        from: QuoteStatus,
        to: QuoteStatus,
    },
    QuoteDuplicated {
        source_id: Uuid,
        quote_id: Uuid,
    },
    QuoteDeleted(Uuid),
    QuoteConverted {
        quote_id: Uuid,
        sales_order_id: Uuid,
    },
    PurchaseOrderGenerated {
        quote_id: Uuid,
        purchase_order_id: Uuid,
    },
    ProductConversionSaved(Uuid),
    ProductConversionDeleted(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::QuoteCreated(_) => "quote_created",
            Event::QuoteUpdated(_) => "quote_updated",
            Event::QuoteStatusChanged { .. } => "quote_status_changed",
            Event::QuoteDuplicated { .. } => "quote_duplicated",
            Event::QuoteDeleted(_) => "quote_deleted",
            Event::QuoteConverted { .. } => "quote_converted",
            Event::PurchaseOrderGenerated { .. } => "purchase_order_generated",
            Event::ProductConversionSaved(_) => "product_conversion_saved",
            Event::ProductConversionDeleted(_) => "product_conversion_deleted",
        }
    }
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

    /// Publishes a post-commit event. The state change already happened, so a closed
    /// channel is logged rather than reported to the caller.
    pub async fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, "{}", e);
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::QuoteStatusChanged { quote_id, from, to } => {
                info!(%quote_id, %from, %to, "Quote status changed");
            }
            Event::QuoteConverted {
                quote_id,
                sales_order_id,
            } => {
                info!(%quote_id, %sales_order_id, "Quote converted to sales order");
            }
            Event::PurchaseOrderGenerated {
                quote_id,
                purchase_order_id,
            } => {
                info!(%quote_id, %purchase_order_id, "Purchase order generated for quote");
            }
            other => info!(event = other.name(), "Received event: {:?}", other),
        }
    }

    info!("Event channel closed; event processing loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_after_receiver_dropped_does_not_panic() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.publish(Event::QuoteCreated(Uuid::new_v4())).await;
        assert!(sender.send(Event::QuoteDeleted(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sender, mut rx) = channel(4);
        let id = Uuid::new_v4();
        sender.publish(Event::QuoteCreated(id)).await;
        sender
            .publish(Event::QuoteStatusChanged {
                quote_id: id,
                from: QuoteStatus::Draft,
                to: QuoteStatus::Sent,
            })
            .await;

        assert_eq!(rx.recv().await, Some(Event::QuoteCreated(id)));
        assert_eq!(rx.recv().await.map(|e| e.name()), Some("quote_status_changed"));
    }
}
