//! Post-commit event fan-out. The checkout coordinator emits events only
//! after its transaction commits; the processing loop handles side effects
//! that must not participate in the atomic unit, most importantly asking the
//! storefront to revalidate cached product pages after stock changes.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PromoRedeemed {
        promo_code_id: Uuid,
        order_id: Uuid,
    },
    /// Stock for this product changed; its detail page should be revalidated.
    ProductStockChanged(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; delivery is best-effort and never fails the caller's
    /// request path.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to enqueue event: {}", e);
        }
    }
}

/// Event processing loop. `revalidate_url` is the storefront endpoint that
/// receives `{"product_id": ...}` notifications after stock changes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, revalidate_url: Option<String>) {
    info!("Starting event processing loop");
    let client = reqwest::Client::new();

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id = %order_id, %old_status, %new_status, "Order status changed");
            }
            Event::PromoRedeemed {
                promo_code_id,
                order_id,
            } => {
                info!(promo_code_id = %promo_code_id, order_id = %order_id, "Promo code redeemed");
            }
            Event::ProductStockChanged(product_id) => {
                info!(product_id = %product_id, "Product stock changed");
                if let Some(url) = &revalidate_url {
                    if let Err(e) = notify_revalidation(&client, url, product_id).await {
                        error!(product_id = %product_id, "Revalidation notify failed: {}", e);
                    }
                }
            }
        }
    }

    info!("Event processing loop stopped");
}

async fn notify_revalidation(
    client: &reqwest::Client,
    url: &str,
    product_id: Uuid,
) -> Result<(), reqwest::Error> {
    client
        .post(url)
        .json(&serde_json::json!({ "product_id": product_id }))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSender::new(tx).send(Event::OrderCreated(Uuid::new_v4())).await;
    }
}
