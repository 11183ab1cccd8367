//! Lightweight event fan-out for checkout lifecycle notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events the engine emits. Consumers hang off the receiving end of the
/// channel; the engines only ever call [`EventSender::send_or_log`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    QuoteCreated {
        quote_id: String,
        line_count: usize,
    },
    QuoteRetired {
        quote_id: String,
    },
    OrderCreated {
        order_id: u64,
        quote_id: String,
    },
    OrderReplayed {
        order_id: u64,
    },
    StockReductionFailed {
        order_id: u64,
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

    /// Channel pair helper for composition roots and tests.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }

    /// Events are advisory; a full or closed channel must never fail the
    /// request that produced the event.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping event");
        }
    }
}

/// Background consumer; currently logs each event. Downstream integrations
/// (webhooks, analytics) attach here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        debug!(?event, "event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sender, mut rx) = EventSender::channel(8);
        sender
            .send_or_log(Event::QuoteCreated {
                quote_id: "q-1".into(),
                line_count: 2,
            })
            .await;
        sender
            .send_or_log(Event::QuoteRetired {
                quote_id: "q-1".into(),
            })
            .await;

        assert!(matches!(rx.recv().await, Some(Event::QuoteCreated { .. })));
        assert!(matches!(rx.recv().await, Some(Event::QuoteRetired { .. })));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        // Must not panic or error the caller.
        sender
            .send_or_log(Event::OrderReplayed { order_id: 7 })
            .await;
    }
}
