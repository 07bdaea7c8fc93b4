//! Live feed of newly appended ledger entries, filtered by customer.

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::ledger::DebtHistoryEntry;

#[derive(Clone, Debug)]
pub struct HistoryFeed {
    tx: broadcast::Sender<DebtHistoryEntry>,
}

impl HistoryFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Entries published with no subscriber are dropped.
    pub fn publish(&self, entry: &DebtHistoryEntry) {
        let _ = self.tx.send(entry.clone());
    }

    pub fn subscribe(&self, customer_id: impl Into<String>) -> HistorySubscription {
        HistorySubscription { customer_id: customer_id.into(), rx: self.tx.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize { self.tx.receiver_count() }
}

impl Default for HistoryFeed {
    fn default() -> Self { Self::new(256) }
}

pub struct HistorySubscription {
    customer_id: String,
    rx: broadcast::Receiver<DebtHistoryEntry>,
}

impl HistorySubscription {
    pub fn customer_id(&self) -> &str { &self.customer_id }

    /// Next entry for this customer, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<DebtHistoryEntry> {
        loop {
            match self.rx.recv().await {
                Ok(entry) if entry.customer_id == self.customer_id => return Some(entry),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(customer_id = %self.customer_id, skipped, "history subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = DebtHistoryEntry> + Send + 'static {
        let customer_id = self.customer_id;
        BroadcastStream::new(self.rx).filter_map(move |item| {
            let keep = match item {
                Ok(entry) if entry.customer_id == customer_id => Some(entry),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(customer_id = %customer_id, skipped, "history stream lagged");
                    None
                }
            };
            futures::future::ready(keep)
        })
    }
}
