use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use ticket_pool::PoolEvent;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Per-source totals derived from pool events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceTally {
    /// Tickets a vendor placed in the pool.
    pub added: usize,
    /// Releases that found the pool full and added nothing.
    pub empty_releases: usize,
    /// Tickets a customer bought.
    pub purchased: usize,
}

/// Consumes the pool's event stream, writes each event as a log line and keeps tallies.
#[derive(Clone, Default)]
pub struct SalesLedger {
    inner: Arc<Mutex<HashMap<String, SourceTally>>>,
}

impl SalesLedger {
    pub async fn record(&self, event: &PoolEvent) {
        let mut m = self.inner.lock().await;
        let tally = m.entry(event.source().to_string()).or_default();
        match event {
            PoolEvent::Added { count: 0, .. } => tally.empty_releases += 1,
            PoolEvent::Added { count, .. } => tally.added += count,
            PoolEvent::Purchased { .. } => tally.purchased += 1,
        }
    }

    /// Read-only copy of all tallies, ordered by source name.
    pub async fn snapshot(&self) -> BTreeMap<String, SourceTally> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Start a background task that drains `events` until every sender is gone.
    pub fn start(&self, mut events: broadcast::Receiver<PoolEvent>) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        info!("{}", event);
                        ledger.record(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ledger fell behind, some pool events were not recorded");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}



// Tests for SalesLedger
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use ticket_pool::{TicketId, TicketPool};
    use tokio_util::sync::CancellationToken;

    fn added(source: &str, count: usize) -> PoolEvent {
        PoolEvent::Added { at: Local::now(), source: source.to_string(), count, pool_size: count }
    }

    fn purchased(source: &str, ticket: u64) -> PoolEvent {
        PoolEvent::Purchased { at: Local::now(), source: source.to_string(), ticket: TicketId(ticket), remaining: 0 }
    }

    #[tokio::test]
    async fn record_tallies_by_source() {
        let ledger = SalesLedger::default();
        ledger.record(&added("Vendor-1", 5)).await;
        ledger.record(&added("Vendor-1", 0)).await;
        ledger.record(&added("Vendor-1", 3)).await;
        ledger.record(&purchased("Customer-1", 1)).await;
        ledger.record(&purchased("Customer-1", 2)).await;

        let tallies = ledger.snapshot().await;
        assert_eq!(
            tallies["Vendor-1"],
            SourceTally { added: 8, empty_releases: 1, purchased: 0 }
        );
        assert_eq!(tallies["Customer-1"].purchased, 2);
        assert!(!tallies.contains_key("Vendor-9"));
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_source() {
        let ledger = SalesLedger::default();
        ledger.record(&purchased("Customer-2", 1)).await;
        ledger.record(&added("Vendor-1", 1)).await;
        ledger.record(&purchased("Customer-1", 2)).await;

        let names: Vec<_> = ledger.snapshot().await.into_keys().collect();
        assert_eq!(names, vec!["Customer-1", "Customer-2", "Vendor-1"]);
    }

    #[tokio::test]
    async fn started_ledger_follows_pool_until_dropped() {
        let pool = TicketPool::new(3, 3);
        let ledger = SalesLedger::default();
        let handle = ledger.start(pool.subscribe());

        let cancel = CancellationToken::new();
        pool.add_tickets(3, "Vendor-1").await;
        pool.remove_ticket("Customer-1", &cancel).await;
        pool.remove_ticket("Customer-1", &cancel).await;

        // dropping the pool closes the channel and ends the task
        drop(pool);
        handle.await.unwrap();

        let tallies = ledger.snapshot().await;
        assert_eq!(tallies["Vendor-1"].added, 3);
        assert_eq!(tallies["Customer-1"].purchased, 2);
    }
}
