use std::{sync::Arc, time::Duration};

use ticket_pool::{TicketId, TicketPool};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Buys one ticket at a time until no ticket is left and none will be issued.
pub struct Customer {
    pool: Arc<TicketPool>,
    retrieval_rate: Duration,
    name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerReport {
    pub name: String,
    /// Tickets in the order they were bought.
    pub purchased: Vec<TicketId>,
    pub cancelled: bool,
}

impl Customer {
    pub fn new(pool: Arc<TicketPool>, retrieval_rate: Duration, name: impl Into<String>) -> Self {
        Self {
            pool,
            retrieval_rate,
            name: name.into(),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> CustomerReport {
        let mut purchased = Vec::new();
        let mut cancelled = false;

        loop {
            if self.pool.is_drained().await {
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.pool.remove_ticket(&self.name, &cancel).await {
                Some(ticket) => purchased.push(ticket),
                None => {
                    cancelled = cancel.is_cancelled();
                    break;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.retrieval_rate) => {}
            }
        }

        info!(
            customer = %self.name,
            purchased = purchased.len(),
            cancelled,
            "{} finished purchasing tickets.",
            self.name
        );
        CustomerReport {
            name: self.name,
            purchased,
            cancelled,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const GUARD: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn customer_drains_pool_in_order() {
        let pool = Arc::new(TicketPool::new(4, 4));
        pool.add_tickets(4, "Vendor-1").await;

        let report = tokio::time::timeout(
            GUARD,
            Customer::new(pool.clone(), Duration::from_millis(1), "Customer-1").run(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(report.purchased, (1..=4).map(TicketId).collect::<Vec<_>>());
        assert!(!report.cancelled);
        assert!(pool.is_drained().await);
    }

    #[tokio::test]
    async fn customer_on_drained_pool_returns_immediately() {
        let pool = Arc::new(TicketPool::new(0, 1));
        let report = tokio::time::timeout(
            GUARD,
            Customer::new(pool, Duration::ZERO, "Customer-1").run(CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(report.purchased.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn customer_waits_for_vendor_then_finishes() {
        let pool = Arc::new(TicketPool::new(2, 2));
        let handle = tokio::spawn(
            Customer::new(pool.clone(), Duration::ZERO, "Customer-1").run(CancellationToken::new()),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        pool.add_tickets(2, "Vendor-1").await;
        let report = tokio::time::timeout(GUARD, handle).await.unwrap().unwrap();
        assert_eq!(report.purchased, vec![TicketId(1), TicketId(2)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn customer_cancelled_while_waiting_buys_nothing() {
        let pool = Arc::new(TicketPool::new(5, 5));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            Customer::new(pool.clone(), Duration::ZERO, "Customer-1").run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = tokio::time::timeout(GUARD, handle).await.unwrap().unwrap();
        assert!(report.cancelled);
        assert!(report.purchased.is_empty());
        assert_eq!(pool.issued_tickets().await, 0);
    }
}
