use std::{sync::Arc, time::Duration};

use ticket_pool::TicketPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Tickets a vendor offers per release.
pub const VENDOR_BATCH_SIZE: usize = 5;

/// Releases tickets into the pool at a fixed interval until the budget is exhausted.
pub struct Vendor {
    pool: Arc<TicketPool>,
    release_rate: Duration,
    name: String,
    batch_size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorReport {
    pub name: String,
    /// Accepted calls to `add_tickets`, including ones that added nothing because the pool was full.
    pub releases: usize,
    pub cancelled: bool,
}

impl Vendor {
    pub fn new(pool: Arc<TicketPool>, release_rate: Duration, name: impl Into<String>) -> Self {
        Self {
            pool,
            release_rate,
            name: name.into(),
            batch_size: VENDOR_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> VendorReport {
        let mut releases = 0;
        let mut cancelled = false;

        while !self.pool.all_tickets_issued().await {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if !self.pool.add_tickets(self.batch_size, &self.name).await {
                break;
            }
            releases += 1;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.release_rate) => {}
            }
        }

        info!(vendor = %self.name, releases, cancelled, "{} finished issuing tickets.", self.name);
        VendorReport {
            name: self.name,
            releases,
            cancelled,
        }
    }
}
