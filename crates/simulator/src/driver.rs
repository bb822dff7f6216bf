use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::{DateTime, Local};
use ticket_pool::{TicketId, TicketPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    config::PoolSettings,
    customer::{Customer, CustomerReport},
    errors::SimulatorError,
    ledger::{SalesLedger, SourceTally},
    vendor::{Vendor, VendorReport},
};

/// Everything needed to start a run.
#[derive(Clone, Copy, Debug)]
pub struct RunPlan {
    pub settings: PoolSettings,
    pub vendors: usize,
    pub customers: usize,
    pub batch_size: usize,
}

impl RunPlan {
    /// A run with tickets to sell needs room in the pool, at least one vendor, one customer and a
    /// non-empty batch, otherwise some worker would loop forever.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.settings.total_tickets == 0 {
            return Ok(());
        }
        if self.settings.max_capacity == 0 {
            return Err(SimulatorError::InvalidConfig(
                "max ticket capacity must be at least 1 when tickets are to be issued".into(),
            ));
        }
        if self.vendors == 0 {
            return Err(SimulatorError::InvalidConfig("at least one vendor is required".into()));
        }
        if self.customers == 0 {
            return Err(SimulatorError::InvalidConfig("at least one customer is required".into()));
        }
        if self.batch_size == 0 {
            return Err(SimulatorError::InvalidConfig("vendor batch size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub elapsed: std::time::Duration,
    pub total_tickets: usize,
    pub issued_tickets: usize,
    pub left_in_pool: usize,
    pub vendors: Vec<VendorReport>,
    pub customers: Vec<CustomerReport>,
    pub tallies: BTreeMap<String, SourceTally>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn tickets_sold(&self) -> usize {
        self.customers.iter().map(|c| c.purchased.len()).sum()
    }

    /// Every ticket bought across all customers, sorted by id.
    pub fn sold_tickets(&self) -> Vec<TicketId> {
        let mut all: Vec<TicketId> = self
            .customers
            .iter()
            .flat_map(|c| c.purchased.iter().copied())
            .collect();
        all.sort();
        all
    }

    /// True when no ticket was sold twice and each customer bought in issuance order.
    pub fn is_consistent(&self) -> bool {
        let in_order = self
            .customers
            .iter()
            .all(|c| c.purchased.windows(2).all(|w| w[0] < w[1]));
        let sold = self.sold_tickets();
        let unique = sold.windows(2).all(|w| w[0] != w[1]);
        in_order && unique && sold.len() + self.left_in_pool == self.issued_tickets
    }
}

/// Build the pool, run every vendor and customer to completion (or until `cancel` fires) and
/// report what happened.
pub async fn run_simulation(plan: RunPlan, cancel: CancellationToken) -> Result<RunReport, SimulatorError> {
    plan.validate()?;

    let run_id = Uuid::new_v4();
    let span = info_span!("simulation", %run_id);
    run_inner(plan, run_id, cancel).instrument(span).await
}

async fn run_inner(plan: RunPlan, run_id: Uuid, cancel: CancellationToken) -> Result<RunReport, SimulatorError> {
    let settings = plan.settings;
    let started_at = Local::now();
    let start = Instant::now();

    info!(
        total_tickets = settings.total_tickets,
        max_capacity = settings.max_capacity,
        vendors = plan.vendors,
        customers = plan.customers,
        "starting simulation"
    );

    let pool = Arc::new(TicketPool::new(settings.total_tickets, settings.max_capacity));
    let ledger = SalesLedger::default();
    let ledger_task = ledger.start(pool.subscribe());
    let total_tickets = pool.total_tickets();
    debug!(max_capacity = pool.max_capacity(), "pool ready");

    let vendor_handles: Vec<_> = (1..=plan.vendors)
        .map(|i| {
            let vendor = Vendor::new(pool.clone(), settings.release_rate, format!("Vendor-{}", i))
                .with_batch_size(plan.batch_size);
            tokio::spawn(vendor.run(cancel.clone()).in_current_span())
        })
        .collect();

    let customer_handles: Vec<_> = (1..=plan.customers)
        .map(|i| {
            let customer = Customer::new(pool.clone(), settings.retrieval_rate, format!("Customer-{}", i));
            tokio::spawn(customer.run(cancel.clone()).in_current_span())
        })
        .collect();

    let mut vendors = Vec::with_capacity(vendor_handles.len());
    for handle in vendor_handles {
        vendors.push(handle.await?);
    }
    let mut customers = Vec::with_capacity(customer_handles.len());
    for handle in customer_handles {
        customers.push(handle.await?);
    }

    let snapshot = pool.snapshot().await;

    // last sender goes away with the pool, which lets the ledger finish draining
    drop(pool);
    ledger_task.await?;

    let cancelled = cancel.is_cancelled()
        || vendors.iter().any(|v| v.cancelled)
        || customers.iter().any(|c| c.cancelled);

    let report = RunReport {
        run_id,
        started_at,
        elapsed: start.elapsed(),
        total_tickets,
        issued_tickets: snapshot.issued_tickets,
        left_in_pool: snapshot.available(),
        vendors,
        customers,
        tallies: ledger.snapshot().await,
        cancelled,
    };

    info!(
        sold = report.tickets_sold(),
        issued = report.issued_tickets,
        cancelled = report.cancelled,
        "simulation complete"
    );
    Ok(report)
}



#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const GUARD: Duration = Duration::from_secs(10);

    fn plan(total: usize, capacity: usize, vendors: usize, customers: usize) -> RunPlan {
        RunPlan {
            settings: PoolSettings {
                total_tickets: total,
                release_rate: Duration::from_millis(1),
                retrieval_rate: Duration::from_millis(1),
                max_capacity: capacity,
            },
            vendors,
            customers,
            batch_size: 5,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_vendor_single_customer_sells_everything() {
        let report = tokio::time::timeout(GUARD, run_simulation(plan(10, 5, 1, 1), CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.tickets_sold(), 10);
        assert_eq!(report.sold_tickets(), (1..=10).map(TicketId).collect::<Vec<_>>());
        assert_eq!(report.customers[0].purchased, report.sold_tickets());
        assert_eq!(report.left_in_pool, 0);
        assert!(report.is_consistent());

        let vendor = &report.tallies["Vendor-1"];
        assert_eq!(vendor.added, 10);
        assert_eq!(report.tallies["Customer-1"].purchased, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_workers_sell_each_ticket_exactly_once() {
        let report = tokio::time::timeout(GUARD, run_simulation(plan(57, 4, 3, 4), CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.vendors.len(), 3);
        assert_eq!(report.customers.len(), 4);
        assert_eq!(report.issued_tickets, 57);
        assert_eq!(report.sold_tickets(), (1..=57).map(TicketId).collect::<Vec<_>>());
        assert!(report.is_consistent());

        let added: usize = report
            .tallies
            .iter()
            .filter(|(name, _)| name.starts_with("Vendor-"))
            .map(|(_, t)| t.added)
            .sum();
        assert_eq!(added, 57);
    }

    #[tokio::test]
    async fn empty_budget_finishes_immediately() {
        let report = tokio::time::timeout(GUARD, run_simulation(plan(0, 0, 2, 2), CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.tickets_sold(), 0);
        assert!(report.vendors.iter().all(|v| v.releases == 0));
        assert!(report.is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_stops_a_slow_run() {
        let mut slow = plan(1_000, 10, 2, 2);
        slow.settings.release_rate = Duration::from_secs(3600);
        slow.settings.retrieval_rate = Duration::from_secs(3600);

        let cancel = CancellationToken::new();
        let run = tokio::spawn(run_simulation(slow, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let report = tokio::time::timeout(GUARD, run).await.unwrap().unwrap().unwrap();
        assert!(report.cancelled);
        assert!(report.issued_tickets < 1_000);
        assert!(report.is_consistent());
    }

    #[test]
    fn plan_without_workers_is_rejected() {
        assert!(matches!(plan(10, 5, 0, 1).validate(), Err(SimulatorError::InvalidConfig(_))));
        assert!(matches!(plan(10, 5, 1, 0).validate(), Err(SimulatorError::InvalidConfig(_))));

        let mut zero_batch = plan(10, 5, 1, 1);
        zero_batch.batch_size = 0;
        assert!(zero_batch.validate().is_err());

        assert!(plan(0, 5, 0, 0).validate().is_ok());
    }

    #[tokio::test]
    async fn plan_with_zero_capacity_is_rejected_before_running() {
        let no_room = plan(10, 0, 1, 1);
        assert!(matches!(no_room.validate(), Err(SimulatorError::InvalidConfig(_))));

        let res = tokio::time::timeout(GUARD, run_simulation(no_room, CancellationToken::new()))
            .await
            .unwrap();
        assert!(matches!(res, Err(SimulatorError::InvalidConfig(_))));
    }
}
