use std::collections::VecDeque;

use chrono::Local;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{PoolEvent, PoolSnapshot, TicketId};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct PoolState {
    queue: VecDeque<TicketId>,
    issued_tickets: usize,
}

/// Shared ticket pool. Clone the surrounding `Arc` to hand it to vendors and customers.
///
/// A single mutex guards the queue and the issuance counter. `changed` acts as the condition
/// variable: it is broadcast after every successful mutation and waiters re-check their
/// predicate on each wakeup.
pub struct TicketPool {
    state: Mutex<PoolState>,
    changed: Notify,
    events: broadcast::Sender<PoolEvent>,
    total_tickets: usize,
    max_capacity: usize,
}

impl TicketPool {
    pub fn new(total_tickets: usize, max_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                issued_tickets: 0,
            }),
            changed: Notify::new(),
            events,
            total_tickets,
            max_capacity,
        }
    }

    pub fn total_tickets(&self) -> usize {
        self.total_tickets
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Subscribe to the events published after each successful mutation.
    /// Events sent before the call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Issue up to `requested` new tickets on behalf of `source`.
    ///
    /// Returns `false` only when the budget was already exhausted at call time. Otherwise the
    /// number added is capped by the free space and the remaining budget, may be zero, and the
    /// call returns `true`. Never waits for space.
    pub async fn add_tickets(&self, requested: usize, source: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.issued_tickets >= self.total_tickets {
            return false;
        }

        let room = self.max_capacity.saturating_sub(state.queue.len());
        let budget_left = self.total_tickets - state.issued_tickets;
        let actual = requested.min(room).min(budget_left);

        for _ in 0..actual {
            state.issued_tickets += 1;
            let id = TicketId(state.issued_tickets as u64);
            state.queue.push_back(id);
        }

        let pool_size = state.queue.len();
        self.changed.notify_waiters();
        self.publish(PoolEvent::Added {
            at: Local::now(),
            source: source.to_string(),
            count: actual,
            pool_size,
        });
        true
    }

    /// Take the oldest ticket in the pool on behalf of `source`.
    ///
    /// Waits while the pool is empty and more tickets may still be issued. Returns `None` once
    /// the pool is empty and the budget is exhausted, or when `cancel` fires during the wait;
    /// in both cases no ticket is consumed.
    pub async fn remove_ticket(&self, source: &str, cancel: &CancellationToken) -> Option<TicketId> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // register before checking state so a broadcast sent after we unlock is not missed
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(ticket) = state.queue.pop_front() {
                    let remaining = state.queue.len();
                    self.changed.notify_waiters();
                    self.publish(PoolEvent::Purchased {
                        at: Local::now(),
                        source: source.to_string(),
                        ticket,
                        remaining,
                    });
                    return Some(ticket);
                }

                if state.issued_tickets >= self.total_tickets {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    debug!(source, "purchase abandoned while waiting for tickets");
                    return None;
                }
            }
        }
    }

    pub async fn all_tickets_issued(&self) -> bool {
        self.state.lock().await.issued_tickets >= self.total_tickets
    }

    pub async fn available_tickets(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn issued_tickets(&self) -> usize {
        self.state.lock().await.issued_tickets
    }

    /// True once every ticket has been issued and the pool is empty, checked atomically.
    pub async fn is_drained(&self) -> bool {
        let state = self.state.lock().await;
        state.issued_tickets >= self.total_tickets && state.queue.is_empty()
    }

    /// Non-destructive copy of the pool state.
    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        PoolSnapshot {
            total_tickets: self.total_tickets,
            max_capacity: self.max_capacity,
            issued_tickets: state.issued_tickets,
            queued: state.queue.iter().copied().collect(),
        }
    }

    fn publish(&self, event: PoolEvent) {
        debug!(%event, "pool mutated");
        // no subscribers is fine, the event is simply dropped
        let _ = self.events.send(event);
    }
}
