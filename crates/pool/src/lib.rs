//! A bounded FIFO pool of tickets with a hard cap on how many tickets are ever issued.
//!
//! Vendors push batches with [`TicketPool::add_tickets`] and never block; customers pull one
//! ticket at a time with [`TicketPool::remove_ticket`] and wait while the pool is empty but the
//! budget is not yet exhausted. Every successful mutation is published as a [`PoolEvent`].

mod event;
mod pool;

pub use event::{PoolEvent, PoolSnapshot, TicketId, TIMESTAMP_FORMAT};
pub use pool::TicketPool;
