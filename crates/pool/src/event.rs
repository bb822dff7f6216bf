use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format used when rendering event timestamps, e.g. `2024-12-01 14:03:59`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifier of an issued ticket. Ids start at 1 and follow issuance order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket-{}", self.0)
    }
}

/// Record emitted by the pool after every successful mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A vendor released `count` tickets (possibly zero when the pool was full).
    Added {
        at: DateTime<Local>,
        source: String,
        count: usize,
        pool_size: usize,
    },
    /// A customer bought `ticket`, leaving `remaining` tickets in the pool.
    Purchased {
        at: DateTime<Local>,
        source: String,
        ticket: TicketId,
        remaining: usize,
    },
}

impl PoolEvent {
    pub fn source(&self) -> &str {
        match self {
            PoolEvent::Added { source, .. } | PoolEvent::Purchased { source, .. } => source,
        }
    }

    /// Number of tickets in the pool right after the mutation.
    pub fn pool_size(&self) -> usize {
        match self {
            PoolEvent::Added { pool_size, .. } => *pool_size,
            PoolEvent::Purchased { remaining, .. } => *remaining,
        }
    }
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEvent::Added { at, source, count, pool_size } => write!(
                f,
                "{} - {} added {} tickets. Current pool size: {}",
                at.format(TIMESTAMP_FORMAT),
                source,
                count,
                pool_size
            ),
            PoolEvent::Purchased { at, source, ticket, remaining } => write!(
                f,
                "{} - {} purchased {}. Remaining tickets: {}",
                at.format(TIMESTAMP_FORMAT),
                source,
                ticket,
                remaining
            ),
        }
    }
}

/// Read-only copy of the pool state, taken under the pool lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub total_tickets: usize,
    pub max_capacity: usize,
    pub issued_tickets: usize,
    pub queued: Vec<TicketId>,
}

impl PoolSnapshot {
    pub fn available(&self) -> usize {
        self.queued.len()
    }
}
