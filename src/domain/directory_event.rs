//! Events describing directory mutations.
//!
//! Every pool creation, pool removal, assignment and release emits a
//! [`DirectoryEvent`] through the [`super::EventBus`]. Events are published
//! while the directory lock is held, so subscribers observe them in the
//! order the mutations happened.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ConnId, PoolId};

/// Domain event emitted after every directory mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    /// A new pool was appended to the directory.
    PoolCreated {
        /// Pool identifier.
        pool_id: PoolId,
        /// Member limit, `None` when unbounded.
        capacity: Option<usize>,
        /// Number of pools after the insert.
        pool_count: usize,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An empty pool was removed from the directory.
    PoolRemoved {
        /// Pool identifier.
        pool_id: PoolId,
        /// Number of pools after the removal.
        pool_count: usize,
        /// Removal timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A connection joined a pool.
    ConnectionAssigned {
        /// Pool identifier.
        pool_id: PoolId,
        /// Connection identifier.
        conn_id: ConnId,
        /// Members in the pool after the insert.
        members: usize,
        /// Assignment timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A connection left its pool.
    ConnectionReleased {
        /// Pool identifier.
        pool_id: PoolId,
        /// Connection identifier.
        conn_id: ConnId,
        /// Members left in the pool.
        members: usize,
        /// Release timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl DirectoryEvent {
    /// Returns the pool this event refers to.
    #[must_use]
    pub const fn pool_id(&self) -> PoolId {
        match self {
            Self::PoolCreated { pool_id, .. }
            | Self::PoolRemoved { pool_id, .. }
            | Self::ConnectionAssigned { pool_id, .. }
            | Self::ConnectionReleased { pool_id, .. } => *pool_id,
        }
    }

    /// Returns the event type as a snake_case string.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PoolCreated { .. } => "pool_created",
            Self::PoolRemoved { .. } => "pool_removed",
            Self::ConnectionAssigned { .. } => "connection_assigned",
            Self::ConnectionReleased { .. } => "connection_released",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_type_tag() {
        let event = DirectoryEvent::PoolRemoved {
            pool_id: PoolId::new(),
            pool_count: 0,
            timestamp: Utc::now(),
        };
        let Ok(value) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        let tag = value.get("event_type").and_then(|v| v.as_str());
        assert_eq!(tag, Some("pool_removed"));
        assert_eq!(tag, Some(event.event_type_str()));
    }

    #[test]
    fn pool_id_covers_every_variant() {
        let pool_id = PoolId::new();
        let conn_id = ConnId::new();
        let now = Utc::now();
        let events = [
            DirectoryEvent::PoolCreated {
                pool_id,
                capacity: Some(2),
                pool_count: 1,
                timestamp: now,
            },
            DirectoryEvent::ConnectionAssigned {
                pool_id,
                conn_id,
                members: 1,
                timestamp: now,
            },
            DirectoryEvent::ConnectionReleased {
                pool_id,
                conn_id,
                members: 0,
                timestamp: now,
            },
            DirectoryEvent::PoolRemoved {
                pool_id,
                pool_count: 0,
                timestamp: now,
            },
        ];
        assert!(events.iter().all(|e| e.pool_id() == pool_id));
    }
}
