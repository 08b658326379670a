//! Pool directory: first-fit assignment and eager garbage collection.
//!
//! [`PoolDirectory`] keeps live pools in creation order behind one
//! [`tokio::sync::Mutex`]. `assign` scans for the earliest pool with spare
//! capacity and creates a pool through the [`PoolFactory`] only when none
//! has room. `release` removes the connection and drops its pool in the same
//! critical section once the pool is empty.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};

use super::{ConnId, DirectoryEvent, EventBus, Pool, PoolId};
use crate::error::{BoxError, DispatchError};

/// Builds new pools on demand.
///
/// Invoked only when no existing pool has room. The returned pool supplies
/// both the capacity policy and the initial environment. Any closure
/// `Fn() -> Result<Pool<E>, BoxError>` is a factory.
pub trait PoolFactory<E>: Send + Sync {
    /// Builds an empty pool.
    ///
    /// # Errors
    ///
    /// Any error is propagated as [`DispatchError::FactoryError`] and no
    /// pool is recorded.
    fn new_pool(&self) -> Result<Pool<E>, BoxError>;
}

impl<E, F> PoolFactory<E> for F
where
    F: Fn() -> Result<Pool<E>, BoxError> + Send + Sync,
{
    fn new_pool(&self) -> Result<Pool<E>, BoxError> {
        self()
    }
}

/// Result of a successful [`PoolDirectory::assign`].
pub struct Assignment<E> {
    /// Pool the connection joined.
    pub pool_id: PoolId,
    /// Shared environment of that pool.
    pub environment: Arc<E>,
    /// `true` if the pool was created for this connection.
    pub pool_created: bool,
}

impl<E> fmt::Debug for Assignment<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assignment")
            .field("pool_id", &self.pool_id)
            .field("pool_created", &self.pool_created)
            .finish_non_exhaustive()
    }
}

/// Result of a successful [`PoolDirectory::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// Pool the connection left.
    pub pool_id: PoolId,
    /// Members left in that pool.
    pub remaining: usize,
    /// `true` if the pool became empty and was removed.
    pub pool_removed: bool,
}

/// Point-in-time view of one pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    /// Pool identifier.
    pub pool_id: PoolId,
    /// Member limit, `None` when unbounded.
    pub capacity: Option<usize>,
    /// Current number of members.
    pub members: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl<E> From<&Pool<E>> for PoolSummary {
    fn from(pool: &Pool<E>) -> Self {
        Self {
            pool_id: pool.id(),
            capacity: pool.capacity().limit(),
            members: pool.len(),
            created_at: pool.created_at(),
        }
    }
}

/// Point-in-time view of the whole directory, pools in first-fit order.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySnapshot {
    /// Pool summaries in creation order.
    pub pools: Vec<PoolSummary>,
    /// Pool-count ceiling, `None` when unlimited.
    pub max_pools: Option<usize>,
}

impl DirectorySnapshot {
    /// Number of live pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Number of connections across all pools.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.pools.iter().map(|p| p.members).sum()
    }
}

/// Type-erased read access to a directory, independent of its environment
/// type. Used by the HTTP surface.
pub trait DirectoryView: Send + Sync + fmt::Debug {
    /// Takes a snapshot of all pools.
    fn directory_snapshot(&self) -> BoxFuture<'_, DirectorySnapshot>;
}

/// Ordered collection of live pools.
///
/// # Concurrency
///
/// All reads and writes go through one mutex. The scan that picks a target
/// pool and the insert into it happen under the same guard, as do the
/// removal of a connection and the removal of its then-empty pool, so no
/// concurrent `assign` can observe or target a pool mid-teardown.
pub struct PoolDirectory<E> {
    pools: Mutex<Vec<Pool<E>>>,
    factory: Box<dyn PoolFactory<E>>,
    max_pools: Option<NonZeroUsize>,
    event_bus: EventBus,
}

impl<E> PoolDirectory<E>
where
    E: Send + Sync + 'static,
{
    /// Creates an empty directory backed by `factory`, without a pool-count
    /// ceiling.
    #[must_use]
    pub fn new(factory: impl PoolFactory<E> + 'static) -> Self {
        Self {
            pools: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            max_pools: None,
            event_bus: EventBus::default(),
        }
    }

    /// Sets the maximum number of simultaneous pools.
    #[must_use]
    pub fn with_max_pools(mut self, max_pools: Option<NonZeroUsize>) -> Self {
        self.max_pools = max_pools;
        self
    }

    /// Replaces the event bus mutations are published on.
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Subscribes to future directory events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.event_bus.subscribe()
    }

    /// Assigns `conn_id` to the earliest pool with spare capacity, creating
    /// a pool when none has room.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyMember`] if the connection is already in a pool.
    /// - [`DispatchError::DirectoryFull`] if every pool is full and the
    ///   pool-count ceiling is reached.
    /// - [`DispatchError::FactoryError`] if building a new pool failed.
    pub async fn assign(&self, conn_id: ConnId) -> Result<Assignment<E>, DispatchError> {
        let mut pools = self.pools.lock().await;

        if let Some(pool) = pools.iter().find(|p| p.has_connection(conn_id)) {
            return Err(DispatchError::AlreadyMember {
                conn_id,
                pool_id: pool.id(),
            });
        }

        if let Some(pool) = pools.iter_mut().find(|p| !p.is_full()) {
            let environment = pool.add_connection(conn_id)?;
            let pool_id = pool.id();
            self.publish_assigned(pool_id, conn_id, pool.len());
            tracing::debug!(%conn_id, %pool_id, members = pool.len(), "connection assigned");
            return Ok(Assignment {
                pool_id,
                environment,
                pool_created: false,
            });
        }

        if let Some(max) = self.max_pools
            && pools.len() >= max.get()
        {
            return Err(DispatchError::DirectoryFull {
                max_pools: max.get(),
            });
        }

        let mut pool = self
            .factory
            .new_pool()
            .map_err(DispatchError::FactoryError)?;
        // Insert before recording the pool so a refusal leaves nothing behind.
        let environment = pool.add_connection(conn_id)?;
        let pool_id = pool.id();
        let capacity = pool.capacity();
        let members = pool.len();
        pools.push(pool);

        let _ = self.event_bus.publish(DirectoryEvent::PoolCreated {
            pool_id,
            capacity: capacity.limit(),
            pool_count: pools.len(),
            timestamp: Utc::now(),
        });
        self.publish_assigned(pool_id, conn_id, members);
        tracing::info!(%pool_id, %capacity, pools = pools.len(), "pool created");
        tracing::debug!(%conn_id, %pool_id, members, "connection assigned");

        Ok(Assignment {
            pool_id,
            environment,
            pool_created: true,
        })
    }

    /// Removes `conn_id` from its pool, dropping the pool if it becomes
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] if no pool holds the connection,
    /// e.g. on a second release of the same connection.
    pub async fn release(&self, conn_id: ConnId) -> Result<Release, DispatchError> {
        let mut pools = self.pools.lock().await;

        let Some(index) = pools.iter().position(|p| p.has_connection(conn_id)) else {
            return Err(DispatchError::NotFound(conn_id));
        };
        let Some(pool) = pools.get_mut(index) else {
            return Err(DispatchError::NotFound(conn_id));
        };

        pool.remove_connection(conn_id)?;
        let pool_id = pool.id();
        let remaining = pool.len();

        let _ = self.event_bus.publish(DirectoryEvent::ConnectionReleased {
            pool_id,
            conn_id,
            members: remaining,
            timestamp: Utc::now(),
        });
        tracing::debug!(%conn_id, %pool_id, members = remaining, "connection released");

        let pool_removed = remaining == 0;
        if pool_removed {
            pools.remove(index);
            let _ = self.event_bus.publish(DirectoryEvent::PoolRemoved {
                pool_id,
                pool_count: pools.len(),
                timestamp: Utc::now(),
            });
            tracing::info!(%pool_id, pools = pools.len(), "pool removed");
        }

        Ok(Release {
            pool_id,
            remaining,
            pool_removed,
        })
    }

    /// Returns the pool holding `conn_id`, if any.
    pub async fn pool_of(&self, conn_id: ConnId) -> Option<PoolId> {
        self.pools
            .lock()
            .await
            .iter()
            .find(|p| p.has_connection(conn_id))
            .map(Pool::id)
    }

    /// Returns the number of live pools.
    pub async fn len(&self) -> usize {
        self.pools.lock().await.len()
    }

    /// Returns `true` if the directory holds no pools.
    pub async fn is_empty(&self) -> bool {
        self.pools.lock().await.is_empty()
    }

    /// Returns the number of connections across all pools.
    pub async fn connection_count(&self) -> usize {
        self.pools.lock().await.iter().map(Pool::len).sum()
    }

    /// Returns summaries of all pools in first-fit order.
    pub async fn snapshot(&self) -> DirectorySnapshot {
        let pools = self.pools.lock().await;
        DirectorySnapshot {
            pools: pools.iter().map(PoolSummary::from).collect(),
            max_pools: self.max_pools.map(NonZeroUsize::get),
        }
    }

    fn publish_assigned(&self, pool_id: PoolId, conn_id: ConnId, members: usize) {
        let _ = self.event_bus.publish(DirectoryEvent::ConnectionAssigned {
            pool_id,
            conn_id,
            members,
            timestamp: Utc::now(),
        });
    }
}

impl<E> DirectoryView for PoolDirectory<E>
where
    E: Send + Sync + 'static,
{
    fn directory_snapshot(&self) -> BoxFuture<'_, DirectorySnapshot> {
        self.snapshot().boxed()
    }
}

impl<E> fmt::Debug for PoolDirectory<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolDirectory")
            .field("max_pools", &self.max_pools)
            .field("event_bus", &self.event_bus)
            .finish_non_exhaustive()
    }
}
