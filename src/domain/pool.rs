//! A single pool: a capacity-bounded group of connections sharing one
//! environment.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{ConnId, PoolId};
use crate::error::DispatchError;

/// Capacity policy of a pool, fixed for the pool's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most this many members.
    Bounded(NonZeroUsize),
    /// Grows without limit; never reports itself full.
    Unbounded,
}

impl Capacity {
    /// Builds a capacity from a plain number, where `0` means unbounded.
    #[must_use]
    pub fn from_limit(limit: usize) -> Self {
        NonZeroUsize::new(limit).map_or(Self::Unbounded, Self::Bounded)
    }

    /// Returns the numeric limit, or `None` when unbounded.
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::Bounded(n) => Some(n.get()),
            Self::Unbounded => None,
        }
    }

    /// Returns `true` if `members` connections exhaust this capacity.
    #[must_use]
    pub const fn is_exhausted_by(self, members: usize) -> bool {
        match self {
            Self::Bounded(n) => members >= n.get(),
            Self::Unbounded => false,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{n}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// One group of connections sharing an environment `E`.
///
/// Membership is tracked by [`ConnId`]; the pool never touches the
/// underlying stream. The environment is created together with the pool and
/// dropped with it once the last handle returned by
/// [`Pool::add_connection`] is gone.
pub struct Pool<E> {
    id: PoolId,
    capacity: Capacity,
    members: HashSet<ConnId>,
    environment: Arc<E>,
    created_at: DateTime<Utc>,
}

impl<E> Pool<E> {
    /// Creates an empty pool owning `environment`.
    #[must_use]
    pub fn new(capacity: Capacity, environment: E) -> Self {
        Self {
            id: PoolId::new(),
            capacity,
            members: HashSet::new(),
            environment: Arc::new(environment),
            created_at: Utc::now(),
        }
    }

    /// Creates an empty pool with a fixed member limit.
    #[must_use]
    pub fn bounded(limit: NonZeroUsize, environment: E) -> Self {
        Self::new(Capacity::Bounded(limit), environment)
    }

    /// Creates an empty pool without a member limit.
    #[must_use]
    pub fn unbounded(environment: E) -> Self {
        Self::new(Capacity::Unbounded, environment)
    }

    /// Pool identifier.
    #[must_use]
    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// Capacity policy.
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when the pool has no spare capacity.
    /// Always `false` for [`Capacity::Unbounded`].
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity.is_exhausted_by(self.members.len())
    }

    /// Returns `true` when the pool has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if `conn_id` is a member of this pool.
    #[must_use]
    pub fn has_connection(&self, conn_id: ConnId) -> bool {
        self.members.contains(&conn_id)
    }

    /// Shared handle to the environment.
    #[must_use]
    pub fn environment(&self) -> Arc<E> {
        Arc::clone(&self.environment)
    }

    /// Adds `conn_id` to the pool and returns the shared environment.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyMember`] if the connection is already here.
    /// - [`DispatchError::PoolFull`] if the pool has no spare capacity.
    pub fn add_connection(&mut self, conn_id: ConnId) -> Result<Arc<E>, DispatchError> {
        if self.members.contains(&conn_id) {
            return Err(DispatchError::AlreadyMember {
                conn_id,
                pool_id: self.id,
            });
        }
        if self.is_full() {
            return Err(DispatchError::PoolFull(self.id));
        }
        self.members.insert(conn_id);
        Ok(self.environment())
    }

    /// Removes `conn_id` from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] if the connection is not a member.
    pub fn remove_connection(&mut self, conn_id: ConnId) -> Result<(), DispatchError> {
        if self.members.remove(&conn_id) {
            Ok(())
        } else {
            Err(DispatchError::NotFound(conn_id))
        }
    }
}

impl<E> fmt::Debug for Pool<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("members", &self.members.len())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
