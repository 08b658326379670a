//! Directory snapshot DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{DirectorySnapshot, PoolSummary};

/// One pool in a `GET /directory` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolSummaryDto {
    /// Pool identifier.
    pub pool_id: String,
    /// Member limit, `null` when unbounded.
    pub capacity: Option<usize>,
    /// Current number of members.
    pub members: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<PoolSummary> for PoolSummaryDto {
    fn from(summary: PoolSummary) -> Self {
        Self {
            pool_id: summary.pool_id.to_string(),
            capacity: summary.capacity,
            members: summary.members,
            created_at: summary.created_at,
        }
    }
}

/// Response body for `GET /directory`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DirectoryResponse {
    /// Number of live pools.
    pub pool_count: usize,
    /// Number of connections across all pools.
    pub connection_count: usize,
    /// Pool-count ceiling, `null` when unlimited.
    pub max_pools: Option<usize>,
    /// Pools in first-fit order.
    pub pools: Vec<PoolSummaryDto>,
}

impl From<DirectorySnapshot> for DirectoryResponse {
    fn from(snapshot: DirectorySnapshot) -> Self {
        Self {
            pool_count: snapshot.pool_count(),
            connection_count: snapshot.connection_count(),
            max_pools: snapshot.max_pools,
            pools: snapshot.pools.into_iter().map(PoolSummaryDto::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PoolId;

    #[test]
    fn counts_are_derived_from_pools() {
        let pool = |members| PoolSummary {
            pool_id: PoolId::new(),
            capacity: Some(2),
            members,
            created_at: Utc::now(),
        };
        let response = DirectoryResponse::from(DirectorySnapshot {
            pools: vec![pool(2), pool(1)],
            max_pools: None,
        });
        assert_eq!(response.pool_count, 2);
        assert_eq!(response.connection_count, 3);
        assert_eq!(response.pools.len(), 2);
    }
}
