//! Domain layer: identifiers, pools, the pool directory and its events.
//!
//! The [`PoolDirectory`] is the only shared mutable structure in the crate.
//! Everything it stores sits behind a single lock so that the "scan, then
//! mutate" sequences of assignment and release are atomic with respect to
//! each other.

pub mod directory_event;
pub mod event_bus;
pub mod ids;
pub mod pool;
pub mod pool_directory;

pub use directory_event::DirectoryEvent;
pub use event_bus::EventBus;
pub use ids::{ConnId, PoolId};
pub use pool::{Capacity, Pool};
pub use pool_directory::{
    Assignment, DirectorySnapshot, DirectoryView, PoolDirectory, PoolFactory, PoolSummary, Release,
};
