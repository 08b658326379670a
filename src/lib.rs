//! # pool-ws-gateway
//!
//! Dispatch layer for long-lived WebSocket connections organized into
//! capacity-bounded pools that share a common environment.
//!
//! Each incoming request is verified, upgraded, assigned to the earliest
//! pool with spare capacity (a new pool is built when none has room),
//! handed to the application's processor together with that pool's
//! environment, and finally released. Empty pools are dropped on the spot.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS Handler (ws/)          ── verify, upgrade, spawn
//!     ├── HTTP surface (api/)       ── health, directory snapshot
//!     │
//!     ├── Dispatcher (service/)     ── lifecycle state machine
//!     │     ├── RequestVerifier
//!     │     ├── Upgrader / Transport
//!     │     ├── ConnectionProcessor
//!     │     └── ErrorReporter
//!     │
//!     ├── PoolDirectory (domain/)   ── first-fit assign, release, GC
//!     │     ├── PoolFactory
//!     │     └── EventBus
//!     │
//!     └── Chat rooms (chat/)        ── demo application
//! ```

pub mod api;
pub mod app_state;
pub mod chat;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;

pub use domain::{Capacity, ConnId, Pool, PoolDirectory, PoolFactory, PoolId};
pub use error::{BoxError, DispatchError};
pub use service::{
    Connection, ConnectionProcessor, DispatchReport, DispatchState, Dispatcher, ErrorReporter,
    HandshakeRequest, RequestVerifier, Transport, Upgrader,
};
