//! Service layer: the per-connection dispatch state machine and the
//! contracts of the collaborators it drives.
//!
//! ```text
//! PENDING → VERIFIED → UPGRADED → ASSIGNED → HANDLED → RELEASED
//!     └──────────┴──────────┴──────────┴─────────┴──→ ERRORED
//! ```

pub mod contracts;
pub mod dispatcher;
pub mod lifecycle;

pub use contracts::{
    Connection, ConnectionProcessor, ErrorReporter, HandshakeRequest, RequestVerifier,
    TracingReporter, Transport, Upgraded, Upgrader,
};
pub use dispatcher::Dispatcher;
pub use lifecycle::{DispatchContext, DispatchReport, DispatchState};
