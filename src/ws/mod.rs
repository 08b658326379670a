//! WebSocket transport: axum upgrade handler and the adapters that plug
//! axum's [`WebSocket`](axum::extract::ws::WebSocket) into the dispatcher
//! contracts.

pub mod handler;
pub mod upgrade;

pub use handler::{router, ws_handler};
pub use upgrade::WsUpgrader;
