//! Divided chat rooms: a complete application built on the dispatcher.
//!
//! Every pool is a [`ChatRoom`]; members of one room see each other's
//! messages and nobody else's. Rooms are opened as earlier ones fill up and
//! disappear when their last member leaves.

pub mod messages;
pub mod processor;
pub mod room;
pub mod verifier;

use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::Router;

pub use processor::ChatProcessor;
pub use room::{ChatLine, ChatRoom, ChatRoomFactory};
pub use verifier::TokenVerifier;

use crate::api;
use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::domain::{EventBus, PoolDirectory};
use crate::service::Dispatcher;
use crate::ws;

/// Dispatcher type of the chat application.
pub type ChatDispatcher = Dispatcher<ChatRoom, ChatProcessor>;

/// The assembled chat application.
#[derive(Debug)]
pub struct ChatApp {
    /// Complete router: WebSocket endpoint plus the HTTP surface.
    pub router: Router,
    /// The dispatcher behind the WebSocket endpoint.
    pub dispatcher: Arc<ChatDispatcher>,
}

impl ChatApp {
    /// Wires directory, dispatcher and routes from `config`.
    #[must_use]
    pub fn build(config: &GatewayConfig) -> Self {
        let directory = Arc::new(
            PoolDirectory::new(ChatRoomFactory::from_config(config))
                .with_max_pools(NonZeroUsize::new(config.max_pools))
                .with_event_bus(EventBus::new(config.event_bus_capacity)),
        );

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&directory),
            ChatProcessor::new(config.max_message_len),
        );
        if let Some(token) = &config.auth_token {
            dispatcher = dispatcher.with_verifier(TokenVerifier::new(token.clone()));
        }
        let dispatcher = Arc::new(dispatcher);

        let state = AppState::new(directory);
        let router = Router::new()
            .merge(ws::router(Arc::clone(&dispatcher), &config.ws_path))
            .merge(api::build_router(state));

        Self { router, dispatcher }
    }
}
