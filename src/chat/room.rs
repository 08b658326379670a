//! Chat room environment and the factory that builds one room per pool.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};

use crate::config::{GatewayConfig, MAX_CHANNEL_CAPACITY};
use crate::domain::{Capacity, ConnId, Pool, PoolFactory};
use crate::error::BoxError;

/// One chat message as stored and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatLine {
    /// Sender connection.
    pub from: ConnId,
    /// Message text.
    pub text: String,
    /// Server receive time.
    pub timestamp: DateTime<Utc>,
}

/// Shared state of one pool: a broadcast channel for live messages and a
/// bounded history for late joiners.
#[derive(Debug)]
pub struct ChatRoom {
    sender: broadcast::Sender<ChatLine>,
    history: Mutex<VecDeque<ChatLine>>,
    history_limit: usize,
}

impl ChatRoom {
    /// Creates an empty room.
    #[must_use]
    pub fn new(history_limit: usize, channel_capacity: usize) -> Self {
        let (sender, _) =
            broadcast::channel(channel_capacity.clamp(1, MAX_CHANNEL_CAPACITY));
        Self {
            sender,
            history: Mutex::new(VecDeque::new()),
            history_limit,
        }
    }

    /// Subscribes to live messages posted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatLine> {
        self.sender.subscribe()
    }

    /// Stores `line` in the history and broadcasts it. Returns the number of
    /// members that received it.
    pub async fn post(&self, line: ChatLine) -> usize {
        {
            let mut history = self.history.lock().await;
            if self.history_limit > 0 {
                while history.len() >= self.history_limit {
                    history.pop_front();
                }
                history.push_back(line.clone());
            }
        }
        self.sender.send(line).unwrap_or(0)
    }

    /// Returns up to `limit` most recent messages, oldest first.
    pub async fn history(&self, limit: Option<usize>) -> Vec<ChatLine> {
        let history = self.history.lock().await;
        let take = limit.unwrap_or(history.len()).min(history.len());
        history.iter().skip(history.len() - take).cloned().collect()
    }
}

/// Builds pools of [`ChatRoom`]s with a fixed capacity policy.
#[derive(Debug, Clone, Copy)]
pub struct ChatRoomFactory {
    capacity: Capacity,
    history_limit: usize,
    channel_capacity: usize,
}

impl ChatRoomFactory {
    /// Creates a factory.
    #[must_use]
    pub const fn new(capacity: Capacity, history_limit: usize, channel_capacity: usize) -> Self {
        Self {
            capacity,
            history_limit,
            channel_capacity,
        }
    }

    /// Creates a factory from the gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            Capacity::from_limit(config.pool_capacity),
            config.room_history_limit,
            config.room_channel_capacity,
        )
    }
}

impl PoolFactory<ChatRoom> for ChatRoomFactory {
    fn new_pool(&self) -> Result<Pool<ChatRoom>, BoxError> {
        Ok(Pool::new(
            self.capacity,
            ChatRoom::new(self.history_limit, self.channel_capacity),
        ))
    }
}
