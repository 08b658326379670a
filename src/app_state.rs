//! Shared application state injected into the HTTP handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::DirectoryView;

/// Shared state available to the HTTP handlers via Axum's `State`
/// extractor. Holds the directory type-erased so the handlers do not depend
/// on the application's environment type.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read access to the pool directory.
    pub directory: Arc<dyn DirectoryView>,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates the state around `directory`.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryView>) -> Self {
        Self {
            directory,
            started_at: Utc::now(),
        }
    }
}
