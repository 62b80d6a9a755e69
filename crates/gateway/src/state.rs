use std::sync::Arc;

use px_domain::config::Config;

use crate::runtime::{Agent, Scheduler};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The conversation pipeline and its boundary operations.
    pub agent: Agent,
    /// Timers that inject system turns.
    pub scheduler: Arc<Scheduler>,
}
