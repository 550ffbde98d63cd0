//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared,
//! clonable resources: configuration, the tool handler, and the registry
//! of live bridge sessions.

use crate::bridge::SessionHandle;
use crate::config::Config;
use crate::tools::ToolHandler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tools: Arc<dyn ToolHandler>,
    /// Live sessions, keyed by session id. Entries are inserted when a media
    /// stream connects and removed when its bridge closes; the hang-up
    /// endpoint looks sessions up here.
    pub sessions: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, tools: Arc<dyn ToolHandler>) -> Self {
        AppState {
            config,
            tools,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
