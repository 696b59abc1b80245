//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration
//! and the registry of live sessions.

use crate::config::Config;
use duplex_core::TurnState;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::default()),
        }
    }
}

/// Live sessions, each observed through the watch its dispatch loop publishes to.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, watch::Receiver<TurnState>>>,
}

impl SessionRegistry {
    pub async fn register(&self, id: Uuid, state_rx: watch::Receiver<TurnState>) {
        self.sessions.write().await.insert(id, state_rx);
    }

    pub async fn unregister(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    /// Current turn state of every live session, ordered by id.
    pub async fn snapshot(&self) -> Vec<(Uuid, TurnState)> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<(Uuid, TurnState)> = sessions
            .iter()
            .map(|(id, rx)| (*id, *rx.borrow()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}
